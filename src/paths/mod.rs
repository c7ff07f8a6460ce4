// 保存路径相关的辅助函数：从 URL 推断文件名、候选保存目录、磁盘用量

mod disk;
pub mod media;

pub use disk::{disk_usage, DiskUsage};

use reqwest::Url;
use std::collections::HashSet;
use std::path::PathBuf;

/// 无法从 URL 推断文件名时使用的默认名称
pub const DEFAULT_FILE_NAME: &str = "download.bin";

/// 从 URL 推断文件名
///
/// 取路径的最后一个非空段并做百分号解码（非法 UTF-8 按有损方式替换），
/// 名称中的路径分隔符替换为 `_`，结果为空、`.` 或 `..` 时返回 [`DEFAULT_FILE_NAME`]
pub fn guess_filename(url: &str) -> String {
    let segment = match Url::parse(url) {
        Ok(parsed) => last_segment(parsed.path()).map(str::to_string),
        Err(_) => last_segment(raw_path(url)).map(str::to_string),
    };

    segment
        .map(|s| sanitize(&String::from_utf8_lossy(&urlencoding::decode_binary(s.as_bytes()))))
        .filter(|name| is_usable(name))
        .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string())
}

/// 候选保存目录：文件系统根目录、用户主目录、已挂载的移动介质
///
/// 只返回当前存在的目录，按首次出现的顺序去重
pub fn save_locations() -> Vec<String> {
    let mut candidates = vec![filesystem_root()];
    if let Some(home) = dirs::home_dir() {
        candidates.push(home);
    }
    candidates.extend(media::mounted_media());

    let mut seen = HashSet::new();
    candidates
        .into_iter()
        .filter(|path| path.is_dir())
        .map(|path| path.to_string_lossy().into_owned())
        .filter(|path| seen.insert(path.clone()))
        .collect()
}

fn filesystem_root() -> PathBuf {
    #[cfg(target_os = "windows")]
    {
        let drive = std::env::var("SystemDrive").unwrap_or_else(|_| "C:".to_string());
        PathBuf::from(format!("{}\\", drive))
    }

    #[cfg(not(target_os = "windows"))]
    {
        PathBuf::from("/")
    }
}

fn last_segment(path: &str) -> Option<&str> {
    path.split('/').rev().find(|s| !s.is_empty())
}

/// URL 解析失败时的退路：去掉查询串、片段和 `scheme://host` 部分
fn raw_path(url: &str) -> &str {
    let without_query = url.split(['?', '#']).next().unwrap_or("");
    match without_query.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, path)| path).unwrap_or(""),
        None => without_query,
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect()
}

fn is_usable(name: &str) -> bool {
    let trimmed = name.trim();
    !trimmed.is_empty() && trimmed != "." && trimmed != ".."
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use std::path::Path;

    #[test]
    fn test_guess_filename() {
        assert_eq!(guess_filename("https://x.com/a%20b.zip"), "a b.zip");
        assert_eq!(guess_filename("https://x.com/"), "download.bin");
        assert_eq!(guess_filename("https://x.com"), "download.bin");
        assert_eq!(guess_filename("https://x.com/dir/"), "dir");
        assert_eq!(
            guess_filename("https://x.com/files/report.pdf?token=abc#page=2"),
            "report.pdf"
        );
    }

    #[test]
    fn test_guess_filename_sanitizes() {
        assert_eq!(guess_filename("https://x.com/a%2Fb.txt"), "a_b.txt");
        assert_eq!(guess_filename("https://x.com/a%5Cb.txt"), "a_b.txt");
        assert_eq!(guess_filename("https://x.com/%2E%2E"), "download.bin");
        assert_eq!(guess_filename("https://x.com/%20"), "download.bin");
        // 非法 UTF-8 有损替换
        assert_eq!(guess_filename("https://x.com/%FFa.bin"), "\u{FFFD}a.bin");
        assert_eq!(
            guess_filename("https://x.com/%E4%B8%AD%E6%96%87.txt"),
            "中文.txt"
        );
    }

    #[test]
    fn test_guess_filename_unparseable_url() {
        assert_eq!(guess_filename("not a url/file.txt?x=1"), "file.txt");
        assert_eq!(guess_filename("http://[bad/path/x.iso#frag"), "x.iso");
        assert_eq!(guess_filename(""), "download.bin");
    }

    #[test]
    fn test_save_locations_exist_and_unique() {
        let locations = save_locations();
        assert!(!locations.is_empty());

        let unique: HashSet<&String> = locations.iter().collect();
        assert_eq!(unique.len(), locations.len());
        assert!(locations.iter().all(|p| Path::new(p).is_dir()));
    }

    proptest! {
        #[test]
        fn prop_guess_filename_is_safe(url in ".*") {
            let name = guess_filename(&url);
            prop_assert!(!name.trim().is_empty());
            prop_assert!(!name.contains('/'));
            prop_assert!(!name.contains('\\'));
            prop_assert!(name != "." && name != "..");
        }

        #[test]
        fn prop_plain_segment_is_kept(segment in "[A-Za-z0-9_-][A-Za-z0-9._-]{0,24}") {
            let url = format!("https://example.com/dir/{}", segment);
            prop_assert_eq!(guess_filename(&url), segment);
        }
    }
}
