// 已挂载的移动介质检测（U 盘、外接硬盘等）

use std::fs;
use std::path::{Path, PathBuf};

/// 当前平台的移动介质挂载根目录
///
/// - Linux: `/media/<user>`、`/run/media/<user>`
/// - macOS: `/Volumes`
/// - Windows: 无（盘符直接作为候选目录）
pub fn media_roots() -> Vec<PathBuf> {
    media_roots_for(current_user().as_deref())
}

/// 已挂载的介质目录
///
/// Linux/macOS 返回挂载根目录下的子目录（按名称排序），Windows 返回存在的盘符
pub fn mounted_media() -> Vec<PathBuf> {
    #[cfg(target_os = "windows")]
    {
        windows_drives()
    }

    #[cfg(not(target_os = "windows"))]
    {
        media_roots()
            .iter()
            .flat_map(|root| subdirectories(root))
            .collect()
    }
}

/// 当前用户名：`USER` / `USERNAME` 环境变量，否则取主目录的最后一段
pub fn current_user() -> Option<String> {
    ["USER", "USERNAME"]
        .iter()
        .filter_map(|key| std::env::var(key).ok())
        .find(|name| !name.trim().is_empty())
        .or_else(|| {
            dirs::home_dir()?
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
        })
}

#[cfg(target_os = "linux")]
fn media_roots_for(user: Option<&str>) -> Vec<PathBuf> {
    match user {
        Some(user) => vec![
            PathBuf::from("/media").join(user),
            PathBuf::from("/run/media").join(user),
        ],
        None => Vec::new(),
    }
}

#[cfg(target_os = "macos")]
fn media_roots_for(_user: Option<&str>) -> Vec<PathBuf> {
    vec![PathBuf::from("/Volumes")]
}

#[cfg(not(any(target_os = "linux", target_os = "macos")))]
fn media_roots_for(_user: Option<&str>) -> Vec<PathBuf> {
    Vec::new()
}

/// 遍历 A-Z 驱动器
#[cfg(target_os = "windows")]
fn windows_drives() -> Vec<PathBuf> {
    ('A'..='Z')
        .map(|letter| PathBuf::from(format!("{}:\\", letter)))
        .filter(|path| path.exists())
        .collect()
}

/// 列出目录下的子目录，目录不存在或不可读时返回空
#[cfg_attr(target_os = "windows", allow(dead_code))]
fn subdirectories(root: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(root) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::debug!("跳过介质目录 {:?}: {}", root, e);
            return Vec::new();
        }
    };

    let mut dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    dirs.sort();
    dirs
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_subdirectories_skips_files() {
        let temp = TempDir::new().unwrap();
        fs::create_dir(temp.path().join("usb-b")).unwrap();
        fs::create_dir(temp.path().join("usb-a")).unwrap();
        fs::write(temp.path().join("note.txt"), b"x").unwrap();

        let found = subdirectories(temp.path());
        assert_eq!(
            found,
            vec![temp.path().join("usb-a"), temp.path().join("usb-b")]
        );
    }

    #[test]
    fn test_subdirectories_missing_root() {
        let temp = TempDir::new().unwrap();
        assert!(subdirectories(&temp.path().join("missing")).is_empty());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_linux_media_roots() {
        assert_eq!(
            media_roots_for(Some("alice")),
            vec![
                PathBuf::from("/media/alice"),
                PathBuf::from("/run/media/alice")
            ]
        );
        assert!(media_roots_for(None).is_empty());
    }

    #[test]
    fn test_mounted_media_are_directories() {
        assert!(mounted_media().iter().all(|p| p.is_dir()));
    }
}
