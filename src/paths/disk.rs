// 磁盘用量

use serde::{Deserialize, Serialize};
use std::io;
use std::path::Path;

const GB: u64 = 1024 * 1024 * 1024;

/// 路径所在文件系统的容量信息
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskUsage {
    pub path: String,
    /// 总容量 (GB，向下取整)
    pub total_gb: u64,
    /// 当前用户可用容量 (GB，向下取整)
    pub free_gb: u64,
    /// 已用百分比，保留一位小数
    pub percent_used: f64,
}

impl DiskUsage {
    /// `used` 按 总量 - 空闲块 计算，百分比 = 已用 / 总量
    fn from_bytes(path: &Path, total: u64, free: u64, available: u64) -> Self {
        let used = total.saturating_sub(free);
        let percent_used = if total == 0 {
            0.0
        } else {
            (used as f64 / total as f64 * 1000.0).round() / 10.0
        };

        Self {
            path: path.to_string_lossy().into_owned(),
            total_gb: total / GB,
            free_gb: available / GB,
            percent_used,
        }
    }
}

/// 查询路径所在文件系统的用量
pub fn disk_usage(path: &Path) -> io::Result<DiskUsage> {
    let total = fs2::total_space(path)?;
    let free = fs2::free_space(path)?;
    let available = fs2::available_space(path)?;
    Ok(DiskUsage::from_bytes(path, total, free, available))
}
