use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// 下载任务状态
///
/// 状态只会单向推进：`Queued -> Downloading -> {Completed, Cancelled, Failed}`
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// 等待中
    Queued,
    /// 下载中
    Downloading,
    /// 已完成
    Completed,
    /// 已取消
    Cancelled,
    /// 失败
    Failed,
}

impl TaskStatus {
    /// 是否处于终止状态
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Cancelled | TaskStatus::Failed
        )
    }

    /// 是否还可以被取消
    pub fn is_cancellable(&self) -> bool {
        matches!(self, TaskStatus::Queued | TaskStatus::Downloading)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Queued => "queued",
            TaskStatus::Downloading => "downloading",
            TaskStatus::Completed => "completed",
            TaskStatus::Cancelled => "cancelled",
            TaskStatus::Failed => "failed",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 下载任务（可变记录）
///
/// 只存在于 `TaskRegistry` 的锁内，外部只能拿到 `TaskSnapshot`
#[derive(Debug, Clone)]
pub(crate) struct DownloadTask {
    id: u64,
    url: String,
    save_dir: PathBuf,
    file_name: String,
    status: TaskStatus,
    /// 进度百分比，总大小未知时为 None
    progress: Option<f64>,
    downloaded_bytes: u64,
    total_bytes: Option<u64>,
    /// 下载速度 (bytes/s)
    speed_bps: f64,
    error: Option<String>,
    cancel_requested: bool,
    /// 创建时间 (Unix timestamp)
    started_at: i64,
    /// 进入终止状态的时间 (Unix timestamp)
    finished_at: Option<i64>,
}

impl DownloadTask {
    pub(crate) fn new(id: u64, url: String, save_dir: PathBuf, file_name: String) -> Self {
        Self {
            id,
            url,
            save_dir,
            file_name,
            status: TaskStatus::Queued,
            progress: None,
            downloaded_bytes: 0,
            total_bytes: None,
            speed_bps: 0.0,
            error: None,
            cancel_requested: false,
            started_at: chrono::Utc::now().timestamp(),
            finished_at: None,
        }
    }

    pub(crate) fn cancel_requested(&self) -> bool {
        self.cancel_requested
    }

    pub(crate) fn url(&self) -> &str {
        &self.url
    }

    pub(crate) fn save_dir(&self) -> &PathBuf {
        &self.save_dir
    }

    /// 目标文件路径
    pub(crate) fn destination(&self) -> PathBuf {
        self.save_dir.join(&self.file_name)
    }

    /// 请求取消，只有排队中或下载中的任务才会生效
    pub(crate) fn request_cancel(&mut self) -> bool {
        if !self.status.is_cancellable() {
            return false;
        }
        self.cancel_requested = true;
        true
    }

    /// 标记为下载中，只允许从 Queued 进入
    pub(crate) fn mark_downloading(&mut self) -> bool {
        if self.status != TaskStatus::Queued {
            return false;
        }
        self.status = TaskStatus::Downloading;
        self.speed_bps = 0.0;
        true
    }

    /// 记录响应声明的总大小（只设置一次）
    pub(crate) fn set_total_bytes(&mut self, total: Option<u64>) {
        if self.status != TaskStatus::Downloading || self.total_bytes.is_some() {
            return;
        }
        self.total_bytes = total;
    }

    /// 记录已写入的字节数，`speed` 为 None 时保持上一次采样的速度
    pub(crate) fn record_progress(&mut self, downloaded: u64, speed: Option<f64>) {
        if self.status != TaskStatus::Downloading {
            return;
        }
        self.downloaded_bytes = self.downloaded_bytes.max(downloaded);
        if let Some(total) = self.total_bytes.filter(|&t| t > 0) {
            self.progress = Some((self.downloaded_bytes as f64 / total as f64 * 100.0).min(100.0));
        }
        if let Some(speed) = speed {
            self.speed_bps = speed;
        }
    }

    /// 标记为已完成
    pub(crate) fn mark_completed(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Completed;
        self.progress = Some(100.0);
        self.speed_bps = 0.0;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为已取消（部分文件已被删除）
    pub(crate) fn mark_cancelled(&mut self) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Cancelled;
        self.progress = Some(0.0);
        self.downloaded_bytes = 0;
        self.speed_bps = 0.0;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    /// 标记为失败
    pub(crate) fn mark_failed(&mut self, error: String) {
        if self.status.is_terminal() {
            return;
        }
        self.status = TaskStatus::Failed;
        self.error = Some(error);
        self.speed_bps = 0.0;
        self.finished_at = Some(chrono::Utc::now().timestamp());
    }

    pub(crate) fn snapshot(&self) -> TaskSnapshot {
        TaskSnapshot {
            id: self.id,
            url: self.url.clone(),
            save_dir: self.save_dir.clone(),
            file_name: self.file_name.clone(),
            status: self.status,
            progress: self.progress,
            downloaded_bytes: self.downloaded_bytes,
            total_bytes: self.total_bytes,
            speed_bps: self.speed_bps,
            error: self.error.clone(),
            cancel_requested: self.cancel_requested,
            started_at: self.started_at,
            finished_at: self.finished_at,
        }
    }
}

/// 任务快照
///
/// 在任务表锁内复制出来的不可变副本，读者持有它不会与下载线程产生竞争
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSnapshot {
    /// 任务ID（进程内唯一且单调递增）
    pub id: u64,
    pub url: String,
    /// 保存目录
    pub save_dir: PathBuf,
    pub file_name: String,
    pub status: TaskStatus,
    /// 进度百分比 [0, 100]，总大小未知时为 None
    pub progress: Option<f64>,
    pub downloaded_bytes: u64,
    pub total_bytes: Option<u64>,
    /// 下载速度 (bytes/s)，非下载中时为 0
    pub speed_bps: f64,
    /// 错误信息，只在失败时设置
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub cancel_requested: bool,
    /// 创建时间 (Unix timestamp)
    pub started_at: i64,
    /// 结束时间 (Unix timestamp)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<i64>,
}

impl TaskSnapshot {
    /// 目标文件路径
    pub fn destination(&self) -> PathBuf {
        self.save_dir.join(&self.file_name)
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// 估算剩余时间 (秒)
    pub fn eta(&self) -> Option<u64> {
        let total = self.total_bytes?;
        if self.speed_bps <= 0.0 || self.downloaded_bytes >= total {
            return None;
        }
        let remaining = (total - self.downloaded_bytes) as f64;
        Some((remaining / self.speed_bps).ceil() as u64)
    }
}
