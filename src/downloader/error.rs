use std::io;
use thiserror::Error;

/// 下载引擎错误
///
/// 下载线程内的错误不会向调用方传播，只会以文本形式写入任务的 `error` 字段
#[derive(Debug, Error)]
pub enum DownloadError {
    /// 网络错误（DNS、连接被拒绝、HTTP 错误状态、传输中断）
    #[error("{0}")]
    Request(#[from] reqwest::Error),

    #[error("{operation}超时 ({secs}秒)")]
    Timeout { operation: &'static str, secs: u64 },

    /// 文件系统错误（权限不足、磁盘已满、目录创建失败）
    #[error("{context}: {source}")]
    Io {
        context: String,
        #[source]
        source: io::Error,
    },

    #[error("下载引擎必须在 tokio 运行时中创建")]
    NoRuntime,

    #[error("下载配置无效: {0}")]
    InvalidConfig(String),
}

impl DownloadError {
    pub fn io(context: impl Into<String>, source: io::Error) -> Self {
        DownloadError::Io {
            context: context.into(),
            source,
        }
    }

    /// 是否为文件系统错误
    pub fn is_filesystem(&self) -> bool {
        matches!(self, DownloadError::Io { .. })
    }
}

pub type DownloadResult<T> = Result<T, DownloadError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_io_error_message() {
        let err = DownloadError::io(
            "创建保存目录失败",
            io::Error::new(io::ErrorKind::PermissionDenied, "permission denied"),
        );
        assert!(err.is_filesystem());
        assert_eq!(err.to_string(), "创建保存目录失败: permission denied");
    }

    #[test]
    fn test_timeout_message() {
        let err = DownloadError::Timeout {
            operation: "读取响应",
            secs: 30,
        };
        assert!(!err.is_filesystem());
        assert_eq!(err.to_string(), "读取响应超时 (30秒)");
    }
}
