// FluxDM
// 并发 HTTP 下载管理器核心库

// 配置管理模块
pub mod config;

// 下载引擎模块
pub mod downloader;

// 日志系统
pub mod logging;

// 保存路径与磁盘用量
pub mod paths;

// 任务表格渲染
pub mod view;

// 导出常用类型
pub use config::AppConfig;
pub use downloader::{
    DownloadEngine, DownloadError, DownloadResult, TaskRegistry, TaskSnapshot, TaskStatus,
};
pub use paths::DiskUsage;
