use crate::config::DownloadConfig;
use crate::downloader::error::{DownloadError, DownloadResult};
use crate::downloader::registry::TaskRegistry;
use crate::downloader::task::TaskSnapshot;
use crate::downloader::worker::Worker;
use crate::paths::{self, DiskUsage};
use parking_lot::Mutex;
use reqwest::Client;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 下载引擎
///
/// 面向界面层的门面：创建/启动/取消/列出任务，以及保存路径相关的辅助函数。
/// 引擎本身可以廉价克隆，所有克隆共享同一个任务表
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    /// 所有任务
    registry: Arc<TaskRegistry>,
    /// 下载线程句柄，关闭时逐个等待
    workers: Arc<Mutex<Vec<(u64, JoinHandle<()>)>>>,
    /// 关闭令牌，触发后所有下载线程立即收尾为 cancelled
    shutdown: CancellationToken,
    client: Client,
    config: Arc<DownloadConfig>,
    runtime: Handle,
}

impl DownloadEngine {
    /// 创建下载引擎，必须在 tokio 运行时中调用
    pub fn new(config: DownloadConfig) -> DownloadResult<Self> {
        config
            .validate()
            .map_err(|e| DownloadError::InvalidConfig(format!("{:#}", e)))?;

        let runtime = Handle::try_current().map_err(|_| DownloadError::NoRuntime)?;

        let client = Client::builder()
            .user_agent(config.user_agent.as_str())
            .connect_timeout(config.timeout())
            .build()?;

        info!(
            "创建下载引擎: User-Agent={}, 超时={}秒, 块大小={} bytes",
            config.user_agent, config.timeout_secs, config.chunk_size
        );

        Ok(Self {
            registry: Arc::new(TaskRegistry::new()),
            workers: Arc::new(Mutex::new(Vec::new())),
            shutdown: CancellationToken::new(),
            client,
            config: Arc::new(config),
            runtime,
        })
    }

    /// 使用默认配置创建
    pub fn with_defaults() -> DownloadResult<Self> {
        Self::new(DownloadConfig::default())
    }

    /// 创建排队中的任务
    ///
    /// 文件名去掉首尾空白后为空时，从 URL 推断
    pub fn create_task(
        &self,
        url: &str,
        save_dir: impl Into<PathBuf>,
        file_name: Option<&str>,
    ) -> TaskSnapshot {
        let file_name = file_name
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| paths::guess_filename(url));

        self.registry
            .create(url.to_string(), save_dir.into(), file_name)
    }

    /// 为任务启动一个下载线程
    pub fn start_task(&self, id: u64) {
        let worker = Worker::new(
            id,
            Arc::clone(&self.registry),
            self.client.clone(),
            Arc::clone(&self.config),
            self.shutdown.clone(),
        );

        // 与 shutdown 共用同一把锁：要么在关闭前登记并被等待，要么看到令牌已触发
        let mut workers = self.workers.lock();
        if self.shutdown.is_cancelled() {
            warn!("下载引擎已关闭，任务 #{} 将直接结束", id);
        }

        let handle = self.runtime.spawn(worker.run());
        workers.retain(|(_, h)| !h.is_finished());
        workers.push((id, handle));
    }

    /// 请求取消任务（协作式，在下一次读取前生效）
    pub fn cancel_task(&self, id: u64) {
        self.registry.cancel(id);
    }

    /// 按创建顺序列出所有任务快照
    pub fn list_tasks(&self) -> Vec<TaskSnapshot> {
        self.registry.list()
    }

    pub fn get_task(&self, id: u64) -> Option<TaskSnapshot> {
        self.registry.get(id)
    }

    pub fn guess_filename(&self, url: &str) -> String {
        paths::guess_filename(url)
    }

    pub fn get_save_locations(&self) -> Vec<String> {
        paths::save_locations()
    }

    pub fn get_disk_usage(&self, path: impl AsRef<Path>) -> DownloadResult<DiskUsage> {
        let path = path.as_ref();
        paths::disk_usage(path)
            .map_err(|e| DownloadError::io(format!("读取磁盘用量失败 {:?}", path), e))
    }

    /// 关闭引擎：中断所有下载线程并等待它们结束
    ///
    /// 关闭之后启动的任务直接结束为 cancelled，再次调用 shutdown 会等待它们
    pub async fn shutdown(&self) {
        let handles: Vec<(u64, JoinHandle<()>)> = {
            let mut workers = self.workers.lock();
            self.shutdown.cancel();
            workers.drain(..).collect()
        };
        info!("正在关闭下载引擎，等待 {} 个下载线程", handles.len());

        for (id, handle) in handles {
            if let Err(e) = handle.await {
                warn!("下载线程 #{} 异常退出: {}", id, e);
            }
        }

        info!("下载引擎已关闭");
    }
}
