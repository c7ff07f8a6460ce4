//! 单任务下载执行单元
//!
//! 状态机：`queued -> downloading -> {completed, cancelled, failed}`
//!
//! 1. 在任务表锁内从 queued 进入 downloading（只会成功一次）
//! 2. 创建保存目录，发起 GET 请求，记录 Content-Length
//! 3. 循环：读取前检查取消标记，读取一块，写入文件，再在锁内更新进度和速度
//! 4. 正常结束 -> completed；取消 -> 删除部分文件后 cancelled；其余错误 -> failed

use crate::config::DownloadConfig;
use crate::downloader::error::{DownloadError, DownloadResult};
use crate::downloader::progress::SpeedSampler;
use crate::downloader::registry::TaskRegistry;
use futures::TryStreamExt;
use reqwest::header::CONTENT_LENGTH;
use reqwest::{Client, Response};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tokio::fs::{self, File};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio_util::io::StreamReader;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// 传输结束方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Completed,
    /// `created_file` 表示目标文件是否由本次下载创建（需要清理）
    Cancelled { created_file: bool },
}

/// 下载开始时从任务中取出的不可变参数
#[derive(Debug)]
struct Job {
    url: String,
    save_dir: PathBuf,
    destination: PathBuf,
}

/// 下载执行单元，每个任务一个，只有它会修改所属任务的进度字段
pub(crate) struct Worker {
    id: u64,
    registry: Arc<TaskRegistry>,
    client: Client,
    config: Arc<DownloadConfig>,
    shutdown: CancellationToken,
}

impl Worker {
    pub(crate) fn new(
        id: u64,
        registry: Arc<TaskRegistry>,
        client: Client,
        config: Arc<DownloadConfig>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            id,
            registry,
            client,
            config,
            shutdown,
        }
    }

    pub(crate) async fn run(self) {
        let job = self.registry.update(self.id, |task| {
            task.mark_downloading().then(|| Job {
                url: task.url().to_string(),
                save_dir: task.save_dir().clone(),
                destination: task.destination(),
            })
        });

        let job = match job {
            Some(Some(job)) => job,
            Some(None) => {
                warn!("任务 #{} 不在排队状态，忽略重复启动", self.id);
                return;
            }
            None => {
                warn!("任务 #{} 不存在，无法启动", self.id);
                return;
            }
        };

        info!("任务 #{} 开始下载: {}", self.id, job.url);

        match self.transfer(&job).await {
            Ok(Outcome::Completed) => {
                self.registry.update(self.id, |task| task.mark_completed());
                info!("✓ 任务 #{} 下载完成: {:?}", self.id, job.destination);
            }
            Ok(Outcome::Cancelled { created_file }) => {
                self.finish_cancelled(&job, created_file).await;
            }
            Err(e) => {
                error!("任务 #{} 下载失败: {}", self.id, e);
                self.registry
                    .update(self.id, |task| task.mark_failed(e.to_string()));
            }
        }
    }

    async fn transfer(&self, job: &Job) -> DownloadResult<Outcome> {
        if self.should_stop() {
            return Ok(Outcome::Cancelled {
                created_file: false,
            });
        }

        fs::create_dir_all(&job.save_dir)
            .await
            .map_err(|e| DownloadError::io(format!("创建保存目录失败 {:?}", job.save_dir), e))?;

        let response = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => {
                return Ok(Outcome::Cancelled { created_file: false });
            }
            response = self.send(&job.url) => response?,
        };

        let total = declared_length(&response);
        debug!("任务 #{} 响应声明大小: {:?}", self.id, total);
        self.registry
            .update(self.id, |task| task.set_total_bytes(total));

        let mut file = File::create(&job.destination)
            .await
            .map_err(|e| DownloadError::io(format!("创建文件失败 {:?}", job.destination), e))?;

        let stream = response
            .bytes_stream()
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e));
        let mut reader = StreamReader::new(stream);

        let outcome = self.pump(&mut reader, &mut file).await;

        // 后台写入完成后再决定保留还是删除文件
        let flushed = file.flush().await;
        drop(file);

        let outcome = outcome?;
        if outcome == Outcome::Completed {
            flushed.map_err(|e| DownloadError::io("刷新文件缓冲失败", e))?;
        }
        Ok(outcome)
    }

    /// 按块读取响应体并写入文件，读取前检查取消标记
    async fn pump<R>(&self, reader: &mut R, file: &mut File) -> DownloadResult<Outcome>
    where
        R: AsyncRead + Unpin,
    {
        let mut buf = vec![0u8; self.config.chunk_size];
        let mut sampler = SpeedSampler::new(self.config.speed_sample_interval(), Instant::now());
        let mut downloaded = 0u64;

        loop {
            if self.should_stop() {
                return Ok(Outcome::Cancelled { created_file: true });
            }

            let n = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    return Ok(Outcome::Cancelled { created_file: true });
                }
                read = self.read_chunk(reader, &mut buf) => read?,
            };
            if n == 0 {
                return Ok(Outcome::Completed);
            }

            file.write_all(&buf[..n])
                .await
                .map_err(|e| DownloadError::io("写入文件失败", e))?;
            downloaded += n as u64;

            let speed = sampler.sample(Instant::now(), downloaded);
            if let Some(speed) = speed {
                debug!(
                    "任务 #{} 速度采样: {:.2} KB/s, 已下载 {} bytes",
                    self.id,
                    speed / 1024.0,
                    downloaded
                );
            }
            self.registry
                .update(self.id, |task| task.record_progress(downloaded, speed));
        }
    }

    async fn send(&self, url: &str) -> DownloadResult<Response> {
        let response = tokio::time::timeout(self.config.timeout(), self.client.get(url).send())
            .await
            .map_err(|_| DownloadError::Timeout {
                operation: "等待服务器响应",
                secs: self.config.timeout_secs,
            })??;

        Ok(response.error_for_status()?)
    }

    async fn read_chunk<R>(&self, reader: &mut R, buf: &mut [u8]) -> DownloadResult<usize>
    where
        R: AsyncRead + Unpin,
    {
        match tokio::time::timeout(self.config.timeout(), reader.read(buf)).await {
            Ok(Ok(n)) => Ok(n),
            Ok(Err(e)) => Err(read_error(e)),
            Err(_) => Err(DownloadError::Timeout {
                operation: "读取响应数据",
                secs: self.config.timeout_secs,
            }),
        }
    }

    /// 取消标记或引擎关闭
    fn should_stop(&self) -> bool {
        self.shutdown.is_cancelled()
            || self
                .registry
                .update(self.id, |task| task.cancel_requested())
                .unwrap_or(true)
    }

    /// 先删除部分文件，再标记为已取消
    async fn finish_cancelled(&self, job: &Job, created_file: bool) {
        if created_file {
            match fs::remove_file(&job.destination).await {
                Ok(()) => debug!("任务 #{} 已删除未完成的文件: {:?}", self.id, job.destination),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => {
                    let err = DownloadError::io(
                        format!("删除未完成的文件失败 {:?}", job.destination),
                        e,
                    );
                    error!("任务 #{} 取消清理失败: {}", self.id, err);
                    self.registry
                        .update(self.id, |task| task.mark_failed(err.to_string()));
                    return;
                }
            }
        }

        self.registry.update(self.id, |task| task.mark_cancelled());
        info!("任务 #{} 已取消", self.id);
    }
}

/// 响应头中声明的数字长度
fn declared_length(response: &Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)?
        .to_str()
        .ok()?
        .trim()
        .parse()
        .ok()
}

/// 还原 StreamReader 包装的 reqwest 错误
fn read_error(err: io::Error) -> DownloadError {
    let kind = err.kind();
    match err.into_inner() {
        Some(inner) => match inner.downcast::<reqwest::Error>() {
            Ok(err) => DownloadError::Request(*err),
            Err(other) => DownloadError::io("读取响应数据失败", io::Error::new(kind, other)),
        },
        None => DownloadError::io("读取响应数据失败", io::Error::from(kind)),
    }
}
