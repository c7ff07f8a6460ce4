// 配置管理模块

use crate::downloader::progress::DEFAULT_SAMPLE_INTERVAL;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tokio::fs;

/// 应用配置
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// 下载配置
    #[serde(default)]
    pub download: DownloadConfig,
    /// 日志配置
    #[serde(default)]
    pub log: LogConfig,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    /// 是否启用日志文件持久化
    #[serde(default = "default_log_enabled")]
    pub enabled: bool,
    /// 日志文件保存目录
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    /// 日志保留天数（默认 7 天）
    #[serde(default = "default_log_retention_days")]
    pub retention_days: u32,
    /// 日志级别（默认 info）
    #[serde(default = "default_log_level")]
    pub level: String,
    /// 单个日志文件最大大小（字节，默认 10MB）
    #[serde(default = "default_log_max_file_size")]
    pub max_file_size: u64,
}

fn default_log_enabled() -> bool {
    true
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("logs")
}

fn default_log_retention_days() -> u32 {
    7
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_max_file_size() -> u64 {
    10 * 1024 * 1024 // 10MB
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            enabled: default_log_enabled(),
            log_dir: default_log_dir(),
            retention_days: default_log_retention_days(),
            level: default_log_level(),
            max_file_size: default_log_max_file_size(),
        }
    }
}

/// 下载配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// 默认保存目录
    #[serde(default = "default_save_dir")]
    pub save_dir: PathBuf,
    /// 请求头 User-Agent
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    /// 单次网络操作超时（秒）：建立连接、等待响应头、每次读取
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    /// 每次读取的块大小（字节）
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,
    /// 速度采样窗口（毫秒）
    #[serde(default = "default_speed_sample_ms")]
    pub speed_sample_ms: u64,
}

fn default_save_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_user_agent() -> String {
    "FluxDM/0.1".to_string()
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_chunk_size() -> usize {
    64 * 1024 // 64KB
}

fn default_speed_sample_ms() -> u64 {
    DEFAULT_SAMPLE_INTERVAL.as_millis() as u64
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            save_dir: default_save_dir(),
            user_agent: default_user_agent(),
            timeout_secs: default_timeout_secs(),
            chunk_size: default_chunk_size(),
            speed_sample_ms: default_speed_sample_ms(),
        }
    }
}

impl DownloadConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn speed_sample_interval(&self) -> Duration {
        Duration::from_millis(self.speed_sample_ms)
    }

    /// 校验下载参数
    pub fn validate(&self) -> Result<()> {
        if self.user_agent.trim().is_empty() {
            anyhow::bail!("user_agent 不能为空");
        }
        if self.timeout_secs == 0 {
            anyhow::bail!("timeout_secs 必须大于 0");
        }
        if self.chunk_size == 0 {
            anyhow::bail!("chunk_size 必须大于 0");
        }
        if self.speed_sample_ms == 0 {
            anyhow::bail!("speed_sample_ms 必须大于 0");
        }
        Ok(())
    }
}

impl AppConfig {
    /// 从文件加载配置
    pub async fn load_from_file(path: &str) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .context("Failed to read config file")?;

        let config: AppConfig = toml::from_str(&content).context("Failed to parse config file")?;

        config
            .download
            .validate()
            .context("配置文件中的下载参数无效")?;

        Ok(config)
    }

    /// 保存配置到文件
    pub async fn save_to_file(&self, path: &str) -> Result<()> {
        self.download
            .validate()
            .context("保存配置失败：下载参数无效")?;

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        // 确保父目录存在
        if let Some(parent) = std::path::Path::new(path).parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .await
                    .context("Failed to create config directory")?;
            }
        }

        fs::write(path, content)
            .await
            .context("Failed to write config file")?;

        tracing::info!("✓ 配置已保存: {}", path);
        Ok(())
    }

    /// 加载或创建默认配置
    pub async fn load_or_default(path: &str) -> Self {
        match Self::load_from_file(path).await {
            Ok(config) => {
                tracing::info!("配置文件加载成功: {}", path);
                config
            }
            Err(e) => {
                tracing::warn!("配置文件加载失败，使用默认配置: {:#}", e);
                let default_config = Self::default();

                if let Err(e) = default_config.save_to_file(path).await {
                    tracing::error!("保存默认配置失败: {:#}", e);
                }

                default_config
            }
        }
    }
}
