//! 日志系统
//!
//! 控制台输出到 stderr（stdout 留给任务表格），可选写入日志文件。
//! 日志文件按启动时间命名、按大小滚动，启动时清理超过保留天数的旧文件

use crate::config::LogConfig;
use chrono::{Local, NaiveDate};
use parking_lot::Mutex;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{
    fmt::{self, time::ChronoLocal},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// 日志文件名前缀
const LOG_FILE_PREFIX: &str = "fluxdm.";
const LOG_FILE_SUFFIX: &str = ".log";
const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// 按大小滚动的日志文件
///
/// 文件名：`fluxdm.<启动时间>.log`，滚动后为 `fluxdm.<启动时间>_<N>.log`
struct RollingFile {
    log_dir: PathBuf,
    /// 启动时间戳 (YYYY-MM-DD-HHMMSS)
    stamp: String,
    index: u32,
    max_file_size: u64,
    file: File,
    written: u64,
}

impl RollingFile {
    fn open(log_dir: PathBuf, stamp: String, max_file_size: u64) -> io::Result<Self> {
        let file = open_append(&file_path(&log_dir, &stamp, 0))?;
        Ok(Self {
            log_dir,
            stamp,
            index: 0,
            max_file_size,
            file,
            written: 0,
        })
    }

    fn write_record(&mut self, buf: &[u8]) -> io::Result<usize> {
        // 空文件不滚动，超大的单条日志也能写进去
        if self.written > 0 && self.written + buf.len() as u64 > self.max_file_size {
            self.file.flush()?;
            self.index += 1;
            self.file = open_append(&file_path(&self.log_dir, &self.stamp, self.index))?;
            self.written = 0;
        }

        let n = self.file.write(buf)?;
        self.written += n as u64;
        Ok(n)
    }
}

fn file_path(log_dir: &Path, stamp: &str, index: u32) -> PathBuf {
    let name = if index == 0 {
        format!("{}{}{}", LOG_FILE_PREFIX, stamp, LOG_FILE_SUFFIX)
    } else {
        format!("{}{}_{}{}", LOG_FILE_PREFIX, stamp, index, LOG_FILE_SUFFIX)
    };
    log_dir.join(name)
}

fn open_append(path: &Path) -> io::Result<File> {
    OpenOptions::new().create(true).append(true).open(path)
}

/// 日志文件写入器，可克隆，所有克隆写同一组文件
#[derive(Clone)]
pub struct LogFileManager {
    inner: Arc<Mutex<RollingFile>>,
}

impl LogFileManager {
    pub fn new(log_dir: PathBuf, max_file_size: u64) -> io::Result<Self> {
        let stamp = Local::now().format("%Y-%m-%d-%H%M%S").to_string();
        let file = RollingFile::open(log_dir, stamp, max_file_size)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(file)),
        })
    }
}

impl Write for LogFileManager {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.lock().write_record(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.lock().file.flush()
    }
}

/// 日志守卫，必须保持存活直到程序退出，否则后台写入线程会丢弃缓冲的日志
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// 初始化全局日志订阅器
///
/// `RUST_LOG` 优先于配置中的级别。日志目录或文件无法创建时回退到仅控制台输出
pub fn init_logging(config: &LogConfig) -> LogGuard {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let console_layer = fmt::layer()
        .with_target(true)
        .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
        .with_writer(io::stderr);

    let file_writer = if config.enabled {
        open_file_writer(config)
    } else {
        None
    };
    let (file_layer, file_guard) = match file_writer {
        Some((writer, guard)) => {
            let layer = fmt::layer()
                .with_target(true)
                .with_timer(ChronoLocal::new(TIME_FORMAT.to_string()))
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };
    let to_file = file_layer.is_some();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .init();

    if to_file {
        info!(
            "日志系统初始化完成: 目录={:?}, 保留天数={}, 级别={}, 单文件最大={:.1}MB",
            config.log_dir,
            config.retention_days,
            config.level,
            config.max_file_size as f64 / 1024.0 / 1024.0
        );
        let removed = cleanup_old_logs(
            &config.log_dir,
            config.retention_days,
            Local::now().date_naive(),
        );
        if removed > 0 {
            info!("已清理 {} 个过期日志文件", removed);
        }
    } else {
        info!("日志系统初始化完成（仅控制台输出）");
    }

    LogGuard {
        _file_guard: file_guard,
    }
}

fn open_file_writer(config: &LogConfig) -> Option<(NonBlocking, WorkerGuard)> {
    if let Err(e) = fs::create_dir_all(&config.log_dir) {
        eprintln!("创建日志目录失败: {:?}, 错误: {}", config.log_dir, e);
        return None;
    }

    match LogFileManager::new(config.log_dir.clone(), config.max_file_size) {
        Ok(manager) => Some(tracing_appender::non_blocking(manager)),
        Err(e) => {
            eprintln!("创建日志文件失败: {}, 回退到仅控制台输出", e);
            None
        }
    }
}

/// 删除超过保留天数的日志文件，返回删除数量
///
/// 日期从文件名解析，解析不出时按修改时间判断
fn cleanup_old_logs(log_dir: &Path, retention_days: u32, today: NaiveDate) -> usize {
    let retention = chrono::Duration::days(retention_days as i64);

    let entries = match fs::read_dir(log_dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("读取日志目录失败: {:?}, 错误: {}", log_dir, e);
            return 0;
        }
    };

    let mut removed = 0;
    for entry in entries.flatten() {
        let path = entry.path();
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        if !path.is_file() || !name.starts_with(LOG_FILE_PREFIX) || !name.ends_with(LOG_FILE_SUFFIX)
        {
            continue;
        }

        let expired = match date_from_filename(name) {
            Some(date) => today.signed_duration_since(date) > retention,
            None => modified_before(&entry, retention),
        };
        if !expired {
            continue;
        }

        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!("已删除过期日志文件: {:?}", path);
                removed += 1;
            }
            Err(e) => tracing::warn!("删除过期日志文件失败: {:?}, 错误: {}", path, e),
        }
    }
    removed
}

/// `fluxdm.YYYY-MM-DD-HHMMSS[_N].log` -> YYYY-MM-DD
fn date_from_filename(name: &str) -> Option<NaiveDate> {
    let stem = name
        .strip_prefix(LOG_FILE_PREFIX)?
        .strip_suffix(LOG_FILE_SUFFIX)?;
    NaiveDate::parse_from_str(stem.get(..10)?, "%Y-%m-%d").ok()
}

fn modified_before(entry: &fs::DirEntry, retention: chrono::Duration) -> bool {
    entry
        .metadata()
        .and_then(|m| m.modified())
        .map(|modified| {
            let modified: chrono::DateTime<chrono::Utc> = modified.into();
            chrono::Utc::now().signed_duration_since(modified) > retention
        })
        .unwrap_or(false)
}
