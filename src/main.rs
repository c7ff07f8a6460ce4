use clap::Parser;
use fluxdm::{
    config::{AppConfig, LogConfig},
    logging, view, DownloadEngine, TaskSnapshot, TaskStatus,
};
use anyhow::Context;
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;
use tracing::{info, warn};

/// 表格刷新间隔
const REFRESH_INTERVAL: Duration = Duration::from_millis(500);

/// 并发 HTTP 下载管理器
#[derive(Parser, Debug)]
#[command(name = "fluxdm", version)]
struct Cli {
    /// 要下载的 URL，每个 URL 一个任务
    #[arg(required_unless_present = "locations")]
    urls: Vec<String>,

    /// 保存目录（默认取配置文件中的 download.save_dir）
    #[arg(short, long)]
    dir: Option<PathBuf>,

    /// 指定文件名，只能与单个 URL 一起使用
    #[arg(short, long)]
    name: Option<String>,

    /// 配置文件路径
    #[arg(short, long, default_value = "config/app.toml")]
    config: String,

    /// 列出候选保存目录及剩余空间后退出
    #[arg(long)]
    locations: bool,

    /// 结束后以 JSON 输出所有任务
    #[arg(long)]
    json: bool,
}

/// 日志系统要在加载完整配置之前初始化，这里只读取 [log] 段
async fn load_log_config(path: &str) -> LogConfig {
    let Ok(content) = tokio::fs::read_to_string(path).await else {
        return LogConfig::default();
    };

    toml::from_str::<toml::Value>(&content)
        .ok()
        .and_then(|value| value.get("log").cloned())
        .and_then(|log| log.try_into::<LogConfig>().ok())
        .unwrap_or_default()
}

fn print_locations(engine: &DownloadEngine) {
    for location in engine.get_save_locations() {
        match engine.get_disk_usage(&location) {
            Ok(usage) => println!("{} ({}GB free)", location, usage.free_gb),
            Err(e) => {
                warn!("{}", e);
                println!("{}", location);
            }
        }
    }
}

fn draw(tasks: &[TaskSnapshot], clear: bool) -> io::Result<()> {
    view::write_table(&mut io::stdout().lock(), tasks, clear)
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    let log_config = load_log_config(&cli.config).await;
    let _log_guard = logging::init_logging(&log_config);

    info!("FluxDM v{} 启动中...", env!("CARGO_PKG_VERSION"));

    let config = AppConfig::load_or_default(&cli.config).await;
    let engine = DownloadEngine::new(config.download.clone())?;

    if cli.locations {
        print_locations(&engine);
        return Ok(ExitCode::SUCCESS);
    }

    if cli.name.is_some() && cli.urls.len() > 1 {
        anyhow::bail!("--name 只能与单个 URL 一起使用");
    }

    let save_dir = cli.dir.unwrap_or(config.download.save_dir);
    for url in &cli.urls {
        let task = engine.create_task(url, save_dir.clone(), cli.name.as_deref());
        engine.start_task(task.id);
    }

    let mut live = !cli.json && io::stdout().is_terminal();
    let mut ticker = tokio::time::interval(REFRESH_INTERVAL);
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("收到 Ctrl+C，取消所有下载...");
                break;
            }
            _ = ticker.tick() => {
                let tasks = engine.list_tasks();
                if live {
                    if let Err(e) = draw(&tasks, true) {
                        warn!("刷新任务表格失败，停止刷新: {}", e);
                        live = false;
                    }
                }
                if tasks.iter().all(TaskSnapshot::is_terminal) {
                    break;
                }
            }
        }
    }

    engine.shutdown().await;

    let tasks = engine.list_tasks();
    if cli.json {
        let json = serde_json::to_string_pretty(&tasks)?;
        writeln!(io::stdout().lock(), "{}", json).context("输出任务 JSON 失败")?;
    } else {
        draw(&tasks, live).context("输出任务表格失败")?;
    }

    let failed = tasks
        .iter()
        .filter(|t| t.status == TaskStatus::Failed)
        .count();
    if failed > 0 {
        warn!("{} 个任务下载失败", failed);
        return Ok(ExitCode::FAILURE);
    }

    info!("全部任务已结束");
    Ok(ExitCode::SUCCESS)
}
