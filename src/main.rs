use anyhow::Result;
use autoexpert_vision::{config::{Config, RoboflowConfig}, web::serve};
use clap::Parser;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "autoexpert-vision")]
#[command(about = "Vehicle damage inspection service backed by pretrained vision models")]
struct Args {
    /// Server bind address
    #[arg(long, default_value = "0.0.0.0:8000")]
    bind: String,

    /// Number of worker threads
    #[arg(long)]
    workers: Option<usize>,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Model directory path
    #[arg(long, default_value = "models")]
    models_dir: String,

    /// TrueType font used for annotation labels
    #[arg(long)]
    font: Option<PathBuf>,

    /// Roboflow API key
    #[arg(long, env = "ROBOFLOW_API_KEY", hide_env_values = true)]
    roboflow_api_key: Option<String>,

    /// Roboflow project slug
    #[arg(long, default_value = "car-damage-coco-v9i")]
    roboflow_project: String,

    /// Roboflow project version
    #[arg(long, default_value_t = 1)]
    roboflow_version: u32,

    /// Enable development mode
    #[arg(long)]
    dev: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // 初始化日志系统
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&args.log_level))
        )
        .with_target(false)
        .init();

    tracing::info!("Starting AutoExpert vision service...");
    tracing::info!("Bind address: {}", args.bind);
    tracing::info!("Models directory: {}", args.models_dir);

    let roboflow = RoboflowConfig {
        api_key: args.roboflow_api_key,
        project: args.roboflow_project,
        version: args.roboflow_version,
        ..RoboflowConfig::default()
    };

    // 创建配置
    let config = Config::new(args.bind, args.models_dir, args.workers, args.dev)?
        .with_roboflow(roboflow)
        .with_font_path(args.font);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(config.workers)
        .enable_all()
        .build()?;

    // 启动服务器
    runtime.block_on(serve(config))?;

    Ok(())
}
