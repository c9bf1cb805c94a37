//! CRM 管理后台协调层主入口
//! 恢复会话、启动多标签页同步与实时权限同步，直到 Ctrl+C

use crm_admin::{
    api::HttpTransport, config::AppConfig, realtime::EventBus, storage::FileStore, telemetry,
    AppContext,
};
use std::sync::Arc;
use tokio::signal;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ===== CLI 参数处理 =====
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 {
        match args[1].as_str() {
            "--version" => {
                println!("crm-admin {}", env!("CARGO_PKG_VERSION"));
                return Ok(());
            }
            "--help" => {
                print_help();
                return Ok(());
            }
            _ => {
                eprintln!("未知参数: {}", args[1]);
                print_help();
                std::process::exit(1);
            }
        }
    }

    // 加载 .env 文件（开发环境）
    // 按优先级加载：.env.local > .env.development > .env
    if let Ok(env) = std::env::var("CRM_ENV") {
        dotenv::from_filename(format!(".env.{}", env)).ok();
    } else {
        dotenv::from_filename(".env.local").ok();
        dotenv::from_filename(".env.development").ok();
        dotenv::dotenv().ok();
    }

    // 1. 加载配置
    let config = AppConfig::from_env().map_err(|e| {
        eprintln!("Configuration error: {}", e);
        anyhow::anyhow!("Failed to load configuration: {}", e)
    })?;

    // 2. 初始化日志
    telemetry::init_telemetry(&config);

    // 3. 本地存储与传输
    let store = Arc::new(FileStore::new(&config.storage.dir)?);
    let transport = Arc::new(HttpTransport::new(&config)?);
    let realtime = Arc::new(EventBus::new(config.realtime.event_buffer));

    // 4. 恢复会话并启动后台同步
    let context = AppContext::new(config, store, transport, realtime);
    context.start();

    let session = context.session.snapshot();
    tracing::info!(
        authorized = session.is_authorized(),
        is_admin = session.is_admin(),
        permissions = session.permission_names().len(),
        profile_id = ?context.profile.profile_id(),
        "Session ready"
    );

    // 5. 等待退出信号
    shutdown_signal().await;
    context.shutdown().await;

    tracing::info!("Shutdown complete");
    Ok(())
}

/// 退出信号处理
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "Failed to install terminate handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Ctrl+C received, shutting down");
        },
        _ = terminate => {
            tracing::info!("Terminate signal received, shutting down");
        },
    }
}

/// 打印帮助信息
fn print_help() {
    println!("crm-admin {}", env!("CARGO_PKG_VERSION"));
    println!();
    println!("用法: crm-admin [选项]");
    println!();
    println!("选项:");
    println!("  --version     打印版本信息并退出");
    println!("  --help        打印此帮助信息并退出");
    println!();
    println!("环境变量:");
    println!("  所有配置通过 CRM_ 前缀的环境变量完成，例如 CRM_API__BASE_URL");
    println!("  可用选项请参考 .env.example");
}
