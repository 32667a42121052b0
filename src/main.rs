use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Arg, Command};
use std::path::Path;

use custodian::{init_logging, load_tasks, Application, ShutdownManager};
use custodian_core::AppConfig;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let matches = Command::new("custodian")
        .version(env!("CARGO_PKG_VERSION"))
        .about("备份与恢复编排守护进程")
        .arg(
            Arg::new("config")
                .short('c')
                .long("config")
                .value_name("FILE")
                .help("配置文件路径 (默认依次查找 config/custodian.toml、custodian.toml)"),
        )
        .arg(
            Arg::new("log-level")
                .short('l')
                .long("log-level")
                .value_name("LEVEL")
                .help("日志级别，覆盖配置文件")
                .value_parser(["trace", "debug", "info", "warn", "error"]),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .value_name("FORMAT")
                .help("日志格式，覆盖配置文件")
                .value_parser(["json", "pretty"]),
        )
        .arg(
            Arg::new("tasks")
                .short('t')
                .long("tasks")
                .value_name("FILE")
                .help("启动时预置到内存任务存储的任务文件 (JSON数组)"),
        )
        .get_matches();

    let config_path = matches.get_one::<String>("config").map(String::as_str);
    let config = AppConfig::load(config_path).with_context(|| match config_path {
        Some(path) => format!("加载配置文件失败: {path}"),
        None => "加载配置失败".to_string(),
    })?;

    let log_level = matches
        .get_one::<String>("log-level")
        .unwrap_or(&config.observability.log_level);
    let log_format = matches
        .get_one::<String>("log-format")
        .unwrap_or(&config.observability.log_format);
    init_logging(log_level, log_format)?;

    info!("启动备份与恢复编排守护进程");
    if let Some(path) = config_path {
        info!("配置文件: {path}");
    }

    let grace = config.scheduler.shutdown_grace();
    let app = match matches.get_one::<String>("tasks") {
        Some(path) => Application::with_tasks(config, load_tasks(Path::new(path))?).await?,
        None => Application::new(config)?,
    };
    let app = Arc::new(app);

    let shutdown_manager = ShutdownManager::new();

    let app_handle = {
        let shutdown = shutdown_manager.subscribe();
        let app = Arc::clone(&app);

        tokio::spawn(async move {
            if let Err(e) = app.run(shutdown).await {
                error!("应用运行失败: {e:#}");
            }
        })
    };

    let reason = shutdown_manager.listen_for_signals().await?;
    info!("{}，开始优雅关闭...", reason);

    // 宽限期之后调度器还会给被取消的调度单元留出收尾时间
    let deadline = grace + std::time::Duration::from_secs(10);
    match tokio::time::timeout(deadline, app_handle).await {
        Ok(Ok(())) => info!("应用已优雅关闭"),
        Ok(Err(e)) => error!("应用关闭时发生错误: {e}"),
        Err(_) => warn!("应用关闭超时，强制退出"),
    }

    info!("守护进程已退出");
    Ok(())
}
