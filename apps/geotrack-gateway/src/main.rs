//! 网关进程入口：配置加载、日志初始化、监听器装配与停机。

use geotrack_config::AppConfig;
use geotrack_server::{Listener, ServerConfig};
use geotrack_storage::{InMemoryDeviceRegistry, InMemoryPositionSink};
use geotrack_telemetry::init_tracing;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

#[tokio::main]
async fn main() -> ExitCode {
    // 加载本地 .env（如存在），便于直接 cargo run 启动
    dotenvy::dotenv().ok();

    // 从环境变量加载运行配置
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("fatal configuration error: {err}");
            return ExitCode::from(2);
        }
    };

    // 初始化结构化日志
    init_tracing();

    let server_config = ServerConfig {
        tcp_port: config.tcp_port,
        idle_timeout: Duration::from_secs(config.idle_timeout_s),
        write_timeout: Duration::from_secs(config.write_timeout_s),
        outbound_queue_cap: config.outbound_queue_cap,
        max_frame_bytes: config.max_frame_bytes,
        test_mode: config.test_mode,
        debug_protocols: config.debug_protocols,
    };

    // 外部协作方接线：生产部署替换为真实注册表与下游实现
    let registry = Arc::new(InMemoryDeviceRegistry::new());
    let sink = Arc::new(InMemoryPositionSink::new());

    let listener = match Listener::bind(server_config, registry, sink).await {
        Ok(listener) => listener,
        Err(err) => {
            error!(error = %err, "failed to bind tcp listener");
            return ExitCode::from(1);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let server = tokio::spawn(listener.run(shutdown_rx));

    if tokio::signal::ctrl_c().await.is_ok() {
        info!("ctrl-c received, shutting down");
    }
    let _ = shutdown_tx.send(true);

    match server.await {
        Ok(Ok(())) => ExitCode::SUCCESS,
        Ok(Err(err)) => {
            error!(error = %err, "listener failed");
            ExitCode::from(1)
        }
        Err(err) => {
            error!(error = %err, "listener task failed");
            ExitCode::from(1)
        }
    }
}
