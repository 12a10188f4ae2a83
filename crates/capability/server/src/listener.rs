//! TCP 接入监听器

use crate::config::ServerConfig;
use crate::index::SessionIndex;
use crate::session::{SessionContext, run_session};
use geotrack_protocol::ProtocolDetector;
use geotrack_storage::{DeviceRegistry, PositionSink};
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::timeout;
use tracing::{error, info, warn};

/// 停机后等待在途会话退出的宽限期。
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// TCP 接入监听器：接收连接并为每条连接派生会话任务。
pub struct Listener {
    listener: TcpListener,
    ctx: Arc<SessionContext>,
}

impl Listener {
    /// 绑定监听端口并装配会话协作方。
    pub async fn bind(
        config: ServerConfig,
        registry: Arc<dyn DeviceRegistry>,
        sink: Arc<dyn PositionSink>,
    ) -> io::Result<Self> {
        let addr = format!("0.0.0.0:{}", config.tcp_port);
        let listener = TcpListener::bind(&addr).await?;
        info!("tcp server listening on {}", addr);
        info!("supported protocols: gt06, h02, teltonika");

        let ctx = Arc::new(SessionContext {
            config,
            detector: ProtocolDetector::new(),
            registry,
            sink,
            index: Arc::new(SessionIndex::new()),
        });
        Ok(Self { listener, ctx })
    }

    /// 实际监听地址（端口 0 绑定时测试用）。
    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// 在线会话索引（监控与测试用）。
    pub fn index(&self) -> Arc<SessionIndex> {
        self.ctx.index.clone()
    }

    /// 接收循环，直到停机信号翻转。
    ///
    /// 停机流程：停止接收 → 会话各自观察到信号退出 →
    /// 宽限期内未退出的任务被强制中止。
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> io::Result<()> {
        let mut sessions = JoinSet::new();
        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            sessions.spawn(run_session(
                                self.ctx.clone(),
                                stream,
                                peer,
                                shutdown.clone(),
                            ));
                        }
                        Err(err) => {
                            error!(error = %err, "failed to accept connection");
                        }
                    }
                }
                _ = shutdown.changed() => {
                    info!("shutdown requested, draining sessions");
                    break;
                }
            }
        }

        // 停止接收新连接
        drop(self.listener);

        let drained = timeout(SHUTDOWN_GRACE, async {
            while sessions.join_next().await.is_some() {}
        })
        .await;
        if drained.is_err() {
            warn!(remaining = sessions.len(), "grace period elapsed, aborting sessions");
            sessions.abort_all();
            while sessions.join_next().await.is_some() {}
        }
        info!("listener stopped");
        Ok(())
    }
}
