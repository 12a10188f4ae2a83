//! 单连接会话
//!
//! 状态机：`AwaitingDetect → AwaitingAuth → Authenticated → Closing`。
//!
//! 读循环独占帧缓冲：读入 → 循环提帧 → 解码分发，应答在读下
//! 一帧之前写完，依赖应答做流控的设备因此自然反压。位置经
//! 有界队列交给发布子任务，下游慢不会拖住读循环。

use crate::config::ServerConfig;
use crate::error::SessionError;
use crate::index::{SessionHandle, SessionIndex};
use crate::queue::PositionQueue;
use bytes::{Buf, BytesMut};
use domain::Position;
use geotrack_protocol::{
    CodecError, Decoded, MIN_DETECT_BYTES, NO_MATCH_CLOSE_BYTES, ProtocolCodec, ProtocolDetector,
    hex_dump,
};
use geotrack_storage::{DeviceRecord, DeviceRegistry, PositionSink, has_test_prefix};
use geotrack_telemetry as telemetry;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// 注册表查询的截止时间。
const REGISTRY_LOOKUP_TIMEOUT: Duration = Duration::from_secs(5);

/// 会话状态机。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SessionState {
    AwaitingDetect,
    AwaitingAuth,
    Authenticated,
    Closing,
}

/// 全部会话共享的协作方集合。
pub(crate) struct SessionContext {
    pub config: ServerConfig,
    pub detector: ProtocolDetector,
    pub registry: Arc<dyn DeviceRegistry>,
    pub sink: Arc<dyn PositionSink>,
    pub index: Arc<SessionIndex>,
}

/// 处理一条 TCP 连接直至关闭。
pub(crate) async fn run_session(
    ctx: Arc<SessionContext>,
    stream: TcpStream,
    peer: SocketAddr,
    mut shutdown: watch::Receiver<bool>,
) {
    let session_id = telemetry::new_session_id();
    telemetry::record_session_opened();
    info!(session_id = %session_id, peer = %peer, "new connection");

    let (mut reader, writer) = stream.into_split();
    let queue = Arc::new(PositionQueue::new(ctx.config.outbound_queue_cap));
    let publisher = tokio::spawn(publish_loop(
        session_id.clone(),
        queue.clone(),
        ctx.sink.clone(),
    ));

    let mut session = Session {
        id: session_id,
        ctx: ctx.clone(),
        state: SessionState::AwaitingDetect,
        codec: None,
        device_id: None,
        serial: 0,
        buffer: BytesMut::with_capacity(4096),
        close: Arc::new(Notify::new()),
        writer: Arc::new(Mutex::new(writer)),
        queue: queue.clone(),
    };

    match session.read_loop(&mut reader, &mut shutdown).await {
        Ok(()) => info!(session_id = %session.id, "session closed"),
        Err(SessionError::PeerClosed) => {
            info!(session_id = %session.id, "peer closed connection");
        }
        Err(SessionError::IdleTimeout) => {
            info!(session_id = %session.id, "session idle, closing");
        }
        Err(err) => {
            warn!(session_id = %session.id, error = %err, "session closed with error");
        }
    }
    session.state = SessionState::Closing;

    // 排空出站队列后结束发布子任务
    queue.close();
    let _ = publisher.await;

    if let Some(device_id) = session.device_id.as_deref() {
        if ctx.index.remove(device_id, &session.id) {
            debug!(session_id = %session.id, device_id = %device_id, "session removed from index");
        }
    }
    telemetry::record_session_closed();
}

struct Session {
    id: String,
    ctx: Arc<SessionContext>,
    state: SessionState,
    codec: Option<Arc<dyn ProtocolCodec>>,
    device_id: Option<String>,
    /// 应答序列号，每次应答前递增
    serial: u16,
    buffer: BytesMut,
    /// 被新连接顶替时收到关闭信号
    close: Arc<Notify>,
    /// 出站写互斥：应答与管理性写入不得交错
    writer: Arc<Mutex<OwnedWriteHalf>>,
    queue: Arc<PositionQueue>,
}

impl Session {
    async fn read_loop(
        &mut self,
        reader: &mut OwnedReadHalf,
        shutdown: &mut watch::Receiver<bool>,
    ) -> Result<(), SessionError> {
        loop {
            self.drain_buffer().await?;
            if self.state == SessionState::Closing {
                return Ok(());
            }

            let close = self.close.clone();
            let read = tokio::select! {
                read = timeout(
                    self.ctx.config.idle_timeout,
                    reader.read_buf(&mut self.buffer),
                ) => read,
                _ = shutdown.changed() => {
                    info!(session_id = %self.id, "shutdown signal received");
                    return Ok(());
                }
                _ = close.notified() => {
                    info!(session_id = %self.id, "replaced by newer connection");
                    return Ok(());
                }
            };

            let n = match read {
                Ok(Ok(n)) => n,
                Ok(Err(err)) => return Err(SessionError::Io(err)),
                Err(_) => {
                    telemetry::record_idle_timeout();
                    return Err(SessionError::IdleTimeout);
                }
            };
            if n == 0 {
                return Err(SessionError::PeerClosed);
            }
            if self.buffer.len() > self.ctx.config.max_frame_bytes {
                telemetry::record_oversized_frame();
                return Err(SessionError::OversizedFrame {
                    limit: self.ctx.config.max_frame_bytes,
                });
            }
        }
    }

    /// 处理缓冲区内所有已完整的帧；数据不足时返回等待下次读。
    async fn drain_buffer(&mut self) -> Result<(), SessionError> {
        loop {
            match self.state {
                SessionState::AwaitingDetect => {
                    if self.buffer.len() < MIN_DETECT_BYTES {
                        return Ok(());
                    }
                    match self.ctx.detector.detect(&self.buffer) {
                        Some(codec) => {
                            info!(
                                session_id = %self.id,
                                protocol = %codec.protocol(),
                                "protocol detected"
                            );
                            self.codec = Some(codec);
                            self.state = SessionState::AwaitingAuth;
                        }
                        None if self.buffer.len() >= NO_MATCH_CLOSE_BYTES => {
                            return Err(SessionError::Codec(CodecError::InvalidHeader(
                                "no protocol signature matched".to_string(),
                            )));
                        }
                        None => return Ok(()),
                    }
                }
                SessionState::AwaitingAuth | SessionState::Authenticated => {
                    let Some(codec) = self.codec.clone() else {
                        return Ok(());
                    };
                    let frame = match codec.next_frame(&self.buffer) {
                        Ok(Some(frame)) => frame,
                        Ok(None) => return Ok(()),
                        Err(err) => {
                            telemetry::record_decode_error();
                            return Err(SessionError::Codec(err));
                        }
                    };
                    let bytes = self.buffer[..frame.consumed].to_vec();
                    self.buffer.advance(frame.consumed);
                    self.handle_frame(&codec, &bytes).await?;
                }
                SessionState::Closing => return Ok(()),
            }
        }
    }

    async fn handle_frame(
        &mut self,
        codec: &Arc<dyn ProtocolCodec>,
        frame: &[u8],
    ) -> Result<(), SessionError> {
        if self.ctx.config.debug_protocols {
            debug!(
                session_id = %self.id,
                protocol = %codec.protocol(),
                len = frame.len(),
                "frame\n{}",
                hex_dump(frame)
            );
        }

        if self.state == SessionState::AwaitingAuth {
            return self.authenticate(codec, frame).await;
        }

        match codec.decode(frame) {
            Ok(decoded) => {
                telemetry::record_frame_decoded();
                self.serial = self.serial.wrapping_add(1);
                if let Some(ack) = codec.ack(&decoded, self.serial) {
                    self.write_with_deadline(&ack).await?;
                    telemetry::record_ack_written();
                }
                self.dispatch(decoded);
                Ok(())
            }
            Err(err) if err.is_fatal() => {
                telemetry::record_decode_error();
                Err(SessionError::Codec(err))
            }
            Err(err) => {
                // 单帧数值错误：丢弃该帧，会话继续
                telemetry::record_decode_error();
                warn!(
                    session_id = %self.id,
                    protocol = %codec.protocol(),
                    error = %err,
                    "frame dropped"
                );
                Ok(())
            }
        }
    }

    /// 鉴权：首帧提取设备标识，注册表核验后绑定会话。
    ///
    /// 首帧只用于身份识别，不再作为数据帧重复解码；
    /// 鉴权失败时不回任何应答，由设备按自身节奏重连。
    async fn authenticate(
        &mut self,
        codec: &Arc<dyn ProtocolCodec>,
        frame: &[u8],
    ) -> Result<(), SessionError> {
        let Some(unique_id) = codec.extract_unique_id(frame) else {
            telemetry::record_auth_failure();
            return Err(SessionError::Codec(CodecError::MalformedPacket(
                "first frame carries no device identity".to_string(),
            )));
        };

        let record = self.lookup_device(codec, &unique_id).await?;
        telemetry::record_auth_success();
        info!(
            session_id = %self.id,
            device_id = %record.id,
            unique_id = %unique_id,
            protocol = %codec.protocol(),
            "device authenticated"
        );

        // 同设备重复上线：新连接获胜，旧会话收到关闭信号
        let handle = SessionHandle {
            session_id: self.id.clone(),
            close: self.close.clone(),
        };
        if let Some(old) = self.ctx.index.replace_existing(&record.id, handle) {
            telemetry::record_session_replaced();
            info!(
                session_id = %self.id,
                device_id = %record.id,
                old_session = %old.session_id,
                "duplicate connection, closing older session"
            );
            old.close.notify_one();
        }
        self.device_id = Some(record.id);
        self.state = SessionState::Authenticated;

        self.serial = self.serial.wrapping_add(1);
        let login = Decoded::Login { unique_id };
        if let Some(ack) = codec.ack(&login, self.serial) {
            self.write_with_deadline(&ack).await?;
            telemetry::record_ack_written();
        }
        Ok(())
    }

    async fn lookup_device(
        &self,
        codec: &Arc<dyn ProtocolCodec>,
        unique_id: &str,
    ) -> Result<DeviceRecord, SessionError> {
        // test- / demo- 前缀在 test_mode 下绕过注册表
        if self.ctx.config.test_mode && has_test_prefix(unique_id) {
            debug!(session_id = %self.id, unique_id = %unique_id, "accepting test device");
            return Ok(DeviceRecord::test_device(
                unique_id,
                codec.protocol().as_str(),
            ));
        }

        let lookup = timeout(
            REGISTRY_LOOKUP_TIMEOUT,
            self.ctx.registry.find_by_unique_id(unique_id),
        )
        .await;
        match lookup {
            Ok(Ok(Some(record))) => Ok(record),
            Ok(Ok(None)) => {
                telemetry::record_auth_failure();
                Err(SessionError::UnknownDevice(unique_id.to_string()))
            }
            Ok(Err(err)) => {
                telemetry::record_auth_failure();
                Err(SessionError::Registry(err.to_string()))
            }
            Err(_) => {
                telemetry::record_auth_failure();
                Err(SessionError::Registry(format!(
                    "lookup timed out after {REGISTRY_LOOKUP_TIMEOUT:?}"
                )))
            }
        }
    }

    fn dispatch(&self, decoded: Decoded) {
        let Some(device_id) = self.device_id.as_deref() else {
            return;
        };
        match decoded {
            Decoded::Location(fix) => self.enqueue(fix.into_position(device_id)),
            Decoded::Alarm { fix, kind } => {
                info!(
                    session_id = %self.id,
                    device_id = %device_id,
                    alarm = kind.label(),
                    "alarm received"
                );
                self.enqueue(fix.into_position(device_id));
            }
            Decoded::Status { attributes } => {
                debug!(
                    session_id = %self.id,
                    device_id = %device_id,
                    ?attributes,
                    "status report"
                );
            }
            Decoded::Login { .. } | Decoded::Heartbeat => {}
        }
    }

    fn enqueue(&self, position: Position) {
        if !self.queue.push(position) {
            telemetry::record_position_dropped();
            warn!(session_id = %self.id, "outbound queue full, dropped oldest position");
        }
    }

    async fn write_with_deadline(&self, data: &[u8]) -> Result<(), SessionError> {
        let mut writer = self.writer.lock().await;
        match timeout(self.ctx.config.write_timeout, writer.write_all(data)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(SessionError::Io(err)),
            Err(_) => Err(SessionError::WriteTimeout),
        }
    }
}

/// 发布子任务：排空会话队列写往下游。
async fn publish_loop(session_id: String, queue: Arc<PositionQueue>, sink: Arc<dyn PositionSink>) {
    while let Some(position) = queue.pop().await {
        match sink.publish(position).await {
            Ok(()) => telemetry::record_position_published(),
            Err(err) => {
                telemetry::record_sink_error();
                warn!(
                    session_id = %session_id,
                    error = %err,
                    "sink publish failed, position dropped"
                );
            }
        }
    }
}
