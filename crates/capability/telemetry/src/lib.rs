//! 追踪初始化与网关指标。

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing_subscriber::{EnvFilter, fmt};

/// 指标快照。
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub sessions_closed: u64,
    pub sessions_replaced: u64,
    pub auth_success: u64,
    pub auth_failure: u64,
    pub frames_decoded: u64,
    pub decode_errors: u64,
    pub positions_published: u64,
    pub positions_dropped: u64,
    pub sink_errors: u64,
    pub acks_written: u64,
    pub oversized_frames: u64,
    pub idle_timeouts: u64,
}

/// 网关运行指标。
pub struct GatewayMetrics {
    sessions_opened: AtomicU64,
    sessions_closed: AtomicU64,
    sessions_replaced: AtomicU64,
    auth_success: AtomicU64,
    auth_failure: AtomicU64,
    frames_decoded: AtomicU64,
    decode_errors: AtomicU64,
    positions_published: AtomicU64,
    positions_dropped: AtomicU64,
    sink_errors: AtomicU64,
    acks_written: AtomicU64,
    oversized_frames: AtomicU64,
    idle_timeouts: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self {
            sessions_opened: AtomicU64::new(0),
            sessions_closed: AtomicU64::new(0),
            sessions_replaced: AtomicU64::new(0),
            auth_success: AtomicU64::new(0),
            auth_failure: AtomicU64::new(0),
            frames_decoded: AtomicU64::new(0),
            decode_errors: AtomicU64::new(0),
            positions_published: AtomicU64::new(0),
            positions_dropped: AtomicU64::new(0),
            sink_errors: AtomicU64::new(0),
            acks_written: AtomicU64::new(0),
            oversized_frames: AtomicU64::new(0),
            idle_timeouts: AtomicU64::new(0),
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            sessions_closed: self.sessions_closed.load(Ordering::Relaxed),
            sessions_replaced: self.sessions_replaced.load(Ordering::Relaxed),
            auth_success: self.auth_success.load(Ordering::Relaxed),
            auth_failure: self.auth_failure.load(Ordering::Relaxed),
            frames_decoded: self.frames_decoded.load(Ordering::Relaxed),
            decode_errors: self.decode_errors.load(Ordering::Relaxed),
            positions_published: self.positions_published.load(Ordering::Relaxed),
            positions_dropped: self.positions_dropped.load(Ordering::Relaxed),
            sink_errors: self.sink_errors.load(Ordering::Relaxed),
            acks_written: self.acks_written.load(Ordering::Relaxed),
            oversized_frames: self.oversized_frames.load(Ordering::Relaxed),
            idle_timeouts: self.idle_timeouts.load(Ordering::Relaxed),
        }
    }
}

static METRICS: OnceLock<GatewayMetrics> = OnceLock::new();

/// 获取全局指标实例。
pub fn metrics() -> &'static GatewayMetrics {
    METRICS.get_or_init(GatewayMetrics::new)
}

/// 初始化 tracing（默认 info）。
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).try_init();
}

/// 生成新的会话 ID。
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// 记录会话建立。
pub fn record_session_opened() {
    metrics().sessions_opened.fetch_add(1, Ordering::Relaxed);
}

/// 记录会话关闭。
pub fn record_session_closed() {
    metrics().sessions_closed.fetch_add(1, Ordering::Relaxed);
}

/// 记录同设备重连替换旧会话。
pub fn record_session_replaced() {
    metrics().sessions_replaced.fetch_add(1, Ordering::Relaxed);
}

/// 记录鉴权成功。
pub fn record_auth_success() {
    metrics().auth_success.fetch_add(1, Ordering::Relaxed);
}

/// 记录鉴权失败。
pub fn record_auth_failure() {
    metrics().auth_failure.fetch_add(1, Ordering::Relaxed);
}

/// 记录成功解码的帧数。
pub fn record_frame_decoded() {
    metrics().frames_decoded.fetch_add(1, Ordering::Relaxed);
}

/// 记录解码失败次数。
pub fn record_decode_error() {
    metrics().decode_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录位置发布成功次数。
pub fn record_position_published() {
    metrics().positions_published.fetch_add(1, Ordering::Relaxed);
}

/// 记录因队列已满被丢弃的位置数。
pub fn record_position_dropped() {
    metrics().positions_dropped.fetch_add(1, Ordering::Relaxed);
}

/// 记录下游投递失败次数。
pub fn record_sink_error() {
    metrics().sink_errors.fetch_add(1, Ordering::Relaxed);
}

/// 记录应答回写次数。
pub fn record_ack_written() {
    metrics().acks_written.fetch_add(1, Ordering::Relaxed);
}

/// 记录帧缓冲超限次数。
pub fn record_oversized_frame() {
    metrics().oversized_frames.fetch_add(1, Ordering::Relaxed);
}

/// 记录空闲超时次数。
pub fn record_idle_timeout() {
    metrics().idle_timeouts.fetch_add(1, Ordering::Relaxed);
}
