//! 会话生命周期错误类型定义

use geotrack_protocol::CodecError;

/// 会话错误（关闭原因）。
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// 协议解码错误（仅致命类会走到这里）
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// 注册表中不存在该设备
    #[error("unknown device: {0}")]
    UnknownDevice(String),

    /// 帧缓冲超出硬上限
    #[error("frame buffer exceeded {limit} bytes")]
    OversizedFrame { limit: usize },

    /// 空闲超时
    #[error("idle timeout")]
    IdleTimeout,

    /// 对端关闭连接
    #[error("peer closed connection")]
    PeerClosed,

    /// 回写超时
    #[error("write timeout")]
    WriteTimeout,

    /// 注册表查询失败或超时
    #[error("registry error: {0}")]
    Registry(String),

    /// 底层 IO 错误
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
