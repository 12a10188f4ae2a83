//! 编解码器能力集与统一解码结果类型

use crate::error::CodecError;
use domain::{AttrMap, Fix, Protocol};

/// 一个完整的线上帧。
///
/// 帧内容为缓冲区前 `consumed` 个字节；会话在分发后
/// 从缓冲区头部移除同样数量的字节。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    /// 应从缓冲区消费的字节数（即帧总长）
    pub consumed: usize,
}

/// 报警类别（封闭集合，跨协议统一命名）。
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AlarmKind {
    Sos,
    PowerCut,
    Vibration,
    FenceIn,
    FenceOut,
    Geofence,
    LowBattery,
    Overspeed,
    /// 未知类别码，保留原始编号
    Unknown(String),
}

impl AlarmKind {
    /// 写入 Position 属性的报警标签。
    pub fn label(&self) -> &str {
        match self {
            AlarmKind::Sos => "sos",
            AlarmKind::PowerCut => "powerCut",
            AlarmKind::Vibration => "vibration",
            AlarmKind::FenceIn => "fenceIn",
            AlarmKind::FenceOut => "fenceOut",
            AlarmKind::Geofence => "geofence",
            AlarmKind::LowBattery => "lowBattery",
            AlarmKind::Overspeed => "overspeed",
            AlarmKind::Unknown(label) => label,
        }
    }
}

/// 解码结果的统一标签联合。
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// 登录帧，携带设备唯一标识
    Login { unique_id: String },
    /// 定位帧
    Location(Fix),
    /// 状态 / 心跳帧，只携带属性
    Status { attributes: AttrMap },
    /// 报警帧：定位数据加报警类别
    Alarm { fix: Fix, kind: AlarmKind },
    /// 空心跳（无任何载荷的保活帧）
    Heartbeat,
}

/// 单协议编解码器能力集。
///
/// 实现必须跨帧无状态、可重入，可被所有会话共享。
pub trait ProtocolCodec: Send + Sync {
    /// 协议标识。
    fn protocol(&self) -> Protocol;

    /// 对连接首字节做廉价签名匹配（<= 4 字节）。
    fn detect(&self, prefix: &[u8]) -> bool;

    /// 从缓冲区头部提取下一个完整帧。
    ///
    /// `Ok(None)` 表示数据不足需要继续读；`Err` 表示流已失步。
    /// 纯函数：对同一缓冲区内容结果恒定。
    fn next_frame(&self, buf: &[u8]) -> Result<Option<Frame>, CodecError>;

    /// 解码一个完整帧。
    fn decode(&self, frame: &[u8]) -> Result<Decoded, CodecError>;

    /// 生成应立即回写的协议应答；`None` 表示该消息无应答。
    fn ack(&self, decoded: &Decoded, serial: u16) -> Option<Vec<u8>>;

    /// 在完整解码前从帧中提取设备唯一标识（仅登录 / 首帧需要）。
    fn extract_unique_id(&self, frame: &[u8]) -> Option<String>;
}
