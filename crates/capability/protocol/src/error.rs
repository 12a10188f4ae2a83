//! 协议解码错误类型定义

/// 编解码错误（封闭的错误分类）。
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// 起始字节或前缀不匹配
    #[error("invalid header: {0}")]
    InvalidHeader(String),

    /// 帧长度低于协议最小值
    #[error("packet too short: got {got} bytes, need at least {need}")]
    PacketTooShort { got: usize, need: usize },

    /// 长度字节与实际帧长不一致
    #[error("packet length mismatch: declared={declared}, actual={actual}")]
    InvalidLength { declared: usize, actual: usize },

    /// 校验和不匹配
    #[error("invalid checksum: calc=0x{calc:04x}, recv=0x{recv:04x}")]
    InvalidChecksum { calc: u16, recv: u16 },

    /// 未知协议号或消息标签
    #[error("unsupported message type: {0}")]
    InvalidMessageType(String),

    /// 结构性错误（结束字节、字段格式等）
    #[error("malformed packet: {0}")]
    MalformedPacket(String),

    /// 坐标非法（BCD 数字越界、分值 >= 60、度数超范围、NaN）
    #[error("invalid coordinate: {0}")]
    InvalidCoordinate(String),

    /// 时间字段越界或无法解析
    #[error("invalid timestamp: {0}")]
    InvalidTimestamp(String),

    /// 速度 / 航向 / 电量等数值越界
    #[error("invalid value: {0}")]
    InvalidValue(String),
}

impl CodecError {
    /// 是否意味着字节流已失步、会话必须关闭。
    ///
    /// 数值类错误（坐标 / 时间 / 数值）只丢弃当前帧，
    /// 结构类错误无法在未知帧界的流上重新同步。
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            CodecError::InvalidCoordinate(_)
                | CodecError::InvalidTimestamp(_)
                | CodecError::InvalidValue(_)
        )
    }
}
