//! 协议自动探测
//!
//! 对连接首字节按固定顺序嗅探各编解码器的签名：
//! GT06（`0x78 0x78`）→ H02（`*HQ`）→ Teltonika（兜底）。
//! 每个会话只探测一次，绑定后不再变更。

use crate::codec::ProtocolCodec;
use crate::gt06::Gt06Codec;
use crate::h02::H02Codec;
use crate::teltonika::TeltonikaCodec;
use std::sync::Arc;

/// 探测前建议凑齐的字节数。
pub const MIN_DETECT_BYTES: usize = 4;

/// 无任何编解码器匹配时，至多容忍的首字节数；超过即关闭连接。
pub const NO_MATCH_CLOSE_BYTES: usize = 8;

/// 协议探测器：持有全部编解码器实例（不可变、跨会话共享）。
pub struct ProtocolDetector {
    codecs: Vec<Arc<dyn ProtocolCodec>>,
}

impl ProtocolDetector {
    /// 标准编解码器集合，按探测优先级排列。
    pub fn new() -> Self {
        Self::with_codecs(vec![
            Arc::new(Gt06Codec::new()),
            Arc::new(H02Codec::new()),
            Arc::new(TeltonikaCodec::new()),
        ])
    }

    /// 自定义编解码器集合（测试或裁剪部署用）。
    pub fn with_codecs(codecs: Vec<Arc<dyn ProtocolCodec>>) -> Self {
        Self { codecs }
    }

    /// 依序返回第一个签名匹配的编解码器。
    pub fn detect(&self, prefix: &[u8]) -> Option<Arc<dyn ProtocolCodec>> {
        self.codecs
            .iter()
            .find(|codec| codec.detect(prefix))
            .cloned()
    }
}

impl Default for ProtocolDetector {
    fn default() -> Self {
        Self::new()
    }
}
