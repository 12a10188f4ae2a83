//! # 多协议解码能力模块
//!
//! 终端定位器接入的协议层，支持：
//! - **GT06**：二进制帧，BCD 坐标与时间，XOR 校验和
//! - **H02**：ASCII 帧，`*HQ,` 前缀、逗号分隔、`#` 结尾
//! - **Teltonika**：二进制帧，IEEE-754 大端坐标（最小形态）
//!
//! ## 架构设计
//!
//! ```text
//! TCP 连接首包
//!       │
//!       ▼
//! ProtocolDetector（按固定顺序嗅探签名）
//!       │
//!       ├── Gt06Codec
//!       ├── H02Codec
//!       └── TeltonikaCodec（兜底）
//!       │
//!       ▼
//! next_frame → decode → Decoded (Login / Location / Status / Alarm)
//!       │
//!       ▼
//! Session → ack 回写 + Position 发布
//! ```
//!
//! 编解码器跨帧无状态，可在所有会话间共享；任何有状态的
//! 累积（缓冲、鉴权、序列号）都归会话层负责。

mod codec;
mod detector;
mod dump;
mod error;
mod gt06;
mod h02;
mod teltonika;

pub use codec::{AlarmKind, Decoded, Frame, ProtocolCodec};
pub use detector::{MIN_DETECT_BYTES, NO_MATCH_CLOSE_BYTES, ProtocolDetector};
pub use dump::hex_dump;
pub use error::CodecError;
pub use gt06::Gt06Codec;
pub use h02::H02Codec;
pub use teltonika::TeltonikaCodec;
