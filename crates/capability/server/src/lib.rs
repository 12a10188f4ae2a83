//! # 接入服务器能力模块
//!
//! 终结定位器的长连接 TCP，驱动协议解码管线：
//!
//! ```text
//! Listener（accept + 会话任务派生 + 停机协调）
//!       │
//!       ▼
//! Session（帧缓冲 → 协议探测 → 鉴权 → 解码分发 → 应答回写）
//!       │                             │
//!       │                             ▼
//!       │                      PositionQueue（有界，满则挤掉最旧）
//!       │                             │
//!       ▼                             ▼
//! SessionIndex（同设备重连，新连接获胜）   PositionSink
//! ```
//!
//! 会话之间不共享任何可变状态；编解码器纯函数可重入，
//! 全部会话共用一组实例。

mod config;
mod error;
mod index;
mod listener;
mod queue;
mod session;

pub use config::ServerConfig;
pub use error::SessionError;
pub use index::{SessionHandle, SessionIndex};
pub use listener::Listener;
pub use queue::PositionQueue;
