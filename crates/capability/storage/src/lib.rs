//! # 存储协作方接口
//!
//! 网关核心只依赖两个外部协作方：
//! - `DeviceRegistry`：鉴权时按唯一标识查设备（只读）
//! - `PositionSink`：接收规范化位置记录
//!
//! 核心不假定任何具体后端；内存实现用于本地联调与测试。

mod error;
mod in_memory;
mod models;
mod traits;

pub use error::StorageError;
pub use in_memory::{InMemoryDeviceRegistry, InMemoryPositionSink};
pub use models::{DeviceRecord, has_test_prefix};
pub use traits::{DeviceRegistry, PositionSink};
