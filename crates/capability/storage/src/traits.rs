//! 存储接口 Trait 定义
//!
//! 设计原则：
//! - 接口由核心定义，后端（文档库 / 缓存 / 内存）在外部实现
//! - 所有实现必须线程安全（Send + Sync）
//! - 使用 async_trait 支持动态分发

use crate::error::StorageError;
use crate::models::DeviceRecord;
use async_trait::async_trait;
use domain::Position;

/// 设备注册表接口
///
/// 鉴权路径上的只读查询；调用方负责给查询加截止时间。
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    /// 按设备唯一标识查找设备记录。
    async fn find_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError>;
}

/// 位置记录下游接口
///
/// 实现可同步可异步；会话层通过有界队列调用，
/// 发布失败只计数丢弃，绝不反压到读循环。
#[async_trait]
pub trait PositionSink: Send + Sync {
    /// 投递一条位置记录（每条恰好一次）。
    async fn publish(&self, position: Position) -> Result<(), StorageError>;
}
