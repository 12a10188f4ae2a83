//! 内存存储实现
//!
//! 仅用于本地联调与测试。

use crate::error::StorageError;
use crate::models::DeviceRecord;
use crate::traits::{DeviceRegistry, PositionSink};
use async_trait::async_trait;
use domain::Position;
use std::collections::HashMap;
use std::sync::{Mutex, RwLock};

/// 设备注册表内存实现（RwLock + HashMap）。
#[derive(Default)]
pub struct InMemoryDeviceRegistry {
    devices: RwLock<HashMap<String, DeviceRecord>>,
}

impl InMemoryDeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// 预置一条设备记录（按 unique_id 索引）。
    pub fn register(&self, record: DeviceRecord) {
        if let Ok(mut map) = self.devices.write() {
            map.insert(record.unique_id.clone(), record);
        }
    }
}

#[async_trait]
impl DeviceRegistry for InMemoryDeviceRegistry {
    async fn find_by_unique_id(
        &self,
        unique_id: &str,
    ) -> Result<Option<DeviceRecord>, StorageError> {
        let record = self
            .devices
            .read()
            .map_err(|_| StorageError::new("lock failed"))?
            .get(unique_id)
            .cloned();
        Ok(record)
    }
}

/// 位置下游内存实现：按到达顺序累积全部记录。
#[derive(Default)]
pub struct InMemoryPositionSink {
    positions: Mutex<Vec<Position>>,
}

impl InMemoryPositionSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// 已接收记录的快照（到达顺序）。
    pub fn positions(&self) -> Vec<Position> {
        self.positions
            .lock()
            .map(|positions| positions.clone())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.positions.lock().map(|p| p.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl PositionSink for InMemoryPositionSink {
    async fn publish(&self, position: Position) -> Result<(), StorageError> {
        self.positions
            .lock()
            .map_err(|_| StorageError::new("lock failed"))?
            .push(position);
        Ok(())
    }
}
