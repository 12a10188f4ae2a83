//! 设备记录模型

use chrono::{DateTime, Utc};

/// 注册表中的设备记录。
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRecord {
    /// 注册表分配的不透明标识
    pub id: String,
    /// 设备上报的唯一标识（IMEI 等）
    pub unique_id: String,
    pub name: String,
    pub owner: Option<String>,
    pub status: String,
    /// 最近一次接入使用的协议标签
    pub protocol: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_update: DateTime<Utc>,
}

impl DeviceRecord {
    /// 新建处于激活状态的设备记录。
    pub fn new(unique_id: impl Into<String>, name: impl Into<String>) -> Self {
        let unique_id = unique_id.into();
        let now = Utc::now();
        Self {
            id: unique_id.clone(),
            unique_id,
            name: name.into(),
            owner: None,
            status: "active".to_string(),
            protocol: None,
            created_at: now,
            last_update: now,
        }
    }

    /// 为 `test-` / `demo-` 前缀合成的临时设备记录，
    /// 只在 test_mode 下绕过注册表使用。
    pub fn test_device(unique_id: impl Into<String>, protocol: &str) -> Self {
        let mut record = Self::new(unique_id, "Test Device");
        record.protocol = Some(protocol.to_string());
        record
    }

    /// 唯一标识是否带测试前缀。
    pub fn is_test_device(&self) -> bool {
        has_test_prefix(&self.unique_id)
    }
}

/// `test-` / `demo-` 前缀判定（鉴权旁路用）。
pub fn has_test_prefix(unique_id: &str) -> bool {
    unique_id.starts_with("test-") || unique_id.starts_with("demo-")
}
