//! 在线会话索引
//!
//! 以 device_id 为键的共享表，锁只在插入、移除与重连替换
//! 的小临界区内持有。同设备重复上线时新连接获胜，旧会话
//! 收到关闭信号。

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// 索引中一个在线会话的句柄。
#[derive(Clone)]
pub struct SessionHandle {
    /// 会话 ID（区分同设备的先后连接）
    pub session_id: String,
    /// 通知会话尽快关闭
    pub close: Arc<Notify>,
}

impl SessionHandle {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            close: Arc::new(Notify::new()),
        }
    }
}

/// 在线会话索引。
#[derive(Default)]
pub struct SessionIndex {
    inner: Mutex<HashMap<String, SessionHandle>>,
}

impl SessionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入新会话；设备已在线时不覆盖，返回 false。
    pub fn insert(&self, device_id: &str, handle: SessionHandle) -> bool {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if map.contains_key(device_id) {
            return false;
        }
        map.insert(device_id.to_string(), handle);
        true
    }

    /// 插入新会话并返回被顶替的旧会话句柄（如有）。
    pub fn replace_existing(&self, device_id: &str, handle: SessionHandle) -> Option<SessionHandle> {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.insert(device_id.to_string(), handle)
    }

    /// 移除会话；只有 session_id 仍然匹配时才移除，
    /// 避免误删已经顶替上来的新会话。
    pub fn remove(&self, device_id: &str, session_id: &str) -> bool {
        let mut map = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        match map.get(device_id) {
            Some(handle) if handle.session_id == session_id => {
                map.remove(device_id);
                true
            }
            _ => false,
        }
    }

    /// 当前在线设备的会话 ID。
    pub fn session_id(&self, device_id: &str) -> Option<String> {
        self.inner
            .lock()
            .ok()
            .and_then(|map| map.get(device_id).map(|handle| handle.session_id.clone()))
    }

    pub fn len(&self) -> usize {
        self.inner.lock().map(|map| map.len()).unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
