//! 每会话有界出站位置队列
//!
//! 读循环向队列推入，发布子任务从队列取出写往下游；
//! 队列满时挤掉最旧记录而不是阻塞读循环，保证保活应答
//! 不被慢下游拖死。会话内记录保持 FIFO 顺序。

use domain::Position;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Notify;

/// 有界位置队列（单生产者单消费者）。
pub struct PositionQueue {
    inner: Mutex<VecDeque<Position>>,
    notify: Notify,
    capacity: usize,
    closed: AtomicBool,
}

impl PositionQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            notify: Notify::new(),
            capacity: capacity.max(1),
            closed: AtomicBool::new(false),
        }
    }

    /// 推入一条记录；队列满时挤掉最旧的一条。
    ///
    /// 返回 false 表示发生了挤出（调用方负责计数）。
    pub fn push(&self, position: Position) -> bool {
        let mut queue = self
            .inner
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut kept_all = true;
        if queue.len() >= self.capacity {
            queue.pop_front();
            kept_all = false;
        }
        queue.push_back(position);
        drop(queue);
        self.notify.notify_one();
        kept_all
    }

    /// 取出下一条记录；队列排空且已关闭时返回 None。
    pub async fn pop(&self) -> Option<Position> {
        loop {
            {
                let mut queue = self
                    .inner
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                if let Some(position) = queue.pop_front() {
                    return Some(position);
                }
            }
            if self.closed.load(Ordering::Acquire) {
                return None;
            }
            self.notify.notified().await;
        }
    }

    /// 关闭队列：消费方排空剩余记录后退出。
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .map(|queue| queue.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
