//! 本地持久化存储
//!
//! 提供键值存储抽象以及变更通知：
//! - 内存存储（多个句柄共享同一份数据，模拟多个浏览器标签页）
//! - 本地文件存储（每个键一个 JSON 文件）
//!
//! 变更通知只投递给“其他”句柄，与浏览器的 storage 事件一致。

mod file;
mod memory;

pub use file::FileStore;
pub use memory::{MemoryStore, SharedMemoryStorage};

use tokio::sync::broadcast;
use uuid::Uuid;

use crate::error::Result;

/// 存储变更事件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageEvent {
    pub key: String,
    pub old_value: Option<String>,
    /// `None` 表示键被删除
    pub new_value: Option<String>,
}

#[derive(Debug, Clone)]
pub(crate) struct OriginEvent {
    pub origin: Uuid,
    pub event: StorageEvent,
}

/// 变更事件订阅，自动跳过本句柄产生的事件
pub struct StorageEvents {
    receiver: broadcast::Receiver<OriginEvent>,
    origin: Uuid,
}

impl StorageEvents {
    pub(crate) fn new(receiver: broadcast::Receiver<OriginEvent>, origin: Uuid) -> Self {
        Self { receiver, origin }
    }

    /// 等待下一个来自其他句柄的事件；存储关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<StorageEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(envelope) if envelope.origin == self.origin => continue,
                Ok(envelope) => return Some(envelope.event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped = skipped, "Storage event subscriber lagged");
                    continue;
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

/// 持久化键值存储
pub trait DurableStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>>;

    fn set(&self, key: &str, value: &str) -> Result<()>;

    fn remove(&self, key: &str) -> Result<()>;

    /// 订阅其他句柄产生的变更
    fn subscribe(&self) -> StorageEvents;
}
