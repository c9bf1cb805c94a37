use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::broadcast;
use uuid::Uuid;

use super::{DurableStore, OriginEvent, StorageEvent, StorageEvents};
use crate::error::{AppError, Result};

/// 多个句柄共享的内存数据
#[derive(Clone)]
pub struct SharedMemoryStorage {
    entries: Arc<Mutex<HashMap<String, String>>>,
    sender: broadcast::Sender<OriginEvent>,
}

impl SharedMemoryStorage {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            entries: Arc::new(Mutex::new(HashMap::new())),
            sender,
        }
    }

    /// 打开一个新句柄（相当于一个新的标签页）
    pub fn handle(&self) -> MemoryStore {
        MemoryStore {
            shared: self.clone(),
            origin: Uuid::new_v4(),
        }
    }
}

impl Default for SharedMemoryStorage {
    fn default() -> Self {
        Self::new(64)
    }
}

/// 内存存储句柄
#[derive(Clone)]
pub struct MemoryStore {
    shared: SharedMemoryStorage,
    origin: Uuid,
}

impl MemoryStore {
    /// 独立的单句柄存储
    pub fn standalone() -> Self {
        SharedMemoryStorage::default().handle()
    }

    fn write(&self, key: &str, value: Option<&str>) -> Result<()> {
        let old_value = {
            let mut entries = self
                .shared
                .entries
                .lock()
                .map_err(|_| AppError::storage("memory storage lock poisoned"))?;
            match value {
                Some(v) => entries.insert(key.to_string(), v.to_string()),
                None => entries.remove(key),
            }
        };

        // 值未变化时不产生事件
        if old_value.as_deref() == value {
            return Ok(());
        }

        let event = StorageEvent {
            key: key.to_string(),
            old_value,
            new_value: value.map(str::to_string),
        };
        // 没有订阅者时发送失败是正常情况
        let _ = self.shared.sender.send(OriginEvent {
            origin: self.origin,
            event,
        });
        Ok(())
    }
}

impl DurableStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self
            .shared
            .entries
            .lock()
            .map_err(|_| AppError::storage("memory storage lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        self.write(key, Some(value))
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.write(key, None)
    }

    fn subscribe(&self) -> StorageEvents {
        StorageEvents::new(self.shared.sender.subscribe(), self.origin)
    }
}
