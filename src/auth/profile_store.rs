//! 用户资料缓存（仅保存用户 ID），与会话记录分开持久化
//!
//! 多标签页规则与会话一致：键被删除时清空本地 ID，
//! 本地没有 ID 时采用其他标签页写入的 ID。

use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::session::{Persisted, UserProfile};
use crate::storage::{DurableStore, StorageEvent};

pub struct ProfileStore {
    store: Arc<dyn DurableStore>,
    key: String,
    state: watch::Sender<UserProfile>,
}

impl ProfileStore {
    pub fn new(store: Arc<dyn DurableStore>, key: &str) -> Self {
        let (state, _) = watch::channel(UserProfile::default());
        Self {
            store,
            key: key.to_string(),
            state,
        }
    }

    /// 从持久化存储恢复；损坏的数据被忽略
    pub fn hydrate(store: Arc<dyn DurableStore>, key: &str) -> Self {
        let this = Self::new(store, key);

        match this.store.get(key) {
            Ok(Some(raw)) => match parse_persisted(&raw) {
                Ok(profile) => {
                    debug!(profile_id = ?profile.id, "Profile restored from storage");
                    this.state.send_replace(profile);
                }
                Err(e) => warn!(key = %key, error = %e, "Ignoring malformed persisted profile"),
            },
            Ok(None) => {}
            Err(e) => warn!(key = %key, error = %e, "Failed to read persisted profile"),
        }

        this
    }

    pub fn profile_id(&self) -> Option<i64> {
        self.state.borrow().id
    }

    pub fn subscribe(&self) -> watch::Receiver<UserProfile> {
        self.state.subscribe()
    }

    pub fn set_profile_id(&self, id: i64) -> Result<()> {
        let profile = UserProfile { id: Some(id) };
        let raw = serde_json::to_string(&Persisted::new(profile.clone()))?;
        self.state.send_replace(profile);
        self.store.set(&self.key, &raw)
    }

    pub fn clear(&self) -> Result<()> {
        self.reset();
        self.store.remove(&self.key)
    }

    /// 只清空内存状态，不写存储
    pub fn reset(&self) {
        if self.state.borrow().id.is_some() {
            self.state.send_replace(UserProfile::default());
        }
    }

    /// 处理其他标签页产生的存储事件，返回本地资料是否改变
    pub fn handle_storage_event(&self, event: &StorageEvent) -> bool {
        if event.key != self.key {
            return false;
        }

        let local = self.state.borrow().id;

        match (&event.new_value, local) {
            (None, Some(_)) => {
                info!("Profile removed in another tab");
                self.state.send_replace(UserProfile::default());
                true
            }
            (Some(raw), None) => match parse_persisted(raw) {
                Ok(profile) if profile.id.is_some() => {
                    info!(profile_id = ?profile.id, "Profile written in another tab, adopting it");
                    self.state.send_replace(profile);
                    true
                }
                Ok(_) => false,
                Err(e) => {
                    warn!(error = %e, "Ignoring malformed profile written by another tab");
                    false
                }
            },
            _ => false,
        }
    }
}

fn parse_persisted(raw: &str) -> serde_json::Result<UserProfile> {
    serde_json::from_str::<Persisted<UserProfile>>(raw).map(|p| p.state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SharedMemoryStorage};

    #[test]
    fn test_profile_round_trip_and_clear() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::standalone());
        let profile = ProfileStore::new(store.clone(), "user-storage");
        profile.set_profile_id(42).unwrap();

        let restored = ProfileStore::hydrate(store.clone(), "user-storage");
        assert_eq!(restored.profile_id(), Some(42));

        restored.clear().unwrap();
        assert_eq!(restored.profile_id(), None);
        assert!(store.get("user-storage").unwrap().is_none());
    }

    #[test]
    fn test_malformed_profile_is_ignored() {
        let store: Arc<dyn DurableStore> = Arc::new(MemoryStore::standalone());
        store.set("user-storage", "[1,2,3]").unwrap();

        let profile = ProfileStore::hydrate(store, "user-storage");
        assert_eq!(profile.profile_id(), None);
    }

    #[test]
    fn test_cross_tab_profile_rules() {
        let shared = SharedMemoryStorage::new(8);
        let tab_a = ProfileStore::new(Arc::new(shared.handle()), "user-storage");
        let tab_b = ProfileStore::new(Arc::new(shared.handle()), "user-storage");

        tab_a.set_profile_id(42).unwrap();
        let written = StorageEvent {
            key: "user-storage".to_string(),
            old_value: None,
            new_value: Some(r#"{"state":{"id":42},"version":0}"#.to_string()),
        };
        assert!(tab_b.handle_storage_event(&written));
        assert_eq!(tab_b.profile_id(), Some(42));

        // 本地已有 ID 时不覆盖
        let other = StorageEvent {
            new_value: Some(r#"{"state":{"id":7},"version":0}"#.to_string()),
            ..written.clone()
        };
        assert!(!tab_b.handle_storage_event(&other));
        assert_eq!(tab_b.profile_id(), Some(42));

        let removed = StorageEvent {
            new_value: None,
            ..written
        };
        assert!(tab_b.handle_storage_event(&removed));
        assert_eq!(tab_b.profile_id(), None);
        assert!(!tab_b.handle_storage_event(&removed));
    }
}
