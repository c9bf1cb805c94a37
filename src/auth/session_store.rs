//! 会话存储
//!
//! 持有登录令牌、管理员标记与权限集合；每次变更都写入持久化存储，
//! 并通过 watch 通道通知订阅者（API 客户端、实时权限同步）。
//!
//! 多标签页收敛规则：
//! - 其他标签页删除了会话键，且本地持有令牌 → 本地登出
//! - 其他标签页写入了会话键，且本地没有令牌 → 采用该会话

use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::models::permission::Permission;
use crate::models::session::{Persisted, PersistedSession, Session};
use crate::storage::{DurableStore, StorageEvent};

pub struct SessionStore {
    store: Arc<dyn DurableStore>,
    key: String,
    state: watch::Sender<Session>,
}

impl SessionStore {
    /// 创建未登录的会话存储（不读取持久化数据）
    pub fn new(store: Arc<dyn DurableStore>, key: &str) -> Self {
        let (state, _) = watch::channel(Session::default());
        Self {
            store,
            key: key.to_string(),
            state,
        }
    }

    /// 从持久化存储恢复会话；数据缺失或损坏时保持未登录
    pub fn hydrate(store: Arc<dyn DurableStore>, key: &str) -> Self {
        let this = Self::new(store, key);

        match this.store.get(key) {
            Ok(Some(raw)) => match parse_persisted(&raw) {
                Some(session) => {
                    info!(
                        authorized = session.is_authorized(),
                        permissions = session.permission_names().len(),
                        "Session restored from storage"
                    );
                    this.state.send_replace(session);
                }
                None => warn!(key = %key, "Ignoring malformed persisted session"),
            },
            Ok(None) => debug!(key = %key, "No persisted session"),
            Err(e) => warn!(key = %key, error = %e, "Failed to read persisted session"),
        }

        this
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// 当前会话快照
    pub fn snapshot(&self) -> Session {
        self.state.borrow().clone()
    }

    pub fn is_authorized(&self) -> bool {
        self.state.borrow().is_authorized()
    }

    pub fn subscribe(&self) -> watch::Receiver<Session> {
        self.state.subscribe()
    }

    /// 登录：设置会话并派生权限名
    pub fn login(&self, token: String, is_admin: bool, permissions: Vec<Permission>) -> Result<()> {
        let session = Session::authenticated(token, is_admin, permissions);
        info!(
            is_admin = is_admin,
            permissions = session.permission_names().len(),
            "Logged in"
        );
        self.state.send_replace(session);
        self.persist()
    }

    /// 登出：恢复初始状态并删除持久化记录
    pub fn logout(&self) -> Result<()> {
        self.state.send_replace(Session::default());
        info!("Logged out");
        self.store.remove(&self.key)
    }

    /// 更新权限并重新派生权限名，不修改令牌
    pub fn set_permissions(&self, permissions: Vec<Permission>) -> Result<()> {
        self.state
            .send_modify(|session| session.set_permissions(permissions));
        debug!(
            permissions = self.state.borrow().permission_names().len(),
            "Permissions updated"
        );
        self.persist()
    }

    pub fn set_admin(&self, is_admin: bool) -> Result<()> {
        self.state.send_modify(|session| session.set_admin(is_admin));
        self.persist()
    }

    fn persist(&self) -> Result<()> {
        let persisted = {
            let session = self.state.borrow();
            if !session.is_authorized() {
                return Ok(());
            }
            Persisted::new(session.to_persisted())
        };
        let raw = serde_json::to_string(&persisted)?;
        self.store.set(&self.key, &raw)
    }

    /// 处理其他标签页产生的存储事件，返回本地会话是否改变
    pub fn handle_storage_event(&self, event: &StorageEvent) -> bool {
        if event.key != self.key {
            return false;
        }

        let has_token = self.state.borrow().is_authorized();

        match &event.new_value {
            None if has_token => {
                info!("Session removed in another tab, logging out");
                self.state.send_replace(Session::default());
                true
            }
            Some(raw) if !has_token => match parse_persisted(raw) {
                Some(session) if session.is_authorized() => {
                    info!("Session created in another tab, adopting it");
                    self.state.send_replace(session);
                    true
                }
                Some(_) => false,
                None => {
                    warn!("Ignoring malformed session written by another tab");
                    false
                }
            },
            _ => false,
        }
    }

    /// 启动多标签页同步任务
    pub fn spawn_storage_sync(self: &Arc<Self>) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let mut events = this.store.subscribe();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                this.handle_storage_event(&event);
            }
            debug!("Storage event stream closed");
        })
    }
}

fn parse_persisted(raw: &str) -> Option<Session> {
    serde_json::from_str::<Persisted<PersistedSession>>(raw)
        .ok()
        .map(|p| Session::from_persisted(p.state))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{MemoryStore, SharedMemoryStorage};

    const KEY: &str = "auth-storage";

    fn store() -> Arc<dyn DurableStore> {
        Arc::new(MemoryStore::standalone())
    }

    #[test]
    fn test_login_persists_and_hydrates() {
        let store = store();
        let sessions = SessionStore::new(store.clone(), KEY);
        sessions.login("tok".to_string(), true, vec![]).unwrap();

        let raw = store.get(KEY).unwrap().unwrap();
        assert!(raw.contains("\"isAdmin\":true"));

        let restored = SessionStore::hydrate(store, KEY);
        assert_eq!(restored.snapshot().token(), Some("tok"));
        assert!(restored.snapshot().is_admin());
    }

    #[test]
    fn test_malformed_payload_is_ignored() {
        let store = store();
        store.set(KEY, "{not json").unwrap();

        let sessions = SessionStore::hydrate(store.clone(), KEY);
        assert!(!sessions.is_authorized());

        store.set(KEY, r#"{"state":{"token":42}}"#).unwrap();
        let sessions = SessionStore::hydrate(store, KEY);
        assert!(!sessions.is_authorized());
    }

    #[test]
    fn test_logout_removes_record() {
        let store = store();
        let sessions = SessionStore::new(store.clone(), KEY);
        sessions.login("tok".to_string(), false, vec![]).unwrap();
        sessions.logout().unwrap();

        assert!(store.get(KEY).unwrap().is_none());
        assert!(!sessions.is_authorized());
        assert!(sessions.snapshot().permission_names().is_empty());
    }

    #[test]
    fn test_removal_only_logs_out_when_token_present() {
        let shared = SharedMemoryStorage::default();
        let sessions = SessionStore::new(Arc::new(shared.handle()), KEY);

        let removal = StorageEvent {
            key: KEY.to_string(),
            old_value: Some("{}".to_string()),
            new_value: None,
        };
        assert!(!sessions.handle_storage_event(&removal));

        sessions.login("tok".to_string(), false, vec![]).unwrap();
        assert!(sessions.handle_storage_event(&removal));
        assert!(!sessions.is_authorized());
    }

    #[test]
    fn test_new_value_only_adopted_when_logged_out() {
        let sessions = SessionStore::new(store(), KEY);
        let written = StorageEvent {
            key: KEY.to_string(),
            old_value: None,
            new_value: Some(r#"{"state":{"token":"peer","isAdmin":false,"permissions":[]},"version":0}"#.to_string()),
        };

        assert!(sessions.handle_storage_event(&written));
        assert_eq!(sessions.snapshot().token(), Some("peer"));

        // 已有令牌时不会被覆盖
        let other = StorageEvent {
            new_value: Some(r#"{"state":{"token":"other"},"version":0}"#.to_string()),
            ..written
        };
        assert!(!sessions.handle_storage_event(&other));
        assert_eq!(sessions.snapshot().token(), Some("peer"));
    }

    #[test]
    fn test_events_for_other_keys_are_ignored() {
        let sessions = SessionStore::new(store(), KEY);
        sessions.login("tok".to_string(), false, vec![]).unwrap();

        let event = StorageEvent {
            key: "user-storage".to_string(),
            old_value: None,
            new_value: None,
        };
        assert!(!sessions.handle_storage_event(&event));
        assert!(sessions.is_authorized());
    }
}
