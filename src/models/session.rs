//! 会话模型

use secrecy::{ExposeSecret, Secret};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use super::permission::{derive_permission_names, scope_for, Permission, Scope};

/// 客户端持有的会话
///
/// `permission_names` 每次变更时由 `permissions` 派生，不能单独设置
#[derive(Debug, Default)]
pub struct Session {
    token: Option<Secret<String>>,
    is_admin: bool,
    permissions: Vec<Permission>,
    permission_names: BTreeSet<String>,
}

/// 路由守卫结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAccess {
    Allowed,
    Unauthenticated,
    Forbidden,
}

impl Session {
    pub fn authenticated(token: String, is_admin: bool, permissions: Vec<Permission>) -> Self {
        let permission_names = derive_permission_names(&permissions);
        Self {
            token: Some(Secret::new(token)),
            is_admin,
            permissions,
            permission_names,
        }
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_ref().map(|t| t.expose_secret().as_str())
    }

    pub fn is_admin(&self) -> bool {
        self.is_admin
    }

    pub fn is_authorized(&self) -> bool {
        self.token.is_some()
    }

    pub fn permissions(&self) -> &[Permission] {
        &self.permissions
    }

    pub fn permission_names(&self) -> &BTreeSet<String> {
        &self.permission_names
    }

    /// 替换权限并重新派生权限名，令牌不变
    pub fn set_permissions(&mut self, permissions: Vec<Permission>) {
        self.permission_names = derive_permission_names(&permissions);
        self.permissions = permissions;
    }

    pub fn set_admin(&mut self, is_admin: bool) {
        self.is_admin = is_admin;
    }

    pub fn has_permission(&self, name: &str) -> bool {
        self.is_admin || self.permission_names.contains(&name.trim().to_lowercase())
    }

    pub fn scope_for(&self, entity: &str, key: &str) -> Scope {
        if self.is_admin {
            return Scope::All;
        }
        scope_for(&self.permissions, entity, key)
    }

    pub fn can(&self, entity: &str, key: &str) -> bool {
        self.scope_for(entity, key) != Scope::None
    }

    /// 检查需要 `required`（权限名或实体名）的路由
    pub fn guard(&self, required: Option<&str>) -> RouteAccess {
        if !self.is_authorized() {
            return RouteAccess::Unauthenticated;
        }
        match required {
            Some(name) if !self.has_permission(name) => RouteAccess::Forbidden,
            _ => RouteAccess::Allowed,
        }
    }

    pub fn to_persisted(&self) -> PersistedSession {
        PersistedSession {
            token: self.token().map(str::to_string),
            is_admin: self.is_admin,
            permissions: self.permissions.clone(),
            permission_names: self.permission_names.iter().cloned().collect(),
        }
    }

    /// 从持久化记录重建；权限名总是重新派生
    pub fn from_persisted(persisted: PersistedSession) -> Self {
        let permission_names = derive_permission_names(&persisted.permissions);
        Self {
            token: persisted.token.map(Secret::new),
            is_admin: persisted.is_admin,
            permissions: persisted.permissions,
            permission_names,
        }
    }
}

impl Clone for Session {
    fn clone(&self) -> Self {
        Self {
            token: self
                .token
                .as_ref()
                .map(|t| Secret::new(t.expose_secret().clone())),
            is_admin: self.is_admin,
            permissions: self.permissions.clone(),
            permission_names: self.permission_names.clone(),
        }
    }
}

/// 写入持久化存储的会话记录
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedSession {
    pub token: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub permission_names: Vec<String>,
}

/// 当前用户资料缓存
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: Option<i64>,
}

/// 所有持久化记录共用的 `{state, version}` 外层
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Persisted<T> {
    pub state: T,
    #[serde(default)]
    pub version: u32,
}

impl<T> Persisted<T> {
    pub fn new(state: T) -> Self {
        Self { state, version: 0 }
    }
}
