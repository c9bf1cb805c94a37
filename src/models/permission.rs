//! 权限模型

use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// 权限授予的记录范围
///
/// 从窄到宽排序，`max` 取最强授权
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Scope {
    #[default]
    None,
    Added,
    Owned,
    All,
}

impl Scope {
    /// 未知取值按无权限处理
    pub fn parse(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "added" => Scope::Added,
            "owned" => Scope::Owned,
            "all" => Scope::All,
            _ => Scope::None,
        }
    }
}

impl<'de> Deserialize<'de> for Scope {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = String::deserialize(deserializer)?;
        Ok(Scope::parse(&value))
    }
}

/// 单个实体（如 `accounts`）的权限键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityPermission {
    pub name: String,
    #[serde(default)]
    pub permissions: BTreeMap<String, Scope>,
}

/// 后端返回的权限组
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Permission {
    pub name: String,
    #[serde(default)]
    pub entities: Vec<EntityPermission>,
}

/// "my-permissions" 接口的响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PermissionsPayload {
    #[serde(default)]
    pub permissions: Vec<Permission>,
    #[serde(default)]
    pub is_admin: Option<bool>,
}

/// 权限组名与实体名的小写去重并集
pub fn derive_permission_names(permissions: &[Permission]) -> BTreeSet<String> {
    let mut names = BTreeSet::new();

    for permission in permissions {
        names.insert(permission.name.trim().to_lowercase());
        for entity in &permission.entities {
            names.insert(entity.name.trim().to_lowercase());
        }
    }

    names.remove("");
    names
}

/// 所有权限组中 `entity` / `key` 的最宽授权
pub fn scope_for(permissions: &[Permission], entity: &str, key: &str) -> Scope {
    permissions
        .iter()
        .flat_map(|p| p.entities.iter())
        .filter(|e| e.name.eq_ignore_ascii_case(entity))
        .filter_map(|e| e.permissions.get(key).copied())
        .max()
        .unwrap_or(Scope::None)
}
