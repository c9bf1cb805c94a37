//! 认证相关模型

use serde::{Deserialize, Serialize};

use super::permission::Permission;

/// 登录请求
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// 登录返回的用户摘要
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginUser {
    pub id: i64,
    #[serde(default)]
    pub name: Option<String>,
}

/// 登录响应
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    #[serde(default)]
    pub is_admin: bool,
    #[serde(default)]
    pub permissions: Vec<Permission>,
    pub user: LoginUser,
}
