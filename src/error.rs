//! 统一错误模型
//! 定义协调层的所有错误类型以及错误分类（校验 / 授权 / 网络 / 持久化状态）

use reqwest::StatusCode;
use thiserror::Error;

use crate::models::validation::ValidationErrors;

/// 结果类型别名
pub type Result<T> = std::result::Result<T, AppError>;

/// 应用错误类型
///
/// 实现 `Clone`：合并后的同一个请求结果需要分发给所有等待者。
#[derive(Debug, Clone, Error)]
pub enum AppError {
    #[error("Validation failed on {} field(s)", .0.len())]
    Validation(ValidationErrors),

    #[error("Authentication failed")]
    Unauthorized,

    #[error("Access denied")]
    Forbidden,

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("API error: {0}")]
    Api(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// 错误分类，决定错误在界面上的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// 422 字段级校验错误：本地恢复，逐字段展示
    Validation,
    /// 缺少登录或权限：整页错误状态，不重试
    Authorization,
    /// 网络 / 传输错误：通用提示，由用户手动重试
    Network,
    /// 持久化状态损坏：静默丢弃
    MalformedState,
    Internal,
}

impl AppError {
    /// 获取 HTTP 状态码
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized => StatusCode::UNAUTHORIZED,
            AppError::Forbidden => StatusCode::FORBIDDEN,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Http { status, .. } => {
                StatusCode::from_u16(*status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            AppError::Transport(_) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Api(_)
            | AppError::Decode(_)
            | AppError::Storage(_)
            | AppError::Config(_)
            | AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// 获取错误码
    pub fn code(&self) -> u16 {
        self.status_code().as_u16()
    }

    /// 错误分类
    pub fn kind(&self) -> ErrorKind {
        match self {
            AppError::Validation(_) => ErrorKind::Validation,
            AppError::Unauthorized | AppError::Forbidden => ErrorKind::Authorization,
            AppError::Transport(_) | AppError::Http { .. } | AppError::NotFound(_) => {
                ErrorKind::Network
            }
            AppError::Storage(_) => ErrorKind::MalformedState,
            AppError::Api(_) | AppError::Decode(_) | AppError::Config(_) | AppError::Internal(_) => {
                ErrorKind::Internal
            }
        }
    }

    /// 获取用户友好的错误消息（不包含敏感信息）
    pub fn user_message(&self) -> String {
        match self {
            AppError::Validation(_) => "Please correct the highlighted fields".to_string(),
            AppError::Unauthorized => "Your session has expired, please sign in again".to_string(),
            AppError::Forbidden => "You do not have permission to access this page".to_string(),
            AppError::NotFound(_) => "The requested record was not found".to_string(),
            AppError::Api(msg) => msg.clone(),
            AppError::Http { .. } | AppError::Transport(_) => {
                "Something went wrong, please try again".to_string()
            }
            AppError::Decode(_) => "Unexpected response from server".to_string(),
            AppError::Storage(_) => "Local storage is unavailable".to_string(),
            AppError::Config(_) => "Configuration error".to_string(),
            AppError::Internal(_) => "Internal error".to_string(),
        }
    }

    /// 字段校验错误（仅 422）
    pub fn validation_errors(&self) -> Option<&ValidationErrors> {
        match self {
            AppError::Validation(errors) => Some(errors),
            _ => None,
        }
    }

    // 便捷方法
    pub fn not_found(msg: &str) -> Self {
        AppError::NotFound(msg.to_string())
    }

    pub fn internal_error(msg: &str) -> Self {
        AppError::Internal(msg.to_string())
    }

    pub fn storage(msg: &str) -> Self {
        AppError::Storage(msg.to_string())
    }
}

/// 从 config::ConfigError 转换
impl From<config::ConfigError> for AppError {
    fn from(e: config::ConfigError) -> Self {
        AppError::Config(e.to_string())
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() {
            AppError::Decode(e.to_string())
        } else {
            AppError::Transport(e.to_string())
        }
    }
}

impl From<serde_json::Error> for AppError {
    fn from(e: serde_json::Error) -> Self {
        AppError::Decode(e.to_string())
    }
}

impl From<std::io::Error> for AppError {
    fn from(e: std::io::Error) -> Self {
        AppError::Storage(e.to_string())
    }
}
