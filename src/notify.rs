//! 通知与错误边界
//!
//! - 校验错误：警告提示，本地恢复
//! - 授权错误：整页错误状态（带"返回"），不重试
//! - 网络及其他错误：通用错误提示，不自动重试

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;
use tokio_stream::{Stream, StreamExt};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::{AppError, ErrorKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Level {
    Success,
    Info,
    Warning,
    Error,
}

/// 短暂提示
#[derive(Debug, Clone, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub level: Level,
    pub message: String,
    pub created_at: DateTime<Utc>,
}

pub struct Notifier {
    sender: broadcast::Sender<Notification>,
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn notify(&self, level: Level, message: impl Into<String>) -> Notification {
        let notification = Notification {
            id: Uuid::new_v4(),
            level,
            message: message.into(),
            created_at: Utc::now(),
        };
        // 没有界面订阅时丢弃
        let _ = self.sender.send(notification.clone());
        notification
    }

    pub fn success(&self, message: impl Into<String>) -> Notification {
        self.notify(Level::Success, message)
    }

    pub fn info(&self, message: impl Into<String>) -> Notification {
        self.notify(Level::Info, message)
    }

    pub fn warning(&self, message: impl Into<String>) -> Notification {
        self.notify(Level::Warning, message)
    }

    pub fn error(&self, message: impl Into<String>) -> Notification {
        self.notify(Level::Error, message)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// 通知流；消费过慢时跳过丢失的通知
    pub fn stream(&self) -> impl Stream<Item = Notification> + Send + 'static {
        BroadcastStream::new(self.sender.subscribe()).filter_map(|item| item.ok())
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(32)
    }
}

/// 错误处理结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    /// 已在本地恢复（校验错误或被丢弃的本地状态）
    Recovered,
    /// 已发出错误提示，等待用户手动重试
    Notified,
    /// 渲染整页错误状态
    FullPage { message: String },
}

pub struct ErrorBoundary {
    notifier: Arc<Notifier>,
}

impl ErrorBoundary {
    pub fn new(notifier: Arc<Notifier>) -> Self {
        Self { notifier }
    }

    pub fn notifier(&self) -> &Notifier {
        &self.notifier
    }

    pub fn handle(&self, err: &AppError) -> Outcome {
        match err.kind() {
            ErrorKind::Validation => {
                self.notifier.warning(err.user_message());
                Outcome::Recovered
            }
            ErrorKind::Authorization => {
                warn!(error = %err, "Authorization failure, rendering full-page fallback");
                Outcome::FullPage {
                    message: err.user_message(),
                }
            }
            ErrorKind::MalformedState => {
                debug!(error = %err, "Discarding malformed local state");
                Outcome::Recovered
            }
            ErrorKind::Network | ErrorKind::Internal => {
                warn!(error = %err, code = err.code(), "Request failed");
                self.notifier.error(err.user_message());
                Outcome::Notified
            }
        }
    }
}
