//! 实时频道
//!
//! `RealtimeTransport` 抽象按频道订阅的推送连接；
//! `EventBus` 是进程内实现（broadcast 按频道分发），网络实现接在同一接口之后。

pub mod permission_sync;

pub use permission_sync::{PermissionSync, SyncState};

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio::task::JoinHandle;
use tracing::debug;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// 频道上的一条事件
#[derive(Debug, Clone, PartialEq)]
pub struct ChannelEvent {
    pub channel: String,
    pub event: String,
    pub payload: Value,
}

/// 订阅收到的信号
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// 订阅已建立
    Connected,
    Event { event: String, payload: Value },
}

/// 一个活动订阅
pub struct Subscription {
    id: Uuid,
    channel: String,
    receiver: mpsc::Receiver<ChannelSignal>,
}

impl Subscription {
    pub fn new(id: Uuid, channel: &str, receiver: mpsc::Receiver<ChannelSignal>) -> Self {
        Self {
            id,
            channel: channel.to_string(),
            receiver,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    /// 下一个信号；连接关闭时返回 `None`
    pub async fn recv(&mut self) -> Option<ChannelSignal> {
        self.receiver.recv().await
    }
}

#[async_trait]
pub trait RealtimeTransport: Send + Sync {
    async fn subscribe(&self, channel: &str) -> Result<Subscription>;

    async fn unsubscribe(&self, subscription_id: Uuid);
}

struct ActiveSubscription {
    channel: String,
    forwarder: JoinHandle<()>,
}

/// 进程内事件总线
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<ChannelEvent>,
    active: Arc<RwLock<HashMap<Uuid, ActiveSubscription>>>,
}

impl EventBus {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            active: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// 发布事件，返回收到事件的订阅数
    pub fn publish(&self, channel: &str, event: &str, payload: Value) -> Result<usize> {
        self.sender
            .send(ChannelEvent {
                channel: channel.to_string(),
                event: event.to_string(),
                payload,
            })
            .map_err(|e| AppError::internal_error(&format!("Failed to publish event: {}", e)))
    }

    /// 活动订阅数
    pub async fn active_count(&self) -> usize {
        self.active.read().await.len()
    }

    /// 某个频道的活动订阅数
    pub async fn channel_count(&self, channel: &str) -> usize {
        self.active
            .read()
            .await
            .values()
            .filter(|s| s.channel == channel)
            .count()
    }
}

#[async_trait]
impl RealtimeTransport for EventBus {
    async fn subscribe(&self, channel: &str) -> Result<Subscription> {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::channel(32);
        // 先订阅广播，避免错过建立连接期间的事件
        let mut events = self.sender.subscribe();
        let active = Arc::clone(&self.active);
        let name = channel.to_string();

        let mut registry = self.active.write().await;
        let forwarder = tokio::spawn(async move {
            if tx.send(ChannelSignal::Connected).await.is_ok() {
                loop {
                    let event = match events.recv().await {
                        Ok(event) => event,
                        Err(broadcast::error::RecvError::Lagged(_)) => continue,
                        Err(broadcast::error::RecvError::Closed) => break,
                    };
                    if event.channel != name {
                        continue;
                    }
                    let signal = ChannelSignal::Event {
                        event: event.event,
                        payload: event.payload,
                    };
                    if tx.send(signal).await.is_err() {
                        break;
                    }
                }
            }
            // 订阅方已丢弃
            active.write().await.remove(&id);
        });
        registry.insert(
            id,
            ActiveSubscription {
                channel: channel.to_string(),
                forwarder,
            },
        );

        debug!(channel = %channel, subscription = %id, "Channel subscribed");
        Ok(Subscription::new(id, channel, rx))
    }

    async fn unsubscribe(&self, subscription_id: Uuid) {
        if let Some(subscription) = self.active.write().await.remove(&subscription_id) {
            subscription.forwarder.abort();
            debug!(
                channel = %subscription.channel,
                subscription = %subscription_id,
                "Channel unsubscribed"
            );
        }
    }
}
