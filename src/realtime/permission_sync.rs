//! 实时权限同步
//!
//! 状态机 `Disconnected → Connecting → Listening`：
//! 会话持有令牌且用户资料有 ID 时订阅 `<prefix>.<userId>`；
//! 连接建立或收到 `ChangePermission {key: "my-permissions"}` 时重新获取权限。
//! 登出、令牌丢失或用户变化时先退订，每个会话最多一个订阅。

use serde_json::Value;
use std::future::pending;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{ChannelSignal, RealtimeTransport, Subscription};
use crate::auth::AuthService;
use crate::models::session::{Session, UserProfile};

pub const PERMISSION_EVENT: &str = "ChangePermission";
pub const PERMISSION_KEY: &str = "my-permissions";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncState {
    Disconnected,
    Connecting,
    Listening,
}

pub struct PermissionSync {
    state: watch::Receiver<SyncState>,
    shutdown: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl PermissionSync {
    pub fn spawn(
        auth: Arc<AuthService>,
        transport: Arc<dyn RealtimeTransport>,
        channel_prefix: &str,
    ) -> Self {
        let (state_tx, state) = watch::channel(SyncState::Disconnected);
        let (shutdown, shutdown_rx) = watch::channel(false);

        let worker = Worker {
            session: auth.session().subscribe(),
            profile: auth.profile().subscribe(),
            auth,
            transport,
            channel_prefix: channel_prefix.to_string(),
            state: state_tx,
            current: None,
            closed_for: None,
        };
        let task = tokio::spawn(worker.run(shutdown_rx));

        Self {
            state,
            shutdown,
            task,
        }
    }

    pub fn state(&self) -> SyncState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SyncState> {
        self.state.clone()
    }

    /// 停止同步并退订
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            warn!(error = %e, "Permission sync task ended abnormally");
        }
    }
}

struct Worker {
    auth: Arc<AuthService>,
    transport: Arc<dyn RealtimeTransport>,
    session: watch::Receiver<Session>,
    profile: watch::Receiver<UserProfile>,
    channel_prefix: String,
    state: watch::Sender<SyncState>,
    current: Option<(i64, Subscription)>,
    /// 连接被远端关闭的用户；用户变化前不重连
    closed_for: Option<i64>,
}

impl Worker {
    async fn run(mut self, mut shutdown: watch::Receiver<bool>) {
        loop {
            self.reconcile().await;

            tokio::select! {
                changed = self.session.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = self.profile.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                signal = next_signal(&mut self.current) => match signal {
                    Some(ChannelSignal::Connected) => {
                        self.set_state(SyncState::Listening);
                        self.refresh().await;
                    }
                    Some(ChannelSignal::Event { event, payload }) => {
                        if is_permission_change(&event, &payload) {
                            self.refresh().await;
                        } else {
                            debug!(event = %event, "Ignoring realtime event");
                        }
                    }
                    None => {
                        if let Some((user_id, _)) = self.current.take() {
                            warn!(user_id = user_id, "Permission channel closed");
                            self.closed_for = Some(user_id);
                        }
                        self.set_state(SyncState::Disconnected);
                    }
                },
                _ = shutdown.changed() => break,
            }
        }

        self.teardown().await;
    }

    /// 用户 ID（仅在持有令牌时）
    fn target(&self) -> Option<i64> {
        if !self.session.borrow().is_authorized() {
            return None;
        }
        self.profile.borrow().id
    }

    async fn reconcile(&mut self) {
        let target = self.target();
        if self.current.as_ref().map(|(id, _)| *id) == target && self.current.is_some() {
            return;
        }

        self.teardown().await;
        if target != self.closed_for {
            self.closed_for = None;
        }

        let Some(user_id) = target else {
            return;
        };
        if self.closed_for == Some(user_id) {
            return;
        }

        let channel = format!("{}.{}", self.channel_prefix, user_id);
        self.set_state(SyncState::Connecting);
        match self.transport.subscribe(&channel).await {
            Ok(subscription) => {
                info!(channel = %channel, "Listening for permission changes");
                self.current = Some((user_id, subscription));
            }
            Err(e) => {
                warn!(channel = %channel, error = %e, "Permission channel subscribe failed");
                self.set_state(SyncState::Disconnected);
            }
        }
    }

    async fn teardown(&mut self) {
        if let Some((user_id, subscription)) = self.current.take() {
            self.transport.unsubscribe(subscription.id()).await;
            info!(user_id = user_id, "Permission channel closed");
        }
        self.set_state(SyncState::Disconnected);
    }

    async fn refresh(&self) {
        if let Err(e) = self.auth.refresh_permissions().await {
            warn!(error = %e, "Failed to refresh permissions");
        }
    }

    fn set_state(&self, state: SyncState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!(from = ?current, to = ?state, "Permission sync state changed");
            *current = state;
            true
        });
    }
}

async fn next_signal(current: &mut Option<(i64, Subscription)>) -> Option<ChannelSignal> {
    match current {
        Some((_, subscription)) => subscription.recv().await,
        None => pending().await,
    }
}

fn is_permission_change(event: &str, payload: &Value) -> bool {
    event == PERMISSION_EVENT
        && payload.get("key").and_then(Value::as_str) == Some(PERMISSION_KEY)
}
