//! 应用上下文
//!
//! 显式注入的会话服务对象：启动时创建并恢复持久化状态，
//! 登出时清理，关闭时停止后台任务。

use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, PoisonError};
use tokio::task::JoinHandle;
use tracing::{debug, info};

use crate::api::{ApiClient, Resource, Transport};
use crate::auth::{AuthService, ProfileStore, SessionStore};
use crate::common_data::CommonDataFetcher;
use crate::config::AppConfig;
use crate::error::Result;
use crate::list::{ListController, ListViewState};
use crate::notify::{ErrorBoundary, Notifier};
use crate::query::{Mutations, QueryCache};
use crate::realtime::{PermissionSync, RealtimeTransport};
use crate::storage::DurableStore;

pub struct AppContext {
    pub config: AppConfig,
    pub store: Arc<dyn DurableStore>,
    pub session: Arc<SessionStore>,
    pub profile: Arc<ProfileStore>,
    pub api: Arc<ApiClient>,
    pub cache: Arc<QueryCache>,
    pub notifier: Arc<Notifier>,
    pub realtime: Arc<dyn RealtimeTransport>,
    pub auth: Arc<AuthService>,
    background: Mutex<Background>,
}

#[derive(Default)]
struct Background {
    storage_sync: Option<JoinHandle<()>>,
    permission_sync: Option<PermissionSync>,
}

impl AppContext {
    /// 创建上下文并从持久化存储恢复会话与用户资料
    pub fn new(
        config: AppConfig,
        store: Arc<dyn DurableStore>,
        transport: Arc<dyn Transport>,
        realtime: Arc<dyn RealtimeTransport>,
    ) -> Self {
        let session = Arc::new(SessionStore::hydrate(
            Arc::clone(&store),
            &config.storage.session_key,
        ));
        let profile = Arc::new(ProfileStore::hydrate(
            Arc::clone(&store),
            &config.storage.profile_key,
        ));
        let api = Arc::new(ApiClient::new(transport, session.subscribe()));
        let cache = Arc::new(QueryCache::new(config.stale_time()));
        let auth = Arc::new(AuthService::new(
            Arc::clone(&api),
            Arc::clone(&session),
            Arc::clone(&profile),
            Arc::clone(&cache),
        ));

        Self {
            config,
            store,
            session,
            profile,
            api,
            cache,
            notifier: Arc::new(Notifier::default()),
            realtime,
            auth,
            background: Mutex::new(Background::default()),
        }
    }

    /// 启动多标签页同步与实时权限同步
    pub fn start(&self) {
        let mut background = self.background();
        if background.storage_sync.is_none() {
            background.storage_sync = Some(self.spawn_storage_sync());
        }
        if background.permission_sync.is_none() {
            background.permission_sync = Some(PermissionSync::spawn(
                Arc::clone(&self.auth),
                Arc::clone(&self.realtime),
                &self.config.realtime.channel_prefix,
            ));
        }
        info!(authorized = self.session.is_authorized(), "Background sync started");
    }

    /// 多标签页同步：会话与用户资料按各自规则收敛；
    /// 其他标签页登出时同时清空本地缓存
    fn spawn_storage_sync(&self) -> JoinHandle<()> {
        let session = Arc::clone(&self.session);
        let profile = Arc::clone(&self.profile);
        let cache = Arc::clone(&self.cache);
        let mut events = self.store.subscribe();

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                if session.handle_storage_event(&event) && !session.is_authorized() {
                    info!("Logged out in another tab, clearing local state");
                    cache.clear();
                    profile.reset();
                }
                profile.handle_storage_event(&event);
            }
            debug!("Storage event stream closed");
        })
    }

    pub fn permission_sync_state(&self) -> Option<crate::realtime::SyncState> {
        self.background()
            .permission_sync
            .as_ref()
            .map(PermissionSync::state)
    }

    pub fn error_boundary(&self) -> ErrorBoundary {
        ErrorBoundary::new(Arc::clone(&self.notifier))
    }

    pub fn mutations(&self) -> Mutations {
        Mutations::new(Arc::clone(&self.api), Arc::clone(&self.cache))
    }

    pub fn common_data(&self) -> CommonDataFetcher {
        CommonDataFetcher::new(
            Arc::clone(&self.api),
            Arc::clone(&self.cache),
            self.config.common_data_stale_time(),
        )
    }

    /// 使用默认每页条数创建列表控制器
    pub fn list_controller<T>(&self, resource: Resource) -> Result<ListController<T>>
    where
        T: DeserializeOwned + Clone + Send + Sync + 'static,
    {
        let view = ListViewState::new(self.config.list.default_page_size)?;
        Ok(ListController::new(
            resource,
            Arc::clone(&self.api),
            Arc::clone(&self.cache),
            view,
            self.config.search_debounce(),
        ))
    }

    /// 停止后台任务
    pub async fn shutdown(&self) {
        let (storage_sync, permission_sync) = {
            let mut background = self.background();
            (
                background.storage_sync.take(),
                background.permission_sync.take(),
            )
        };

        if let Some(sync) = permission_sync {
            sync.shutdown().await;
        }
        if let Some(handle) = storage_sync {
            handle.abort();
        }
        info!("Application context shut down");
    }

    fn background(&self) -> std::sync::MutexGuard<'_, Background> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
