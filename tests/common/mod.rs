//! 测试公共模块
//! 提供测试配置、内存传输层和权限样例

#![allow(dead_code)]

use async_trait::async_trait;
use crm_admin::{
    api::{ApiRequest, Method, Transport},
    config::{
        ApiConfig, AppConfig, CacheConfig, ListConfig, LoggingConfig, RealtimeConfig,
        StorageConfig,
    },
    error::{AppError, Result},
    models::permission::{EntityPermission, Permission, Scope},
    realtime::EventBus,
    storage::{DurableStore, MemoryStore},
    AppContext,
};
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tokio::sync::oneshot;

/// 创建测试配置
pub fn create_test_config() -> AppConfig {
    AppConfig {
        api: ApiConfig {
            base_url: "http://localhost:8000/api".to_string(),
            timeout_secs: 5,
        },
        cache: CacheConfig {
            stale_time_secs: 30,
            common_data_stale_secs: 300,
        },
        list: ListConfig {
            search_debounce_ms: 500,
            default_page_size: 10,
        },
        storage: StorageConfig {
            dir: ".crm-admin-test".to_string(),
            session_key: "auth-storage".to_string(),
            profile_key: "user-storage".to_string(),
        },
        realtime: RealtimeConfig {
            channel_prefix: "user-permissions-changed".to_string(),
            event_buffer: 16,
        },
        logging: LoggingConfig {
            level: "debug".to_string(),
            format: "pretty".to_string(),
        },
    }
}

/// 一次被记录的请求
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub method: Method,
    pub path: String,
    pub query: Option<String>,
    pub body: Option<Value>,
    pub token: Option<String>,
}

enum Reply {
    Ready(Result<Value>),
    Gated(oneshot::Receiver<Result<Value>>),
}

#[derive(Default)]
struct Route {
    queued: VecDeque<Reply>,
    fallback: Option<Result<Value>>,
}

/// 内存传输层：按 "METHOD path" 返回预设结果并记录所有请求
#[derive(Default)]
pub struct FakeTransport {
    routes: Mutex<HashMap<String, Route>>,
    requests: Mutex<Vec<RecordedRequest>>,
}

fn route_key(method: Method, path: &str) -> String {
    format!("{} {}", method.as_str(), path.trim_start_matches('/'))
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// 该路由始终返回 `data`
    pub fn respond(&self, method: Method, path: &str, data: Value) {
        self.route(method, path, |route| route.fallback = Some(Ok(data)));
    }

    /// 该路由始终失败
    pub fn fail(&self, method: Method, path: &str, err: AppError) {
        self.route(method, path, |route| route.fallback = Some(Err(err)));
    }

    /// 下一次请求返回 `result`（优先于固定结果）
    pub fn respond_once(&self, method: Method, path: &str, result: Result<Value>) {
        self.route(method, path, |route| route.queued.push_back(Reply::Ready(result)));
    }

    /// 下一次请求挂起，直到通过返回的发送端给出结果
    pub fn gate(&self, method: Method, path: &str) -> oneshot::Sender<Result<Value>> {
        let (tx, rx) = oneshot::channel();
        self.route(method, path, |route| route.queued.push_back(Reply::Gated(rx)));
        tx
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn requests_to(&self, method: Method, path: &str) -> Vec<RecordedRequest> {
        self.requests()
            .into_iter()
            .filter(|r| r.method == method && r.path == path)
            .collect()
    }

    pub fn count(&self, method: Method, path: &str) -> usize {
        self.requests_to(method, path).len()
    }

    fn route(&self, method: Method, path: &str, f: impl FnOnce(&mut Route)) {
        let mut routes = self.routes.lock().unwrap();
        f(routes.entry(route_key(method, path)).or_default());
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let key = route_key(request.method, &request.path);
        self.requests.lock().unwrap().push(RecordedRequest {
            method: request.method,
            path: request.path.clone(),
            query: request.query.clone(),
            body: request.body.clone(),
            token: request.token.as_ref().map(|t| t.expose_secret().clone()),
        });

        let reply = {
            let mut routes = self.routes.lock().unwrap();
            match routes.get_mut(&key) {
                Some(route) => match route.queued.pop_front() {
                    Some(reply) => reply,
                    None => Reply::Ready(
                        route
                            .fallback
                            .clone()
                            .unwrap_or_else(|| Err(AppError::not_found(&key))),
                    ),
                },
                None => Reply::Ready(Err(AppError::not_found(&key))),
            }
        };

        match reply {
            Reply::Ready(result) => result,
            Reply::Gated(rx) => rx
                .await
                .unwrap_or_else(|_| Err(AppError::Transport("gate dropped".to_string()))),
        }
    }
}

/// 测试环境
pub struct TestApp {
    pub context: AppContext,
    pub transport: Arc<FakeTransport>,
    pub bus: Arc<EventBus>,
    pub store: Arc<dyn DurableStore>,
}

pub fn create_test_app() -> TestApp {
    create_test_app_with_store(Arc::new(MemoryStore::standalone()))
}

pub fn create_test_app_with_store(store: Arc<dyn DurableStore>) -> TestApp {
    let transport = FakeTransport::new();
    let bus = Arc::new(EventBus::new(16));
    let context = AppContext::new(
        create_test_config(),
        Arc::clone(&store),
        transport.clone(),
        bus.clone(),
    );
    TestApp {
        context,
        transport,
        bus,
        store,
    }
}

/// 权限样例：账户（查看自己的）与任务（全部）
pub fn sample_permissions() -> Vec<Permission> {
    vec![
        Permission {
            name: "Accounts".to_string(),
            entities: vec![EntityPermission {
                name: "Contacts".to_string(),
                permissions: [("view".to_string(), Scope::Owned)].into_iter().collect(),
            }],
        },
        Permission {
            name: "Tasks".to_string(),
            entities: vec![],
        },
    ]
}

/// `auth/login` 成功回复
pub fn login_response(token: &str, user_id: i64) -> Value {
    json!({
        "token": token,
        "isAdmin": false,
        "permissions": sample_permissions(),
        "user": {"id": user_id, "name": "Ann Lee"}
    })
}

/// 列表回复
pub fn page(ids: &[i64], total: u64) -> Value {
    json!({
        "data": ids.iter().map(|id| json!({"id": id, "name": format!("row {}", id)})).collect::<Vec<_>>(),
        "total": total,
    })
}

/// 让出执行权，直到后台任务处理完已就绪的事件
pub async fn settle() {
    for _ in 0..10 {
        tokio::task::yield_now().await;
    }
}
