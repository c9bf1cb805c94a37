//! 列表控制器
//!
//! 每次状态变化递增版本号并通过查询缓存发出一次请求；
//! 响应只在其版本仍是最新时才会应用，过期响应直接丢弃。

use serde::de::DeserializeOwned;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::debounce::Debouncer;
use super::view_state::ListViewState;
use crate::api::{ApiClient, Resource};
use crate::error::{AppError, Result};
use crate::models::list::{FilterValue, ListQueryDescriptor, Page, Sort};
use crate::query::{QueryCache, QueryKey};

/// 列表当前展示的数据
#[derive(Debug, Clone)]
pub struct ListSnapshot<T> {
    pub rows: Vec<T>,
    pub total: u64,
    /// 当前数据对应的版本
    pub version: u64,
    pub loading: bool,
    pub error: Option<AppError>,
}

impl<T> Default for ListSnapshot<T> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            total: 0,
            version: 0,
            loading: false,
            error: None,
        }
    }
}

struct Control {
    view: ListViewState,
    version: u64,
}

struct Inner<T> {
    resource: Resource,
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    control: Mutex<Control>,
    snapshot: watch::Sender<ListSnapshot<T>>,
}

impl<T> Inner<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    fn control(&self) -> MutexGuard<'_, Control> {
        self.control.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 修改视图状态；有变化时发出新请求
    fn update<F>(self: &Arc<Self>, change: F) -> Result<bool>
    where
        F: FnOnce(&mut ListViewState) -> Result<bool>,
    {
        let issued = {
            let mut control = self.control();
            if !change(&mut control.view)? {
                return Ok(false);
            }
            control.version += 1;
            (control.version, control.view.descriptor())
        };
        self.issue(issued.0, issued.1);
        Ok(true)
    }

    fn reissue(self: &Arc<Self>) {
        let (version, descriptor) = {
            let mut control = self.control();
            control.version += 1;
            (control.version, control.view.descriptor())
        };
        self.issue(version, descriptor);
    }

    fn issue(self: &Arc<Self>, version: u64, descriptor: ListQueryDescriptor) {
        self.snapshot.send_modify(|s| s.loading = true);
        debug!(resource = %self.resource, version = version, "Issuing list query");

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            inner.fetch(version, descriptor).await;
        });
    }

    async fn fetch(&self, version: u64, descriptor: ListQueryDescriptor) {
        let key = QueryKey::list_query(&self.resource, &descriptor);
        let api = Arc::clone(&self.api);
        let resource = self.resource.clone();

        let result: Result<Page<T>> = self
            .cache
            .get_as(&key, move || async move {
                api.list_value(&resource, &descriptor).await
            })
            .await;

        let mut control = self.control();
        if control.version != version {
            metrics::counter!("list_responses_discarded_total").increment(1);
            debug!(
                resource = %self.resource,
                version = version,
                latest = control.version,
                "Discarding superseded list response"
            );
            return;
        }

        match result {
            Ok(page) => {
                control.view.set_total(page.total);
                self.snapshot.send_replace(ListSnapshot {
                    rows: page.rows,
                    total: page.total,
                    version,
                    loading: false,
                    error: None,
                });
            }
            Err(err) => {
                warn!(resource = %self.resource, error = %err, "List query failed");
                self.snapshot.send_modify(|s| {
                    s.version = version;
                    s.loading = false;
                    s.error = Some(err);
                });
            }
        }
    }

    fn current_key(&self) -> QueryKey {
        QueryKey::list_query(&self.resource, &self.control().view.descriptor())
    }
}

pub struct ListController<T> {
    inner: Arc<Inner<T>>,
    search: Debouncer<String>,
    refresh_task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> ListController<T>
where
    T: DeserializeOwned + Clone + Send + Sync + 'static,
{
    pub fn new(
        resource: Resource,
        api: Arc<ApiClient>,
        cache: Arc<QueryCache>,
        view: ListViewState,
        search_debounce: Duration,
    ) -> Self {
        let (snapshot, _) = watch::channel(ListSnapshot::default());
        let inner = Arc::new(Inner {
            resource,
            api,
            cache,
            control: Mutex::new(Control { view, version: 0 }),
            snapshot,
        });

        let weak = Arc::downgrade(&inner);
        let search = Debouncer::new(search_debounce, move |term: String| {
            if let Some(inner) = weak.upgrade() {
                let _ = inner.update(|view| Ok(view.set_search(&term)));
            }
        });

        Self {
            inner,
            search,
            refresh_task: Mutex::new(None),
        }
    }

    pub fn resource(&self) -> &Resource {
        &self.inner.resource
    }

    /// 首次加载
    pub fn load(&self) {
        self.inner.reissue();
    }

    pub fn set_page(&self, page: u32) {
        let _ = self.inner.update(|view| Ok(view.set_page(page)));
    }

    pub fn set_page_size(&self, page_size: u32) -> Result<()> {
        self.inner.update(|view| view.set_page_size(page_size))?;
        Ok(())
    }

    pub fn set_sort(&self, sort: Option<Sort>) {
        let _ = self.inner.update(|view| Ok(view.set_sort(sort)));
    }

    pub fn set_filter(&self, key: &str, value: FilterValue) {
        let _ = self.inner.update(|view| Ok(view.set_filter(key, value)));
    }

    pub fn clear_filter(&self, key: &str) {
        let _ = self.inner.update(|view| Ok(view.clear_filter(key)));
    }

    pub fn clear_filters(&self) {
        let _ = self.inner.update(|view| Ok(view.clear_filters()));
    }

    /// 原始输入；去抖后才会成为搜索词
    pub fn type_search(&self, text: &str) {
        self.search.push(text.to_string());
    }

    /// 立即应用搜索词（例如回车）
    pub fn search_now(&self, term: &str) {
        let _ = self.inner.update(|view| Ok(view.set_search(term)));
    }

    /// 使当前查询失效并重新请求
    pub fn refresh(&self) {
        self.inner.cache.invalidate(&self.inner.current_key());
        self.inner.reissue();
    }

    /// 缓存失效覆盖本列表时自动重新请求
    pub fn auto_refresh(&self) {
        let mut invalidations = self.inner.cache.invalidations();
        let weak: Weak<Inner<T>> = Arc::downgrade(&self.inner);

        let task = tokio::spawn(async move {
            loop {
                let prefix = match invalidations.recv().await {
                    Ok(prefix) => Some(prefix),
                    Err(broadcast::error::RecvError::Lagged(_)) => None,
                    Err(broadcast::error::RecvError::Closed) => break,
                };
                let Some(inner) = weak.upgrade() else {
                    break;
                };
                let covered = prefix.map_or(true, |p| inner.current_key().starts_with(&p));
                if covered {
                    debug!(resource = %inner.resource, "List invalidated, refetching");
                    inner.reissue();
                }
            }
        });

        let mut slot = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = slot.replace(task) {
            previous.abort();
        }
    }

    pub fn descriptor(&self) -> ListQueryDescriptor {
        self.inner.control().view.descriptor()
    }

    pub fn view(&self) -> ListViewState {
        self.inner.control().view.clone()
    }

    pub fn snapshot(&self) -> ListSnapshot<T> {
        self.inner.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ListSnapshot<T>> {
        self.inner.snapshot.subscribe()
    }

    /// 等待最新版本的请求完成
    pub async fn settled(&self) -> ListSnapshot<T> {
        let mut rx = self.inner.snapshot.subscribe();
        loop {
            let latest = self.inner.control().version;
            {
                let current = rx.borrow_and_update();
                if !current.loading && current.version == latest {
                    return current.clone();
                }
            }
            if rx.changed().await.is_err() {
                return self.snapshot();
            }
        }
    }
}

impl<T> Drop for ListController<T> {
    fn drop(&mut self) {
        if let Some(task) = self
            .refresh_task
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            task.abort();
        }
    }
}
