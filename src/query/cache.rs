//! 查询缓存
//!
//! - 新鲜的缓存值直接返回，否则发起请求并缓存结果
//! - 同一个键的并发读取合并为一个进行中的请求
//! - 失效操作标记匹配前缀的所有条目，下一次读取必然重新请求；
//!   失效之前发起的请求结果仍返回给其等待者，但不会写入缓存

use dashmap::DashMap;
use futures::future::{BoxFuture, FutureExt, Shared};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::time::Instant;
use tracing::debug;

use super::key::QueryKey;
use crate::error::Result;

type SharedFetch = Shared<BoxFuture<'static, Result<Arc<Value>>>>;

struct Flight {
    id: u64,
    future: SharedFetch,
}

struct Entry {
    value: Option<Arc<Value>>,
    fetched_at: Option<Instant>,
    invalidated: bool,
    /// 每次失效或覆盖都会更换代号；结果只写回发起时代号仍一致的条目
    generation: u64,
    flight: Option<Flight>,
}

impl Entry {
    fn new(generation: u64) -> Self {
        Self {
            value: None,
            fetched_at: None,
            invalidated: false,
            generation,
            flight: None,
        }
    }

    fn fresh_value(&self, stale_time: Duration) -> Option<Arc<Value>> {
        if self.invalidated {
            return None;
        }
        match (&self.value, self.fetched_at) {
            (Some(value), Some(at)) if at.elapsed() < stale_time => Some(Arc::clone(value)),
            _ => None,
        }
    }

    fn complete(&mut self, flight_id: u64, generation: u64, result: &Result<Arc<Value>>) {
        if self.flight.as_ref().map(|f| f.id) == Some(flight_id) {
            self.flight = None;
        }
        if generation != self.generation {
            return;
        }
        if let Ok(value) = result {
            self.value = Some(Arc::clone(value));
            self.fetched_at = Some(Instant::now());
            self.invalidated = false;
        }
    }
}

enum Lookup {
    Hit(Arc<Value>),
    Join(SharedFetch),
    Miss,
}

pub struct QueryCache {
    entries: Arc<DashMap<QueryKey, Entry>>,
    stale_time: Duration,
    sequence: AtomicU64,
    invalidations: broadcast::Sender<QueryKey>,
}

impl QueryCache {
    pub fn new(stale_time: Duration) -> Self {
        let (invalidations, _) = broadcast::channel(64);
        Self {
            entries: Arc::new(DashMap::new()),
            stale_time,
            sequence: AtomicU64::new(1),
            invalidations,
        }
    }

    pub fn stale_time(&self) -> Duration {
        self.stale_time
    }

    fn next_sequence(&self) -> u64 {
        self.sequence.fetch_add(1, Ordering::Relaxed)
    }

    /// 读取缓存值，必要时通过 `fetcher` 请求
    pub async fn get<F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        self.get_with(key, self.stale_time, fetcher).await
    }

    /// 读取并反序列化
    pub async fn get_as<T, F, Fut>(&self, key: &QueryKey, fetcher: F) -> Result<T>
    where
        T: DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let value = self.get(key, fetcher).await?;
        Ok(T::deserialize(value.as_ref())?)
    }

    /// 使用指定新鲜时间读取
    pub async fn get_with<F, Fut>(
        &self,
        key: &QueryKey,
        stale_time: Duration,
        fetcher: F,
    ) -> Result<Arc<Value>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let future = match self.lookup(key, stale_time) {
            Lookup::Hit(value) => return Ok(value),
            Lookup::Join(future) => future,
            Lookup::Miss => {
                // fetcher 在锁外构造；future 在被轮询前不会发出请求
                let fetch = fetcher();
                self.install_flight(key, stale_time, fetch)
            }
        };
        future.await
    }

    fn lookup(&self, key: &QueryKey, stale_time: Duration) -> Lookup {
        let Some(entry) = self.entries.get(key) else {
            return Lookup::Miss;
        };
        if let Some(value) = entry.fresh_value(stale_time) {
            metrics::counter!("query_cache_hits_total").increment(1);
            debug!(key = %key, "Query cache hit");
            return Lookup::Hit(value);
        }
        match &entry.flight {
            Some(flight) => {
                debug!(key = %key, "Joining in-flight query");
                Lookup::Join(flight.future.clone())
            }
            None => Lookup::Miss,
        }
    }

    fn install_flight<Fut>(&self, key: &QueryKey, stale_time: Duration, fetch: Fut) -> SharedFetch
    where
        Fut: Future<Output = Result<Value>> + Send + 'static,
    {
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(self.next_sequence()));

        // 构造期间可能已有其他读取者填充或发起了请求
        if let Some(value) = entry.fresh_value(stale_time) {
            return futures::future::ready(Ok(value)).boxed().shared();
        }
        if let Some(flight) = &entry.flight {
            return flight.future.clone();
        }

        let flight_id = self.next_sequence();
        let generation = entry.generation;
        let entries = Arc::clone(&self.entries);
        let owned_key = key.clone();

        let future = async move {
            let result = fetch.await.map(Arc::new);
            if let Some(mut entry) = entries.get_mut(&owned_key) {
                entry.complete(flight_id, generation, &result);
            }
            result
        }
        .boxed()
        .shared();

        entry.flight = Some(Flight {
            id: flight_id,
            future: future.clone(),
        });

        metrics::counter!("query_cache_fetches_total").increment(1);
        debug!(key = %key, flight = flight_id, "Query cache miss, fetching");
        future
    }

    /// 标记所有以 `prefix` 开头的条目为失效
    pub fn invalidate(&self, prefix: &QueryKey) -> usize {
        let mut count = 0;
        for mut entry in self.entries.iter_mut() {
            if entry.key().starts_with(prefix) {
                let generation = self.next_sequence();
                let entry = entry.value_mut();
                entry.invalidated = true;
                entry.generation = generation;
                entry.flight = None;
                count += 1;
            }
        }

        metrics::counter!("query_cache_invalidations_total").increment(1);
        debug!(prefix = %prefix, entries = count, "Query cache invalidated");
        // 没有订阅者时发送失败是正常情况
        let _ = self.invalidations.send(prefix.clone());
        count
    }

    /// 直接写入（乐观更新）
    pub fn set_data(&self, key: &QueryKey, value: Value) {
        let generation = self.next_sequence();
        let mut entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(|| Entry::new(generation));
        entry.value = Some(Arc::new(value));
        entry.fetched_at = Some(Instant::now());
        entry.invalidated = false;
        entry.generation = generation;
        entry.flight = None;
    }

    /// 读取缓存值（不论是否新鲜），不发起请求
    pub fn peek(&self, key: &QueryKey) -> Option<Arc<Value>> {
        self.entries.get(key).and_then(|e| e.value.clone())
    }

    pub fn is_fresh(&self, key: &QueryKey) -> bool {
        self.entries
            .get(key)
            .is_some_and(|e| e.fresh_value(self.stale_time).is_some())
    }

    /// 删除所有以 `prefix` 开头的条目
    pub fn remove(&self, prefix: &QueryKey) {
        self.entries.retain(|key, _| !key.starts_with(prefix));
    }

    /// 清空（登出时）
    pub fn clear(&self) {
        self.entries.clear();
        debug!("Query cache cleared");
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 订阅失效通知（失效前缀）
    pub fn invalidations(&self) -> broadcast::Receiver<QueryKey> {
        self.invalidations.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use serde_json::json;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::oneshot;

    fn counting_fetch(
        calls: &Arc<AtomicUsize>,
        value: Value,
    ) -> impl FnOnce() -> BoxFuture<'static, Result<Value>> {
        let calls = Arc::clone(calls);
        move || {
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok(value)
            }
            .boxed()
        }
    }

    #[tokio::test]
    async fn test_fresh_value_is_served_from_cache() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["accounts", "detail", "1"]);

        let first = cache.get(&key, counting_fetch(&calls, json!({"id": 1}))).await.unwrap();
        let second = cache.get(&key, counting_fetch(&calls, json!({"id": 2}))).await.unwrap();

        assert_eq!(*first, json!({"id": 1}));
        assert_eq!(*second, json!({"id": 1}));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_value_goes_stale_after_stale_time() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["tasks", "detail", "9"]);

        cache.get(&key, counting_fetch(&calls, json!(1))).await.unwrap();
        tokio::time::advance(Duration::from_secs(31)).await;
        let value = cache.get(&key, counting_fetch(&calls, json!(2))).await.unwrap();

        assert_eq!(*value, json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_concurrent_reads_share_one_fetch() {
        let cache = Arc::new(QueryCache::new(Duration::from_secs(30)));
        let calls = Arc::new(AtomicUsize::new(0));
        let key = QueryKey::new(["talents", "list", "page=1"]);
        let (release, gate) = oneshot::channel::<()>();

        let gated = {
            let calls = Arc::clone(&calls);
            move || async move {
                calls.fetch_add(1, Ordering::SeqCst);
                gate.await.ok();
                Ok(json!({"data": [], "total": 0}))
            }
        };

        let a = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move { cache.get(&key, gated).await })
        };
        tokio::task::yield_now().await;

        let b = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            let calls = Arc::clone(&calls);
            tokio::spawn(async move { cache.get(&key, counting_fetch(&calls, json!("other"))).await })
        };
        tokio::task::yield_now().await;

        release.send(()).unwrap();
        let a = a.await.unwrap().unwrap();
        let b = b.await.unwrap().unwrap();

        assert_eq!(a, b);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_invalidate_forces_refetch_for_matching_prefix() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let calls = Arc::new(AtomicUsize::new(0));
        let list = QueryKey::new(["accounts", "list", "page=1"]);
        let other = QueryKey::new(["tasks", "list", "page=1"]);

        cache.get(&list, counting_fetch(&calls, json!(1))).await.unwrap();
        cache.get(&other, counting_fetch(&calls, json!(1))).await.unwrap();

        let mut notifications = cache.invalidations();
        assert_eq!(cache.invalidate(&QueryKey::new(["accounts", "list"])), 1);
        assert_eq!(notifications.recv().await.unwrap(), QueryKey::new(["accounts", "list"]));

        assert!(!cache.is_fresh(&list));
        assert!(cache.is_fresh(&other));
        let value = cache.get(&list, counting_fetch(&calls, json!(2))).await.unwrap();
        assert_eq!(*value, json!(2));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_result_of_invalidated_flight_is_not_cached() {
        let cache = Arc::new(QueryCache::new(Duration::from_secs(30)));
        let key = QueryKey::new(["accounts", "list", "page=1"]);
        let (release, gate) = oneshot::channel::<()>();

        let pending = {
            let cache = Arc::clone(&cache);
            let key = key.clone();
            tokio::spawn(async move {
                cache
                    .get(&key, move || async move {
                        gate.await.ok();
                        Ok(json!("before write"))
                    })
                    .await
            })
        };
        tokio::task::yield_now().await;

        cache.invalidate(&QueryKey::new(["accounts"]));
        release.send(()).unwrap();

        // 等待者仍然拿到旧请求的结果
        assert_eq!(*pending.await.unwrap().unwrap(), json!("before write"));
        assert!(cache.peek(&key).is_none());

        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get(&key, counting_fetch(&calls, json!("after write"))).await.unwrap();
        assert_eq!(*value, json!("after write"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_errors_are_not_cached() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let key = QueryKey::new(["libraries", "detail", "3"]);

        let err = cache
            .get(&key, || async { Err(AppError::Transport("reset".to_string())) })
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Transport(_)));

        let calls = Arc::new(AtomicUsize::new(0));
        cache.get(&key, counting_fetch(&calls, json!(3))).await.unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_set_data_and_clear() {
        let cache = QueryCache::new(Duration::from_secs(30));
        let key = QueryKey::new(["accounts", "detail", "4"]);

        cache.set_data(&key, json!({"id": 4, "name": "Acme"}));
        let calls = Arc::new(AtomicUsize::new(0));
        let value = cache.get(&key, counting_fetch(&calls, json!(null))).await.unwrap();
        assert_eq!(value["name"], "Acme");
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        cache.clear();
        assert!(cache.is_empty());
    }
}
