//! 公共数据（下拉选项）获取
//!
//! 每个块一个请求，全部并发；单个块失败只记录日志，结果中对应块为 `None`。
//! 整包按块名缓存，新鲜时间比普通查询更长；含失败块的结果不保留。

use futures::future::join_all;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::api::ApiClient;
use crate::error::Result;
use crate::models::common_data::{CommonDataBundle, OptionRecord};
use crate::query::{QueryCache, QueryKey};

pub struct CommonDataFetcher {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
    stale_time: Duration,
}

impl CommonDataFetcher {
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>, stale_time: Duration) -> Self {
        Self {
            api,
            cache,
            stale_time,
        }
    }

    /// 获取一个页面的全部公共数据块
    ///
    /// `blocks` 为块名 → 端点（可带查询字符串），例如
    /// `("statuses", "settings/statuses?type=account")`。
    pub async fn fetch<'a, I>(&self, blocks: I) -> CommonDataBundle
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let blocks: BTreeMap<String, String> = blocks
            .into_iter()
            .map(|(name, endpoint)| (name.to_string(), endpoint.to_string()))
            .collect();
        let key = QueryKey::common_data(blocks.keys().map(String::as_str));
        let names: Vec<String> = blocks.keys().cloned().collect();

        let api = Arc::clone(&self.api);
        let cached = self
            .cache
            .get_with(&key, self.stale_time, move || async move {
                let bundle = fetch_blocks(&api, blocks).await;
                Ok(serde_json::to_value(bundle)?)
            })
            .await;

        match cached.and_then(|value| decode_bundle(&value)) {
            Ok(bundle) => {
                if !bundle.is_complete() {
                    self.cache.remove(&key);
                }
                bundle
            }
            Err(err) => {
                warn!(key = %key, error = %err, "Common data could not be loaded");
                let mut bundle = CommonDataBundle::default();
                for name in &names {
                    bundle.insert(name, None);
                }
                bundle
            }
        }
    }
}

fn decode_bundle(value: &Value) -> Result<CommonDataBundle> {
    Ok(CommonDataBundle::deserialize(value)?)
}

async fn fetch_blocks(api: &ApiClient, blocks: BTreeMap<String, String>) -> CommonDataBundle {
    let requests = blocks.iter().map(|(name, endpoint)| async move {
        let result = api
            .get_raw(endpoint)
            .await
            .and_then(|data| Ok(Vec::<OptionRecord>::deserialize(&data)?));
        (name.as_str(), endpoint.as_str(), result)
    });

    let mut bundle = CommonDataBundle::default();
    for (name, endpoint, result) in join_all(requests).await {
        match result {
            Ok(options) => {
                debug!(block = name, options = options.len(), "Common data block loaded");
                bundle.insert(name, Some(options));
            }
            Err(err) => {
                metrics::counter!("common_data_block_failures_total").increment(1);
                warn!(block = name, endpoint = endpoint, error = %err, "Common data block failed");
                bundle.insert(name, None);
            }
        }
    }
    bundle
}
