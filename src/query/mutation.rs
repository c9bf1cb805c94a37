//! 写操作：成功后使相关查询失效

use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::info;

use super::cache::QueryCache;
use super::key::QueryKey;
use crate::api::{ApiClient, Resource};
use crate::error::Result;

pub struct Mutations {
    api: Arc<ApiClient>,
    cache: Arc<QueryCache>,
}

impl Mutations {
    pub fn new(api: Arc<ApiClient>, cache: Arc<QueryCache>) -> Self {
        Self { api, cache }
    }

    /// 新建记录
    pub async fn create<B: Serialize>(&self, resource: &Resource, body: &B) -> Result<Value> {
        let created: Value = self.api.post(resource.path(), body).await?;

        self.cache.invalidate(&QueryKey::list(resource));
        self.invalidate_common_data(resource);

        info!(resource = %resource, "Record created");
        Ok(created)
    }

    /// 更新记录
    pub async fn update<B: Serialize>(
        &self,
        resource: &Resource,
        id: i64,
        body: &B,
    ) -> Result<Value> {
        let updated: Value = self.api.put(&resource.item_path(id), body).await?;

        self.cache.invalidate(&QueryKey::list(resource));
        self.cache.invalidate(&QueryKey::detail(resource, id));
        self.invalidate_common_data(resource);

        info!(resource = %resource, id = id, "Record updated");
        Ok(updated)
    }

    // 设置项同时是下拉选项的来源
    fn invalidate_common_data(&self, resource: &Resource) {
        if resource.path().starts_with("settings/") {
            self.cache.invalidate(&QueryKey::new(["common-data"]));
        }
    }
}
