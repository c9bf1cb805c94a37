//! 后端 API 客户端
//! 令牌在每次请求时从会话中读取

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::borrow::Cow;
use std::sync::Arc;
use tokio::sync::watch;

use super::transport::{ApiRequest, Method, Transport};
use crate::error::Result;
use crate::models::list::{ListQueryDescriptor, Page};
use crate::models::session::Session;

/// 逻辑资源路径
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Resource(Cow<'static, str>);

impl Resource {
    pub const ACCOUNTS: Resource = Resource(Cow::Borrowed("accounts"));
    pub const TALENTS: Resource = Resource(Cow::Borrowed("talents"));
    pub const TASKS: Resource = Resource(Cow::Borrowed("tasks"));
    pub const LIBRARIES: Resource = Resource(Cow::Borrowed("libraries"));

    /// 设置页下的子资源，例如 `settings/statuses`
    pub fn settings(name: &str) -> Self {
        Resource(Cow::Owned(format!("settings/{}", name.trim_matches('/'))))
    }

    pub fn new(path: &str) -> Self {
        Resource(Cow::Owned(path.trim_matches('/').to_string()))
    }

    pub fn path(&self) -> &str {
        &self.0
    }

    pub fn item_path(&self, id: i64) -> String {
        format!("{}/{}", self.0, id)
    }
}

impl std::fmt::Display for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: watch::Receiver<Session>,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, session: watch::Receiver<Session>) -> Self {
        Self { transport, session }
    }

    /// 发送请求并返回原始 `data`
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        query: Option<String>,
        body: Option<Value>,
    ) -> Result<Value> {
        let token = self.session.borrow().token().map(str::to_string);
        let mut request = ApiRequest::new(method, path)
            .with_query(query)
            .with_token(token.as_deref());
        if let Some(body) = body {
            request = request.with_body(body);
        }
        self.transport.execute(request).await
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str, query: Option<String>) -> Result<T> {
        let data = self.send(Method::Get, path, query, None).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// GET 一个自带查询字符串的端点，例如 `settings/statuses?type=account`
    pub async fn get_raw(&self, endpoint: &str) -> Result<Value> {
        let (path, query) = match endpoint.split_once('?') {
            Some((path, query)) => (path, Some(query.to_string())),
            None => (endpoint, None),
        };
        self.send(Method::Get, path, query, None).await
    }

    pub async fn post<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let data = self.send(Method::Post, path, None, Some(body)).await?;
        Ok(serde_json::from_value(data)?)
    }

    pub async fn put<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T> {
        let body = serde_json::to_value(body)?;
        let data = self.send(Method::Put, path, None, Some(body)).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 列表查询
    pub async fn list_value(
        &self,
        resource: &Resource,
        descriptor: &ListQueryDescriptor,
    ) -> Result<Value> {
        self.send(
            Method::Get,
            resource.path(),
            Some(descriptor.to_query_string()),
            None,
        )
        .await
    }

    pub async fn list<T: DeserializeOwned>(
        &self,
        resource: &Resource,
        descriptor: &ListQueryDescriptor,
    ) -> Result<Page<T>> {
        let data = self.list_value(resource, descriptor).await?;
        Ok(serde_json::from_value(data)?)
    }

    /// 详情查询
    pub async fn detail_value(&self, resource: &Resource, id: i64) -> Result<Value> {
        self.send(Method::Get, &resource.item_path(id), None, None)
            .await
    }

    pub async fn detail<T: DeserializeOwned>(&self, resource: &Resource, id: i64) -> Result<T> {
        let data = self.detail_value(resource, id).await?;
        Ok(serde_json::from_value(data)?)
    }
}
