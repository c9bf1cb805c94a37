//! HTTP 传输层
//!
//! 每个后端回复都是 `{success, data | error}` 信封；
//! 422 时 `error` 为字段名 → 消息列表。

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::Client;
use secrecy::{ExposeSecret, Secret};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::AppConfig;
use crate::error::{AppError, Result};
use crate::models::validation::ValidationErrors;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

/// 一次后端请求
#[derive(Debug)]
pub struct ApiRequest {
    pub method: Method,
    /// 相对路径，例如 "accounts/12"
    pub path: String,
    /// 已编码的查询字符串（不含 '?'）
    pub query: Option<String>,
    pub body: Option<Value>,
    pub token: Option<Secret<String>>,
}

impl ApiRequest {
    pub fn new(method: Method, path: &str) -> Self {
        Self {
            method,
            path: path.trim_start_matches('/').to_string(),
            query: None,
            body: None,
            token: None,
        }
    }

    pub fn with_query(mut self, query: Option<String>) -> Self {
        self.query = query.filter(|q| !q.is_empty());
        self
    }

    pub fn with_body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn with_token(mut self, token: Option<&str>) -> Self {
        self.token = token.map(|t| Secret::new(t.to_string()));
        self
    }
}

/// 后端传输接口；测试中以内存实现替换
#[async_trait]
pub trait Transport: Send + Sync {
    /// 执行请求，返回信封中的 `data`
    async fn execute(&self, request: ApiRequest) -> Result<Value>;
}

/// 基于 reqwest 的传输实现
pub struct HttpTransport {
    client: Client,
    base_url: String,
}

impl HttpTransport {
    pub fn new(config: &AppConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| AppError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: config.api.base_url.trim_end_matches('/').to_string(),
        })
    }

    fn url_for(&self, request: &ApiRequest) -> String {
        match &request.query {
            Some(query) => format!("{}/{}?{}", self.base_url, request.path, query),
            None => format!("{}/{}", self.base_url, request.path),
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, request: ApiRequest) -> Result<Value> {
        let url = self.url_for(&request);
        debug!(method = request.method.as_str(), url = %url, "Sending request");

        let mut builder = self
            .client
            .request(request.method.into(), url.as_str())
            .header(ACCEPT, "application/json");

        if let Some(token) = &request.token {
            builder = builder.bearer_auth(token.expose_secret());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        let response = builder.send().await.map_err(|e| {
            warn!(method = request.method.as_str(), url = %url, error = %e, "Request failed");
            AppError::from(e)
        })?;

        let status = response.status().as_u16();
        let body = response.bytes().await?;

        decode_response(status, &body)
    }
}

/// 解析后端回复
pub fn decode_response(status: u16, body: &[u8]) -> Result<Value> {
    let payload: Option<Value> = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(body).ok()
    };

    match status {
        200..=299 => {
            let payload = payload.ok_or_else(|| {
                AppError::Decode(format!("HTTP {} reply is not valid JSON", status))
            })?;

            match payload.get("success").and_then(Value::as_bool) {
                Some(true) => Ok(payload.get("data").cloned().unwrap_or(Value::Null)),
                Some(false) => Err(AppError::Api(
                    error_message(Some(&payload)).unwrap_or_else(|| "Request failed".to_string()),
                )),
                // 没有信封的回复原样返回
                None => Ok(payload),
            }
        }
        422 => {
            let errors = payload
                .as_ref()
                .and_then(|p| p.get("error").or_else(|| p.get("errors")))
                .and_then(ValidationErrors::from_payload)
                .unwrap_or_default();
            Err(AppError::Validation(errors))
        }
        401 => Err(AppError::Unauthorized),
        403 => Err(AppError::Forbidden),
        404 => Err(AppError::NotFound(
            error_message(payload.as_ref()).unwrap_or_else(|| "resource".to_string()),
        )),
        _ => Err(AppError::Http {
            status,
            message: error_message(payload.as_ref()).unwrap_or_default(),
        }),
    }
}

fn error_message(payload: Option<&Value>) -> Option<String> {
    let payload = payload?;
    payload
        .get("error")
        .and_then(Value::as_str)
        .or_else(|| payload.get("message").and_then(Value::as_str))
        .map(str::to_string)
}
