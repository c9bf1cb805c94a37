//! HTTP 422 返回的字段校验错误

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// 按字段名分组的校验消息
///
/// 只能通过 [`ValidationErrors::from_payload`] 或 [`ValidationErrors::insert`] 构建，
/// 每个条目都有非空字段名和至少一条消息
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ValidationErrors(BTreeMap<String, Vec<String>>);

impl ValidationErrors {
    /// 解析 422 响应的 `error` 字段
    ///
    /// 接受 `{"field": ["msg", ...]}` 与简写 `{"field": "msg"}`；非对象返回 `None`
    pub fn from_payload(payload: &Value) -> Option<Self> {
        let object = payload.as_object()?;
        let mut errors = Self::default();

        for (field, messages) in object {
            match messages {
                Value::String(message) => errors.insert(field, message),
                Value::Array(items) => {
                    for item in items {
                        match item {
                            Value::String(message) => errors.insert(field, message),
                            other => errors.insert(field, &other.to_string()),
                        }
                    }
                }
                Value::Null => {}
                other => errors.insert(field, &other.to_string()),
            }
        }

        Some(errors)
    }

    pub fn insert(&mut self, field: &str, message: &str) {
        let field = field.trim();
        if field.is_empty() || message.is_empty() {
            return;
        }
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.to_string());
    }

    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}
