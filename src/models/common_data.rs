//! 页面表单与过滤器共用的下拉数据

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// 下拉选项 ID；接口既有数字也有字符串
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OptionId {
    Int(i64),
    Text(String),
}

/// 类 `{id, name}` 的选项记录；其余字段保留在 `extra`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OptionRecord {
    pub id: OptionId,
    #[serde(default)]
    pub name: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Block name → options; `None` marks a block whose request failed
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CommonDataBundle(BTreeMap<String, Option<Vec<OptionRecord>>>);

impl CommonDataBundle {
    pub fn insert(&mut self, block: &str, options: Option<Vec<OptionRecord>>) {
        self.0.insert(block.to_string(), options);
    }

    /// `block` 的选项；失败或未请求时为 `None`
    pub fn options(&self, block: &str) -> Option<&[OptionRecord]> {
        self.0.get(block).and_then(|o| o.as_deref())
    }

    pub fn contains_block(&self, block: &str) -> bool {
        self.0.contains_key(block)
    }

    pub fn failed_blocks(&self) -> Vec<&str> {
        self.0
            .iter()
            .filter(|(_, options)| options.is_none())
            .map(|(block, _)| block.as_str())
            .collect()
    }

    pub fn is_complete(&self) -> bool {
        self.0.values().all(Option::is_some)
    }

    pub fn blocks(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
