use std::fmt;

use crate::api::Resource;
use crate::models::list::ListQueryDescriptor;

/// 缓存键：有序路径段，失效时按前缀匹配
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<String>);

impl QueryKey {
    pub fn new<I, S>(segments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self(segments.into_iter().map(Into::into).collect())
    }

    pub fn with(mut self, segment: impl Into<String>) -> Self {
        self.0.push(segment.into());
        self
    }

    /// `resource` 所有列表查询共用的前缀
    pub fn list(resource: &Resource) -> Self {
        Self::new([resource.path(), "list"])
    }

    pub fn list_query(resource: &Resource, descriptor: &ListQueryDescriptor) -> Self {
        Self::list(resource).with(descriptor.to_query_string())
    }

    pub fn detail(resource: &Resource, id: i64) -> Self {
        Self::new([resource.path(), "detail"]).with(id.to_string())
    }

    /// 公共数据键；与数据块顺序无关
    pub fn common_data<'a>(blocks: impl IntoIterator<Item = &'a str>) -> Self {
        let mut blocks: Vec<&str> = blocks.into_iter().collect();
        blocks.sort_unstable();
        blocks.dedup();
        Self::new(["common-data".to_string(), blocks.join(",")])
    }

    pub fn starts_with(&self, prefix: &QueryKey) -> bool {
        self.0.starts_with(&prefix.0)
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.join("/"))
    }
}
