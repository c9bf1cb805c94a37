//! 列表查询模型：分页、排序、过滤与请求描述

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use url::form_urlencoded;
use validator::Validate;

/// 分页（页码从 0 开始）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    #[validate(range(min = 1, max = 500))]
    pub page_size: u32,
}

impl Pagination {
    pub fn new(page_size: u32) -> Self {
        Self { page: 0, page_size }
    }

    /// `total` 条记录的最后一页下标（为空时为 0）
    pub fn last_page(&self, total: u64) -> u32 {
        if total == 0 || self.page_size == 0 {
            return 0;
        }
        let pages = total.div_ceil(u64::from(self.page_size));
        u32::try_from(pages - 1).unwrap_or(u32::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sort {
    pub field: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Asc,
        }
    }

    pub fn desc(field: &str) -> Self {
        Self {
            field: field.to_string(),
            direction: SortDirection::Desc,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FilterMode {
    #[default]
    Standard,
    Exclude,
}

impl FilterMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilterMode::Standard => "standard",
            FilterMode::Exclude => "exclude",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct DateRange {
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
}

impl DateRange {
    pub fn is_empty(&self) -> bool {
        self.start.is_none() && self.end.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterData {
    Ids(Vec<i64>),
    DateRange(DateRange),
}

impl FilterData {
    pub fn is_empty(&self) -> bool {
        match self {
            FilterData::Ids(ids) => ids.is_empty(),
            FilterData::DateRange(range) => range.is_empty(),
        }
    }
}

/// 单个过滤字段的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterValue {
    pub data: FilterData,
    #[serde(default)]
    pub mode: FilterMode,
}

impl FilterValue {
    pub fn ids(ids: impl IntoIterator<Item = i64>) -> Self {
        Self {
            data: FilterData::Ids(ids.into_iter().collect()),
            mode: FilterMode::Standard,
        }
    }

    pub fn date_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> Self {
        Self {
            data: FilterData::DateRange(DateRange { start, end }),
            mode: FilterMode::Standard,
        }
    }

    pub fn with_mode(mut self, mode: FilterMode) -> Self {
        self.mode = mode;
        self
    }

    /// 标准模式下的空数据视为未设置
    pub fn is_active(&self) -> bool {
        !self.data.is_empty() || self.mode != FilterMode::Standard
    }
}

/// 一次列表请求的不可变快照
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListQueryDescriptor {
    pub page: u32,
    #[validate(range(min = 1, max = 500))]
    pub page_size: u32,
    pub search: Option<String>,
    pub sort: Option<Sort>,
    pub filters: BTreeMap<String, FilterValue>,
}

impl ListQueryDescriptor {
    /// 编码为列表接口的查询字符串
    ///
    /// `page` 按 1 起始发送；过滤键有序输出，相同描述编码结果一致
    pub fn to_query_string(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());

        query.append_pair("page", &(u64::from(self.page) + 1).to_string());
        query.append_pair("perPage", &self.page_size.to_string());

        if let Some(search) = self.search.as_deref().filter(|s| !s.is_empty()) {
            query.append_pair("search", search);
        }

        if let Some(sort) = &self.sort {
            query.append_pair("sort[field]", &sort.field);
            query.append_pair("sort[direction]", sort.direction.as_str());
        }

        for (key, filter) in &self.filters {
            query.append_pair(&format!("filters[{}][mode]", key), filter.mode.as_str());
            match &filter.data {
                FilterData::Ids(ids) => {
                    for id in ids {
                        query.append_pair(&format!("filters[{}][data][]", key), &id.to_string());
                    }
                }
                FilterData::DateRange(range) => {
                    if let Some(start) = range.start {
                        query.append_pair(
                            &format!("filters[{}][data][start]", key),
                            &start.format("%Y-%m-%d").to_string(),
                        );
                    }
                    if let Some(end) = range.end {
                        query.append_pair(
                            &format!("filters[{}][data][end]", key),
                            &end.format("%Y-%m-%d").to_string(),
                        );
                    }
                }
            }
        }

        query.finish()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    #[serde(rename = "data")]
    pub rows: Vec<T>,
    #[serde(default)]
    pub total: u64,
}
