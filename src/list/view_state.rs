//! 列表视图状态
//!
//! 分页、排序、搜索词和过滤器组合为一个不可变的查询描述。
//! - 过滤器或搜索词变化时回到第一页
//! - 只改每页条数时保留页码，超出最后一页则收回到最后一页
//! - 排序变化保留页码

use validator::Validate;

use super::filters::FilterSet;
use crate::error::{AppError, Result};
use crate::models::list::{FilterValue, ListQueryDescriptor, Pagination, Sort};
use crate::models::validation::ValidationErrors;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListViewState {
    pagination: Pagination,
    sort: Option<Sort>,
    search: Option<String>,
    filters: FilterSet,
    last_total: Option<u64>,
}

impl ListViewState {
    pub fn new(page_size: u32) -> Result<Self> {
        let pagination = Pagination::new(page_size);
        validate_pagination(&pagination)?;

        Ok(Self {
            pagination,
            sort: None,
            search: None,
            filters: FilterSet::new(),
            last_total: None,
        })
    }

    pub fn with_sort(mut self, sort: Sort) -> Self {
        self.sort = Some(sort);
        self
    }

    pub fn descriptor(&self) -> ListQueryDescriptor {
        ListQueryDescriptor {
            page: self.pagination.page,
            page_size: self.pagination.page_size,
            search: self.search.clone(),
            sort: self.sort.clone(),
            filters: self.filters.active(),
        }
    }

    pub fn page(&self) -> u32 {
        self.pagination.page
    }

    pub fn page_size(&self) -> u32 {
        self.pagination.page_size
    }

    pub fn sort(&self) -> Option<&Sort> {
        self.sort.as_ref()
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn filters(&self) -> &FilterSet {
        &self.filters
    }

    pub fn set_page(&mut self, page: u32) -> bool {
        if self.pagination.page == page {
            return false;
        }
        self.pagination.page = page;
        true
    }

    pub fn set_page_size(&mut self, page_size: u32) -> Result<bool> {
        if self.pagination.page_size == page_size {
            return Ok(false);
        }

        let mut pagination = Pagination {
            page: self.pagination.page,
            page_size,
        };
        validate_pagination(&pagination)?;

        if let Some(total) = self.last_total {
            pagination.page = pagination.page.min(pagination.last_page(total));
        }
        self.pagination = pagination;
        Ok(true)
    }

    pub fn set_sort(&mut self, sort: Option<Sort>) -> bool {
        if self.sort == sort {
            return false;
        }
        self.sort = sort;
        true
    }

    /// 应用去抖后的搜索词；空白视为无搜索
    pub fn set_search(&mut self, term: &str) -> bool {
        let term = Some(term.trim()).filter(|t| !t.is_empty()).map(str::to_string);
        if self.search == term {
            return false;
        }
        self.search = term;
        self.pagination.page = 0;
        true
    }

    pub fn set_filter(&mut self, key: &str, value: FilterValue) -> bool {
        let changed = self.filters.set(key, value);
        self.reset_page_if(changed)
    }

    pub fn clear_filter(&mut self, key: &str) -> bool {
        let changed = self.filters.clear(key);
        self.reset_page_if(changed)
    }

    pub fn clear_filters(&mut self) -> bool {
        let changed = self.filters.clear_all();
        self.reset_page_if(changed)
    }

    /// 记录最近一次响应的总数，用于收回页码
    pub fn set_total(&mut self, total: u64) {
        self.last_total = Some(total);
    }

    pub fn last_total(&self) -> Option<u64> {
        self.last_total
    }

    fn reset_page_if(&mut self, changed: bool) -> bool {
        if changed {
            self.pagination.page = 0;
        }
        changed
    }
}

fn validate_pagination(pagination: &Pagination) -> Result<()> {
    pagination.validate().map_err(|_| {
        let mut errors = ValidationErrors::default();
        errors.insert("perPage", "Page size must be between 1 and 500");
        AppError::Validation(errors)
    })
}
