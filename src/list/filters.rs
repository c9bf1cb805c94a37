//! 过滤器集合：每个字段独立的过滤状态

use std::collections::BTreeMap;

use crate::models::list::FilterValue;

/// 过滤值是否会进入请求
pub fn check_filter_value(value: &FilterValue) -> bool {
    value.is_active()
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSet {
    values: BTreeMap<String, FilterValue>,
}

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// 设置一个字段；返回进入请求的过滤条件是否变化
    pub fn set(&mut self, key: &str, value: FilterValue) -> bool {
        let before = self.effective(key);
        let after = Some(&value).filter(|v| check_filter_value(v)).cloned();
        self.values.insert(key.to_string(), value);
        before != after
    }

    pub fn clear(&mut self, key: &str) -> bool {
        self.values
            .remove(key)
            .is_some_and(|value| check_filter_value(&value))
    }

    pub fn clear_all(&mut self) -> bool {
        let changed = self.active_count() > 0;
        self.values.clear();
        changed
    }

    fn effective(&self, key: &str) -> Option<FilterValue> {
        self.values
            .get(key)
            .filter(|v| check_filter_value(v))
            .cloned()
    }

    pub fn get(&self, key: &str) -> Option<&FilterValue> {
        self.values.get(key)
    }

    /// 只保留有效的过滤器
    pub fn active(&self) -> BTreeMap<String, FilterValue> {
        self.values
            .iter()
            .filter(|(_, value)| check_filter_value(value))
            .map(|(key, value)| (key.clone(), value.clone()))
            .collect()
    }

    pub fn active_count(&self) -> usize {
        self.values.values().filter(|v| check_filter_value(v)).count()
    }
}
