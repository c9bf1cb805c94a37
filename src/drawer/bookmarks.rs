//! 表单书签（命名的表单分区）及其拥有的字段

use crate::models::validation::ValidationErrors;

/// 书签到字段前缀的有序映射
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BookmarkTable {
    entries: Vec<(String, Vec<String>)>,
}

impl BookmarkTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bookmark<I, S>(mut self, name: &str, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.entries
            .push((name.to_string(), prefixes.into_iter().map(Into::into).collect()));
        self
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|(name, _)| name.as_str())
    }

    pub fn first(&self) -> Option<&str> {
        self.names().next()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names().any(|n| n == name)
    }

    /// 第一个拥有 `field` 的书签
    pub fn owner_of(&self, field: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(_, prefixes)| prefixes.iter().any(|p| owns(p, field)))
            .map(|(name, _)| name.as_str())
    }

    /// 拥有出错字段的书签，按表顺序
    pub fn errored(&self, errors: &ValidationErrors) -> Vec<&str> {
        let owners: Vec<&str> = errors.fields().filter_map(|f| self.owner_of(f)).collect();
        self.names().filter(|name| owners.contains(name)).collect()
    }
}

// "address" 拥有 "address"、"address.city"、"address[0]"，不含 "addressee"
fn owns(prefix: &str, field: &str) -> bool {
    if prefix.ends_with('.') {
        return field.starts_with(prefix);
    }
    match field.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('.') || rest.starts_with('['),
        None => false,
    }
}

/// 单个书签的错误标记
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookmarkState {
    pub name: String,
    pub has_error: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> BookmarkTable {
        BookmarkTable::new()
            .bookmark("general", ["name", "email"])
            .bookmark("address", ["address"])
            .bookmark("social", ["socials."])
    }

    #[test]
    fn test_owner_lookup() {
        let t = table();
        assert_eq!(t.owner_of("email"), Some("general"));
        assert_eq!(t.owner_of("address.city"), Some("address"));
        assert_eq!(t.owner_of("address[1]"), Some("address"));
        assert_eq!(t.owner_of("socials.0.url"), Some("social"));
        assert_eq!(t.owner_of("addressee"), None);
    }

    #[test]
    fn test_errored_keeps_table_order() {
        let mut errors = ValidationErrors::default();
        errors.insert("socials.1.url", "invalid url");
        errors.insert("name", "required");

        assert_eq!(table().errored(&errors), vec!["general", "social"]);
    }

    #[test]
    fn test_overlapping_prefixes_flag_only_the_owner() {
        let t = BookmarkTable::new()
            .bookmark("general", ["name"])
            .bookmark("address", ["address"])
            .bookmark("billing", ["address."]);
        let mut errors = ValidationErrors::default();
        errors.insert("address.city", "required");

        assert_eq!(t.owner_of("address.city"), Some("address"));
        assert_eq!(t.errored(&errors), vec!["address"]);
    }
}
