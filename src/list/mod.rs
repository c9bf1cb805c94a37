//! 列表视图：状态组合、去抖搜索和按版本应用的请求

pub mod controller;
pub mod debounce;
pub mod filters;
pub mod view_state;

pub use controller::{ListController, ListSnapshot};
pub use debounce::Debouncer;
pub use filters::{check_filter_value, FilterSet};
pub use view_state::ListViewState;
