//! CRM 管理后台客户端协调层
//! 会话、查询缓存、列表查询组合、公共数据、抽屉状态与实时权限同步

pub mod api;
pub mod auth;
pub mod common_data;
pub mod config;
pub mod context;
pub mod drawer;
pub mod error;
pub mod list;
pub mod models;
pub mod notify;
pub mod query;
pub mod realtime;
pub mod storage;
pub mod telemetry;

pub use context::AppContext;
pub use error::{AppError, Result};
