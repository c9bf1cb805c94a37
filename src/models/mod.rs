//! 数据模型模块
//! 会话、权限、列表查询、公共数据与校验错误

pub mod auth;
pub mod common_data;
pub mod list;
pub mod permission;
pub mod session;
pub mod validation;
