//! 认证状态：会话、用户资料与登录流程

pub mod profile_store;
pub mod service;
pub mod session_store;

pub use profile_store::ProfileStore;
pub use service::AuthService;
pub use session_store::SessionStore;
