//! 查询缓存层

pub mod cache;
pub mod key;
pub mod mutation;

pub use cache::QueryCache;
pub use key::QueryKey;
pub use mutation::Mutations;
