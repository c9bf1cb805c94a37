//! 后端 REST 接口

pub mod client;
pub mod transport;

pub use client::{ApiClient, Resource};
pub use transport::{decode_response, ApiRequest, HttpTransport, Method, Transport};
