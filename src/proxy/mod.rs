pub mod models;

pub use models::{Proxy, ProxyType, DEFAULT_PROXY_PORT};
