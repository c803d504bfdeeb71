//! Proxy pool and the sources that feed it

pub mod pool;
pub mod source;

pub use pool::{ProxyPool, ProxySelection};
pub use source::{HttpProxySource, ProxySource, default_proxy_sources, parse_proxy_line};
