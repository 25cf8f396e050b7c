// src/proxy/mod.rs
mod backend;
mod dispatcher;
mod proxy;
mod transport;

pub use backend::{parse_backends, Backend};
pub use dispatcher::{Dispatched, Dispatcher};
pub use proxy::{Proxy, ProxyError};
pub use transport::{ClientAddr, Forwarder, HttpForwarder};
