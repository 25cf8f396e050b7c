// src/lib.rs
//! Reverse proxy that distributes requests across a fixed set of backends in
//! strict round-robin order.
pub mod cli;
pub mod config;
pub mod load_balancer;
pub mod logging;
pub mod metrics;
pub mod proxy;
pub mod server;
