// src/load_balancer/mod.rs
mod rewrite;
mod scheduler;

pub use rewrite::rewrite_url;
pub use scheduler::Scheduler;
