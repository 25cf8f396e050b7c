pub mod builder;
pub mod handler;
pub mod listener;
pub mod signal;

pub use builder::{serve_listener, ServerBuilder};
pub use handler::RequestHandler;
pub use signal::shutdown_signal;
