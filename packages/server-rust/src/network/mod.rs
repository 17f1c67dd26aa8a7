//! Listeners, admin endpoints, and shutdown control.

pub mod handlers;
pub mod middleware;
pub mod module;
pub mod shutdown;

pub use handlers::AdminState;
pub use module::{BoundPorts, NetworkModule};
pub use shutdown::*;
