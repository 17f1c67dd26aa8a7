//! The retrying reverse proxy.

pub mod dispatcher;
pub mod forward;
pub mod handler;
pub mod response;

pub use dispatcher::{ProxyDispatcher, ProxyRequest};
pub use handler::{proxy_handler, ProxyState};
