//! Operator endpoints served on the admin listener.
//!
//! [`AdminState`] is the shared state carried through axum extractors.

pub mod health;
pub mod servers;

pub use health::{health_handler, liveness_handler, readiness_handler};
pub use servers::{list_servers_handler, list_servers_by_type_handler};

use std::sync::Arc;
use std::time::Instant;

use super::ShutdownController;
use crate::registry::RegistryStore;

/// State for admin handlers. Cloning only bumps reference counts.
#[derive(Clone)]
pub struct AdminState {
    /// Live node registry, read for counts and listings.
    pub store: Arc<RegistryStore>,
    pub shutdown: Arc<ShutdownController>,
    /// Process start, for uptime.
    pub start_time: Instant,
}
