//! Balance Server: server registry, discovery refresher, and retrying
//! reverse proxy.

pub mod config;
pub mod discovery;
pub mod error;
pub mod network;
pub mod proxy;
pub mod registry;
pub mod telemetry;
pub mod traits;
pub mod worker;

#[cfg(test)]
mod testing;

pub use config::{AdminConfig, BalancerConfig, DiscoveryConfig, ProxyConfig};
pub use discovery::HttpDiscoverySource;
pub use error::{DiscoveryError, ProxyError};
pub use traits::DiscoverySource;
