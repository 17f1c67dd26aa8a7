//! Configuration types for the balancer.

use std::time::Duration;

/// Top-level configuration assembled by the binary.
#[derive(Debug, Clone, Default)]
pub struct BalancerConfig {
    pub proxy: ProxyConfig,
    pub discovery: DiscoveryConfig,
    /// Operator endpoints. `None` disables the admin listener.
    pub admin: Option<AdminConfig>,
}

/// Public proxy listener and dispatch behaviour.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Bind address for the public listener.
    pub host: String,
    /// Public port clients connect to. 0 means OS-assigned.
    pub port: u16,
    /// Port every backend node listens on for proxied traffic.
    pub internal_port: u16,
    /// Maximum node-selection attempts per client request.
    pub retries: u32,
    /// How long a node may take to produce response headers.
    pub upstream_timeout: Duration,
    /// Node type requests are routed to.
    pub target_type: String,
    /// Largest request body buffered for replay across retries.
    pub max_request_body_bytes: usize,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8180,
            internal_port: 20_000,
            retries: 3,
            upstream_timeout: Duration::from_secs(30),
            target_type: "api".to_string(),
            max_request_body_bytes: 8 * 1024 * 1024, // 8 MiB
        }
    }
}

/// Where and how often the registry is refreshed.
#[derive(Debug, Clone)]
pub struct DiscoveryConfig {
    pub host: String,
    pub port: u16,
    /// Node type requested from the discovery source. Empty fetches all.
    pub type_filter: String,
    /// Period of the liveness refresh, independent of failure reports.
    pub refresh_interval: Duration,
    /// Timeout for a single discovery request.
    pub request_timeout: Duration,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 15_001,
            type_filter: String::new(),
            refresh_interval: Duration::from_secs(120),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// Health and registry inspection listener.
#[derive(Debug, Clone)]
pub struct AdminConfig {
    pub host: String,
    /// 0 means OS-assigned.
    pub port: u16,
}

impl Default for AdminConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8181,
        }
    }
}
