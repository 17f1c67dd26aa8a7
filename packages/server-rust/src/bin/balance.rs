//! `balance`: load-balancing reverse proxy in front of discovered nodes.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use balance_server::network::NetworkModule;
use balance_server::proxy::ProxyDispatcher;
use balance_server::registry::{ChangeNotifier, RegistryRefresher, RegistryStore};
use balance_server::{
    telemetry, AdminConfig, BalancerConfig, DiscoveryConfig, DiscoverySource,
    HttpDiscoverySource, ProxyConfig,
};
use clap::Parser;
use tracing::{info, warn};

#[derive(Debug, Parser)]
#[command(name = "balance", version, about)]
struct Args {
    /// Public bind address.
    #[arg(long, env = "BALANCE_HOST", default_value = "0.0.0.0")]
    host: String,
    /// Public port clients connect to.
    #[arg(long, env = "BALANCE_PORT", default_value_t = 8180)]
    port: u16,
    /// Port every node serves proxied traffic on.
    #[arg(long, env = "BALANCE_INTERNAL_PORT", default_value_t = 20_000)]
    internal_port: u16,
    /// Node selections per request before giving up.
    #[arg(long, env = "BALANCE_RETRIES", default_value_t = 3)]
    retries: u32,
    /// Seconds a node may take to send response headers.
    #[arg(long, env = "BALANCE_UPSTREAM_TIMEOUT_SECS", default_value_t = 30)]
    upstream_timeout_secs: u64,
    /// Node type requests are routed to.
    #[arg(long, env = "BALANCE_TARGET_TYPE", default_value = "api")]
    target_type: String,
    /// Largest request body accepted, in bytes.
    #[arg(long, env = "BALANCE_MAX_BODY_BYTES", default_value_t = 8 * 1024 * 1024)]
    max_body_bytes: usize,

    #[arg(long, env = "BALANCE_DISCOVERY_HOST", default_value = "127.0.0.1")]
    discovery_host: String,
    #[arg(long, env = "BALANCE_DISCOVERY_PORT", default_value_t = 15_001)]
    discovery_port: u16,
    /// Node type requested from discovery; empty fetches every type.
    #[arg(long, env = "BALANCE_DISCOVERY_TYPE", default_value = "")]
    discovery_type: String,
    /// Seconds between scheduled registry refreshes.
    #[arg(long, env = "BALANCE_REFRESH_SECS", default_value_t = 120)]
    refresh_secs: u64,
    #[arg(long, env = "BALANCE_DISCOVERY_TIMEOUT_SECS", default_value_t = 10)]
    discovery_timeout_secs: u64,

    #[arg(long, env = "BALANCE_ADMIN_HOST", default_value = "127.0.0.1")]
    admin_host: String,
    /// Enables the health and registry endpoints on this port.
    #[arg(long, env = "BALANCE_ADMIN_PORT")]
    admin_port: Option<u16>,
    /// Enables the Prometheus exporter on this port.
    #[arg(long, env = "BALANCE_METRICS_PORT")]
    metrics_port: Option<u16>,

    /// Log as JSON lines.
    #[arg(long, env = "BALANCE_LOG_JSON")]
    log_json: bool,
}

impl Args {
    fn into_config(self) -> BalancerConfig {
        BalancerConfig {
            proxy: ProxyConfig {
                host: self.host,
                port: self.port,
                internal_port: self.internal_port,
                retries: self.retries,
                upstream_timeout: Duration::from_secs(self.upstream_timeout_secs),
                target_type: self.target_type,
                max_request_body_bytes: self.max_body_bytes,
            },
            discovery: DiscoveryConfig {
                host: self.discovery_host,
                port: self.discovery_port,
                type_filter: self.discovery_type,
                refresh_interval: Duration::from_secs(self.refresh_secs),
                request_timeout: Duration::from_secs(self.discovery_timeout_secs),
            },
            admin: self.admin_port.map(|port| AdminConfig {
                host: self.admin_host,
                port,
            }),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    telemetry::init_tracing(args.log_json)?;
    if let Some(port) = args.metrics_port {
        telemetry::install_metrics_exporter(SocketAddr::new(
            IpAddr::V4(Ipv4Addr::UNSPECIFIED),
            port,
        ))?;
    }
    let config = args.into_config();

    let store = Arc::new(RegistryStore::new());
    let notifier = Arc::new(ChangeNotifier::new());
    telemetry::install_event_logging(&notifier);

    let source: Arc<dyn DiscoverySource> = Arc::new(
        HttpDiscoverySource::new(&config.discovery).context("building discovery client")?,
    );
    let refresher = Arc::new(RegistryRefresher::with_type_filter(
        Arc::clone(&store),
        notifier,
        source,
        config.discovery.type_filter.clone(),
    ));

    let dispatcher = Arc::new(
        ProxyDispatcher::new(Arc::clone(&refresher), Arc::new(config.proxy.clone()))
            .context("building upstream client")?,
    );
    let mut network = NetworkModule::new(
        config.proxy.clone(),
        config.admin.clone(),
        dispatcher,
        Arc::clone(&store),
    );
    let ports = network.start().await?;

    match refresher.start(config.discovery.refresh_interval).await {
        Ok(_) => {
            if store.list(&config.proxy.target_type).is_empty() {
                warn!(
                    target_type = %config.proxy.target_type,
                    "No nodes of the target type are registered; requests will fail until one joins"
                );
            }
        }
        Err(err) => {
            warn!(error = %err, "Initial registry refresh failed; retrying on schedule");
        }
    }

    info!(
        proxy_port = ports.proxy,
        admin_port = ?ports.admin,
        servers = store.len(),
        "balance ready"
    );

    network
        .serve(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                warn!(error = %err, "Failed to listen for Ctrl-C; shutting down");
            }
            info!("Shutdown requested");
        })
        .await?;

    refresher.stop().await;
    info!("balance stopped");
    Ok(())
}
