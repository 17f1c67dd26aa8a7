//! Logging, metrics export, and registry event logging.

use std::net::SocketAddr;

use balance_core::{EventKind, RegistryEvent};
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing::{error, info};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::registry::{ChangeNotifier, SubscriptionHandle};

/// Installs the global `tracing` subscriber.
///
/// The filter comes from `RUST_LOG` and defaults to `info`. With `json` set,
/// each event is one JSON object per line.
///
/// # Errors
///
/// Returns an error if a global subscriber is already installed.
pub fn init_tracing(json: bool) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| fmt::layer().json()))
        .with((!json).then(fmt::layer))
        .try_init()?;
    Ok(())
}

/// Serves Prometheus metrics on `addr` from a background task.
///
/// # Errors
///
/// Returns an error if the recorder is already installed or the listener
/// cannot be set up. Must be called inside a tokio runtime.
pub fn install_metrics_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    PrometheusBuilder::new().with_http_listener(addr).install()?;
    info!(%addr, "Prometheus exporter listening");
    Ok(())
}

/// Renders an event as a single log line.
#[must_use]
pub fn describe_event(event: &RegistryEvent) -> String {
    match event {
        RegistryEvent::ServerChange(servers) => {
            let list: Vec<String> = servers
                .iter()
                .map(|n| format!("{}({})@{}", n.name, n.node_type, n.address))
                .collect();
            format!("{} server(s): [{}]", servers.len(), list.join(", "))
        }
        RegistryEvent::ServersAdded(added) => {
            let names: Vec<&str> = added.iter().map(|n| n.name.as_str()).collect();
            format!("added: [{}]", names.join(", "))
        }
        RegistryEvent::Error(message) => message.clone(),
    }
}

/// Subscribes handlers that log every registry event kind.
pub fn install_event_logging(notifier: &ChangeNotifier) -> Vec<SubscriptionHandle> {
    vec![
        notifier.subscribe(EventKind::ServerChange, |event| {
            info!(event = %event.kind(), "Server list changed: {}", describe_event(event));
        }),
        notifier.subscribe(EventKind::ServersAdded, |event| {
            info!(event = %event.kind(), "Servers joined: {}", describe_event(event));
        }),
        notifier.subscribe(EventKind::Error, |event| {
            error!(event = %event.kind(), "Discovery error: {}", describe_event(event));
        }),
    ]
}
