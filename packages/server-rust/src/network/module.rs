//! Listener lifecycle for the public proxy and the admin endpoints.
//!
//! Deferred startup: `new()` wires shared state, `start()` binds the
//! sockets, and `serve()` accepts connections. Binding separately lets the
//! binary report bound ports and refresh the registry before traffic flows.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::routing::get;
use axum::Router;
use tokio::net::TcpListener;
use tracing::{info, warn};

use super::handlers::{
    health_handler, list_servers_by_type_handler, list_servers_handler, liveness_handler,
    readiness_handler, AdminState,
};
use super::middleware::{build_admin_layers, build_proxy_layers};
use super::shutdown::ShutdownController;
use crate::config::{AdminConfig, ProxyConfig};
use crate::proxy::{proxy_handler, ProxyDispatcher, ProxyState};
use crate::registry::RegistryStore;

/// Upper bound on waiting for in-flight proxy requests after shutdown.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

/// Ports actually bound by [`NetworkModule::start`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundPorts {
    pub proxy: u16,
    pub admin: Option<u16>,
}

/// Owns the proxy and admin listeners.
pub struct NetworkModule {
    proxy_config: ProxyConfig,
    admin_config: Option<AdminConfig>,
    dispatcher: Arc<ProxyDispatcher>,
    store: Arc<RegistryStore>,
    shutdown: Arc<ShutdownController>,
    proxy_listener: Option<TcpListener>,
    admin_listener: Option<TcpListener>,
}

impl NetworkModule {
    /// Creates the module without binding anything.
    #[must_use]
    pub fn new(
        proxy_config: ProxyConfig,
        admin_config: Option<AdminConfig>,
        dispatcher: Arc<ProxyDispatcher>,
        store: Arc<RegistryStore>,
    ) -> Self {
        Self {
            proxy_config,
            admin_config,
            dispatcher,
            store,
            shutdown: Arc::new(ShutdownController::new()),
            proxy_listener: None,
            admin_listener: None,
        }
    }

    #[must_use]
    pub fn shutdown_controller(&self) -> Arc<ShutdownController> {
        Arc::clone(&self.shutdown)
    }

    /// Every method and path goes to the dispatcher.
    pub fn build_proxy_router(&self) -> Router {
        Router::new()
            .fallback(proxy_handler)
            .layer(build_proxy_layers())
            .with_state(ProxyState {
                dispatcher: Arc::clone(&self.dispatcher),
                shutdown: Arc::clone(&self.shutdown),
            })
    }

    /// Routes:
    /// - `GET /health`, `/health/live`, `/health/ready`
    /// - `GET /servers`, `/servers/{node_type}`
    pub fn build_admin_router(&self) -> Router {
        let state = AdminState {
            store: Arc::clone(&self.store),
            shutdown: Arc::clone(&self.shutdown),
            start_time: Instant::now(),
        };

        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/servers", get(list_servers_handler))
            .route("/servers/{node_type}", get(list_servers_by_type_handler))
            .layer(build_admin_layers())
            .with_state(state)
    }

    /// Binds the proxy listener and, if configured, the admin listener.
    ///
    /// # Errors
    ///
    /// Returns an error if either address cannot be bound.
    pub async fn start(&mut self) -> anyhow::Result<BoundPorts> {
        let proxy = bind(&self.proxy_config.host, self.proxy_config.port).await?;
        let proxy_port = proxy.local_addr()?.port();
        info!(host = %self.proxy_config.host, port = proxy_port, "Proxy listener bound");
        self.proxy_listener = Some(proxy);

        let mut admin_port = None;
        if let Some(admin) = &self.admin_config {
            let listener = bind(&admin.host, admin.port).await?;
            let port = listener.local_addr()?.port();
            info!(host = %admin.host, port, "Admin listener bound");
            admin_port = Some(port);
            self.admin_listener = Some(listener);
        }

        Ok(BoundPorts {
            proxy: proxy_port,
            admin: admin_port,
        })
    }

    /// Serves until `shutdown` resolves, then drains in-flight proxy
    /// requests for up to 30 seconds.
    ///
    /// # Errors
    ///
    /// Returns an error if either server hits a fatal I/O error.
    ///
    /// # Panics
    ///
    /// Panics if `start()` was not called before `serve()`.
    pub async fn serve(
        mut self,
        shutdown: impl Future<Output = ()> + Send + 'static,
    ) -> anyhow::Result<()> {
        let proxy_listener = self
            .proxy_listener
            .take()
            .expect("start() must be called before serve()");
        let admin_listener = self.admin_listener.take();

        let proxy_router = self.build_proxy_router();
        let admin_router = self.build_admin_router();
        let controller = self.shutdown;

        // Both servers stop on the same signal.
        let signal = {
            let controller = Arc::clone(&controller);
            async move {
                shutdown.await;
                controller.trigger_shutdown();
            }
        };
        let mut proxy_rx = controller.shutdown_receiver();
        let mut admin_rx = controller.shutdown_receiver();
        tokio::spawn(signal);

        let admin_task = admin_listener.map(|listener| {
            tokio::spawn(async move {
                axum::serve(listener, admin_router)
                    .with_graceful_shutdown(async move {
                        let _ = admin_rx.wait_for(|stopped| *stopped).await;
                    })
                    .await
            })
        });

        controller.set_ready();
        info!("Serving proxied traffic");

        axum::serve(
            proxy_listener,
            proxy_router.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .with_graceful_shutdown(async move {
            let _ = proxy_rx.wait_for(|stopped| *stopped).await;
        })
        .await?;

        if controller.wait_for_drain(DRAIN_TIMEOUT).await {
            info!("All in-flight proxy requests drained");
        } else {
            warn!(
                in_flight = controller.in_flight_count(),
                "Drain timeout expired with proxy requests still in flight"
            );
        }

        if let Some(task) = admin_task {
            task.await??;
        }
        Ok(())
    }
}

async fn bind(host: &str, port: u16) -> anyhow::Result<TcpListener> {
    Ok(TcpListener::bind(format!("{host}:{port}")).await?)
}
