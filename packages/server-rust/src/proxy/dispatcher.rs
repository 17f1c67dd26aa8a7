//! Per-request control loop: select a node, forward, retry on failure.
//!
//! State machine per request:
//!
//! ```text
//! Selecting -> Forwarding -> Succeeded
//!     ^            |-> timeout ------------> Failed (504)
//!     |            '-> transport error -> Retrying
//!     '----------------------------------------'  (budget left)
//!                                  Retrying -> Failed (500)  (budget spent)
//! ```
//!
//! Every pass through `Selecting` re-reads the registry, so a node evicted
//! earlier in the same request is never picked again unless a refresh has
//! brought it back.

use std::net::IpAddr;
use std::sync::Arc;

use axum::response::Response;
use balance_core::Node;
use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use rand::seq::IndexedRandom;
use tracing::{debug, info, warn};

use super::forward::{into_client_response, upstream_headers, upstream_url};
use crate::config::ProxyConfig;
use crate::error::ProxyError;
use crate::registry::{RegistryRefresher, RegistryStore};

/// An inbound request, with its body already buffered so it can be replayed
/// against another node after a failure.
#[derive(Debug, Clone)]
pub struct ProxyRequest {
    pub method: Method,
    pub uri: Uri,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// Address of the client's socket, injected as `X-Forwarded-For`.
    pub client_addr: Option<IpAddr>,
}

/// Why one forwarding attempt failed.
#[derive(Debug)]
enum UpstreamFailure {
    /// The node did not produce response headers in time. Not evicted.
    Timeout,
    /// Connect refused, reset, or any other transport-level failure.
    Transport(reqwest::Error),
}

enum Step {
    Selecting,
    Forwarding(Node),
    Retrying,
}

/// Per-request bookkeeping. Never shared across requests.
#[derive(Debug)]
struct ProxyAttempt {
    remaining: u32,
    attempts: u32,
}

/// Routes client requests to randomly chosen registry nodes.
pub struct ProxyDispatcher {
    store: Arc<RegistryStore>,
    refresher: Arc<RegistryRefresher>,
    client: reqwest::Client,
    config: Arc<ProxyConfig>,
}

impl ProxyDispatcher {
    /// Creates a dispatcher reading nodes from the refresher's store.
    ///
    /// # Errors
    ///
    /// Returns an error if the upstream HTTP client cannot be constructed.
    pub fn new(refresher: Arc<RegistryRefresher>, config: Arc<ProxyConfig>) -> reqwest::Result<Self> {
        // Redirects are the client's business; ambient proxy settings do not
        // apply to node-internal traffic.
        let client = reqwest::Client::builder()
            .redirect(reqwest::redirect::Policy::none())
            .no_proxy()
            .build()?;

        Ok(Self {
            store: refresher.store(),
            refresher,
            client,
            config,
        })
    }

    #[must_use]
    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Runs the state machine for one request until it succeeds or fails.
    ///
    /// Exactly one outcome is produced: the streamed backend response, or a
    /// [`ProxyError`] to be rendered as the terminal response.
    ///
    /// # Errors
    ///
    /// - [`ProxyError::NoBackends`] if no node of the target type exists on
    ///   the first selection
    /// - [`ProxyError::UpstreamTimeout`] if the chosen node is too slow
    /// - [`ProxyError::AttemptFailed`] once the retry budget is spent, or the
    ///   pool empties after a failed attempt
    pub async fn dispatch(&self, request: &ProxyRequest) -> Result<Response, ProxyError> {
        let mut attempt = ProxyAttempt {
            remaining: self.config.retries.max(1),
            attempts: 0,
        };
        let mut step = Step::Selecting;

        loop {
            step = match step {
                Step::Selecting => {
                    let candidates = self.store.list(&self.config.target_type);
                    // The thread-local rng must not live across an await.
                    let chosen = candidates.choose(&mut rand::rng()).cloned();
                    match chosen {
                        Some(node) => Step::Forwarding(node),
                        None if attempt.attempts == 0 => {
                            debug!(target_type = %self.config.target_type, "No backends registered");
                            return Err(ProxyError::NoBackends);
                        }
                        None => {
                            warn!(attempts = attempt.attempts, "Backend pool emptied during retries");
                            return Err(ProxyError::AttemptFailed {
                                attempts: attempt.attempts,
                            });
                        }
                    }
                }
                Step::Forwarding(node) => {
                    attempt.attempts += 1;
                    metrics::counter!("balance_proxy_attempts_total").increment(1);
                    info!(
                        path = %request.uri,
                        address = %node.address,
                        attempt = attempt.attempts,
                        remaining = attempt.remaining,
                        "Proxying request"
                    );

                    match self.forward(request, &node).await {
                        Ok(response) => return Ok(response),
                        Err(UpstreamFailure::Timeout) => {
                            warn!(address = %node.address, "Backend timed out");
                            return Err(ProxyError::UpstreamTimeout);
                        }
                        Err(UpstreamFailure::Transport(err)) => {
                            warn!(address = %node.address, error = %err, "Backend unreachable, reporting unhealthy");
                            self.refresher.report_unhealthy(&node.address);
                            Step::Retrying
                        }
                    }
                }
                Step::Retrying => {
                    attempt.remaining = attempt.remaining.saturating_sub(1);
                    if attempt.remaining == 0 {
                        warn!(attempts = attempt.attempts, "Proxy retries exhausted");
                        return Err(ProxyError::AttemptFailed {
                            attempts: attempt.attempts,
                        });
                    }
                    // Give other tasks (including the refresh just scheduled)
                    // a turn before selecting again.
                    tokio::task::yield_now().await;
                    Step::Selecting
                }
            };
        }
    }

    /// Sends the request to `node` and waits for response headers.
    async fn forward(
        &self,
        request: &ProxyRequest,
        node: &Node,
    ) -> Result<Response, UpstreamFailure> {
        let url = upstream_url(&node.address, self.config.internal_port, &request.uri);
        let send = self
            .client
            .request(request.method.clone(), url)
            .headers(upstream_headers(&request.headers, request.client_addr))
            .body(request.body.clone())
            .send();

        let upstream = match tokio::time::timeout(self.config.upstream_timeout, send).await {
            Err(_elapsed) => return Err(UpstreamFailure::Timeout),
            Ok(Err(err)) if err.is_timeout() => return Err(UpstreamFailure::Timeout),
            Ok(Err(err)) => return Err(UpstreamFailure::Transport(err)),
            Ok(Ok(upstream)) => upstream,
        };

        debug!(address = %node.address, status = upstream.status().as_u16(), "Backend responded");
        Ok(into_client_response(upstream, &node.address))
    }
}

impl std::fmt::Debug for ProxyDispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProxyDispatcher")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
