//! Axum entry point for the public listener.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{ConnectInfo, Request, State};
use axum::response::{IntoResponse, Response};
use tracing::debug;

use super::dispatcher::{ProxyDispatcher, ProxyRequest};
use crate::error::ProxyError;
use crate::network::ShutdownController;

/// State for the proxy fallback handler.
#[derive(Clone)]
pub struct ProxyState {
    pub dispatcher: Arc<ProxyDispatcher>,
    pub shutdown: Arc<ShutdownController>,
}

/// Proxies any method and path to a backend node.
///
/// The body is buffered up front so a failed attempt can be replayed
/// against the next node. The request counts as in flight until the
/// response headers are produced.
pub async fn proxy_handler(
    State(state): State<ProxyState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    request: Request,
) -> Response {
    let _in_flight = state.shutdown.in_flight_guard();
    let (parts, body) = request.into_parts();

    let limit = state.dispatcher.config().max_request_body_bytes;
    let result = match axum::body::to_bytes(body, limit).await {
        Ok(body) => {
            let request = ProxyRequest {
                method: parts.method,
                uri: parts.uri,
                headers: parts.headers,
                body,
                client_addr: Some(peer.ip()),
            };
            state.dispatcher.dispatch(&request).await
        }
        Err(err) => {
            debug!(client = %peer, error = %err, "Failed to buffer request body");
            Err(ProxyError::RequestBody)
        }
    };

    match result {
        Ok(response) => {
            metrics::counter!("balance_proxy_requests_total", "outcome" => "proxied").increment(1);
            response
        }
        Err(err) => {
            metrics::counter!("balance_proxy_requests_total", "outcome" => err.outcome()).increment(1);
            err.into_response()
        }
    }
}
