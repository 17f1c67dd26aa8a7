//! Tower layer stacks for the two listeners.
//!
//! The proxy listener only traces: any layer that rewrites headers or
//! bodies would break verbatim pass-through. The admin listener also gets
//! an `X-Request-Id`, generated on the way in and echoed on the way out.

use axum::http::header::HeaderName;
use tower::ServiceBuilder;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

type HttpTrace = TraceLayer<SharedClassifier<ServerErrorsAsFailures>>;

/// Layers applied to the admin router, outermost first.
type AdminLayers = tower::layer::util::Stack<
    PropagateRequestIdLayer,
    tower::layer::util::Stack<
        HttpTrace,
        tower::layer::util::Stack<SetRequestIdLayer<MakeRequestUuid>, tower::layer::util::Identity>,
    >,
>;

/// Request tracing for proxied traffic.
#[must_use]
pub fn build_proxy_layers() -> HttpTrace {
    TraceLayer::new_for_http()
}

/// Admin stack:
/// 1. `SetRequestId` assigns a UUID v4 `X-Request-Id`
/// 2. `Tracing` opens a span per request
/// 3. `PropagateRequestId` copies the id onto the response
#[must_use]
pub fn build_admin_layers() -> AdminLayers {
    let x_request_id = HeaderName::from_static("x-request-id");

    ServiceBuilder::new()
        .layer(SetRequestIdLayer::new(x_request_id.clone(), MakeRequestUuid))
        .layer(TraceLayer::new_for_http())
        .layer(PropagateRequestIdLayer::new(x_request_id))
        .into_inner()
}
