//! Fixed terminal responses for failed proxy requests.
//!
//! Clients and tooling match on these exact bodies, so they never change
//! and always carry a matching `Content-Length`.

use axum::body::Body;
use axum::response::{IntoResponse, Response};
use http::header::{CONNECTION, CONTENT_LENGTH, CONTENT_TYPE};
use http::{HeaderValue, StatusCode};

use crate::error::ProxyError;

/// Body for 502: no node of the target type is registered.
pub const NO_BACKENDS_BODY: &str = "No API servers are available, are there any nodes running?";
/// Body for 500: every attempt failed at the transport level.
pub const ATTEMPT_FAILED_BODY: &str = "Reverse API server proxy request failed";
/// Body for 504: the chosen node did not answer in time.
pub const TIMEOUT_BODY: &str = "Proxy request timed out";
/// Body for 400: the inbound request body could not be buffered.
pub const REQUEST_BODY_BODY: &str = "Request body could not be read";

impl ProxyError {
    #[must_use]
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NoBackends => StatusCode::BAD_GATEWAY,
            Self::AttemptFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            Self::UpstreamTimeout => StatusCode::GATEWAY_TIMEOUT,
            Self::RequestBody => StatusCode::BAD_REQUEST,
        }
    }

    #[must_use]
    pub fn body(&self) -> &'static str {
        match self {
            Self::NoBackends => NO_BACKENDS_BODY,
            Self::AttemptFailed { .. } => ATTEMPT_FAILED_BODY,
            Self::UpstreamTimeout => TIMEOUT_BODY,
            Self::RequestBody => REQUEST_BODY_BODY,
        }
    }

    /// Label used for the outcome metric.
    #[must_use]
    pub fn outcome(&self) -> &'static str {
        match self {
            Self::NoBackends => "no_backends",
            Self::AttemptFailed { .. } => "attempt_failed",
            Self::UpstreamTimeout => "timeout",
            Self::RequestBody => "bad_request_body",
        }
    }
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        let body = self.body();
        let mut response = Response::new(Body::from(body));
        *response.status_mut() = self.status();
        let headers = response.headers_mut();
        headers.insert(CONTENT_LENGTH, HeaderValue::from(body.len()));
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("text/plain; charset=utf-8"),
        );
        // The backend may still be writing; do not reuse this connection.
        if self == Self::UpstreamTimeout {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }
        response
    }
}
