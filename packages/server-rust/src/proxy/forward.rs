//! Request and response rewriting between the client and a backend node.
//!
//! Headers pass through verbatim except for connection-scoped (hop-by-hop)
//! headers, which describe one TCP hop and are re-derived by each side, and
//! the two headers the proxy injects: `X-Forwarded-For` and `Date`.

use std::net::IpAddr;

use axum::body::Body;
use axum::response::Response;
use futures_util::TryStreamExt;
use http::header::{HeaderName, CONNECTION, CONTENT_LENGTH, DATE, TE, TRAILER, TRANSFER_ENCODING, UPGRADE};
use http::uri::PathAndQuery;
use http::{HeaderMap, HeaderValue, Uri};
use tracing::warn;

/// IMF-fixdate, e.g. `Sun, 06 Nov 1994 08:49:37 GMT`.
const HTTP_DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

const X_FORWARDED_FOR: HeaderName = HeaderName::from_static("x-forwarded-for");

fn is_hop_by_hop(name: &HeaderName) -> bool {
    name == CONNECTION
        || name == TE
        || name == TRAILER
        || name == TRANSFER_ENCODING
        || name == UPGRADE
        || name.as_str() == "keep-alive"
        || name.as_str() == "proxy-connection"
}

/// Removes hop-by-hop headers, including any listed in `Connection`.
pub fn strip_hop_by_hop(headers: &mut HeaderMap) {
    let listed: Vec<HeaderName> = headers
        .get_all(CONNECTION)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(','))
        .filter_map(|name| HeaderName::from_bytes(name.trim().as_bytes()).ok())
        .collect();

    for name in listed {
        headers.remove(name);
    }

    let hop: Vec<HeaderName> = headers.keys().filter(|n| is_hop_by_hop(n)).cloned().collect();
    for name in hop {
        headers.remove(name);
    }
}

/// Current time formatted for the `Date` header.
#[must_use]
pub fn http_date_now() -> String {
    chrono::Utc::now().format(HTTP_DATE_FORMAT).to_string()
}

/// Builds the header set sent to the backend.
///
/// `Content-Length` is dropped because the buffered body re-derives it.
/// `X-Forwarded-For` carries the client's address, replacing any value the
/// client sent; `Date` is stamped with the proxy's clock.
#[must_use]
pub fn upstream_headers(client_headers: &HeaderMap, client_addr: Option<IpAddr>) -> HeaderMap {
    let mut headers = client_headers.clone();
    strip_hop_by_hop(&mut headers);
    headers.remove(CONTENT_LENGTH);

    if let Some(ip) = client_addr {
        if let Ok(value) = HeaderValue::from_str(&ip.to_string()) {
            headers.insert(X_FORWARDED_FOR, value);
        }
    }
    if let Ok(value) = HeaderValue::from_str(&http_date_now()) {
        headers.insert(DATE, value);
    }

    headers
}

/// Backend URL for `address` on the fixed internal port, keeping the
/// client's path and query exactly as received.
#[must_use]
pub fn upstream_url(address: &str, internal_port: u16, uri: &Uri) -> String {
    let address = address.trim();
    let host = if address.contains(':') && !address.starts_with('[') {
        format!("[{address}]")
    } else {
        address.to_string()
    };
    let path = uri.path_and_query().map_or("/", PathAndQuery::as_str);
    format!("http://{host}:{internal_port}{path}")
}

/// Turns a backend response into the client response, streaming the body
/// through chunk by chunk.
///
/// Dropping the returned response (e.g. the client hung up) drops the
/// upstream body and with it the backend connection.
#[must_use]
pub fn into_client_response(upstream: reqwest::Response, address: &str) -> Response {
    let status = upstream.status();
    let mut headers = upstream.headers().clone();
    strip_hop_by_hop(&mut headers);

    let address = address.to_string();
    let stream = upstream.bytes_stream().inspect_err(move |err| {
        warn!(%address, error = %err, "Backend response stream broke mid-body");
    });

    let mut response = Response::new(Body::from_stream(stream));
    *response.status_mut() = status;
    *response.headers_mut() = headers;
    response
}
