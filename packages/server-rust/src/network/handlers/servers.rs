//! Registry listing, in the same JSON shape the discovery source serves.

use axum::extract::{Path, State};
use axum::Json;
use balance_core::Node;

use super::AdminState;

/// `GET /servers`: every registered node.
pub async fn list_servers_handler(State(state): State<AdminState>) -> Json<Vec<Node>> {
    Json(state.store.list(""))
}

/// `GET /servers/{node_type}`: nodes whose type matches, ignoring case and
/// surrounding whitespace.
pub async fn list_servers_by_type_handler(
    State(state): State<AdminState>,
    Path(node_type): Path<String>,
) -> Json<Vec<Node>> {
    Json(state.store.list(&node_type))
}
