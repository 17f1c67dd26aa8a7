//! Strict validation of discovery responses.
//!
//! The discovery source answers with a JSON array of `{name, type, address}`
//! records. Anything else is rejected as a whole: a response with one bad
//! record never reaches the registry, not even partially.

use serde::Deserialize;

use crate::node::Node;

/// Reasons a discovery response was rejected.
#[derive(Debug, thiserror::Error)]
pub enum ShapeError {
    /// Body was not JSON, not an array, or a record had missing or
    /// non-string fields.
    #[error("discovery response is not a list of node records: {0}")]
    Json(#[from] serde_json::Error),
    /// A record parsed but one of its identifying fields is blank.
    #[error("node record {index} has a blank `{field}`")]
    BlankField { index: usize, field: &'static str },
}

/// Wire shape of one record. Unknown keys are ignored; the three known keys
/// are mandatory strings.
#[derive(Deserialize)]
struct NodeRecord {
    name: String,
    #[serde(rename = "type")]
    node_type: String,
    address: String,
}

/// Parses and validates a discovery response body.
///
/// # Errors
///
/// Returns [`ShapeError`] if the body is not a JSON array of node records,
/// or if any record has a blank `name` or `address`.
pub fn parse_node_list(body: &[u8]) -> Result<Vec<Node>, ShapeError> {
    let records: Vec<NodeRecord> = serde_json::from_slice(body)?;

    records
        .into_iter()
        .enumerate()
        .map(|(index, record)| {
            if record.name.trim().is_empty() {
                return Err(ShapeError::BlankField { index, field: "name" });
            }
            if record.address.trim().is_empty() {
                return Err(ShapeError::BlankField {
                    index,
                    field: "address",
                });
            }
            Ok(Node {
                name: record.name,
                node_type: record.node_type,
                address: record.address,
            })
        })
        .collect()
}
