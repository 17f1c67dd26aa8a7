//! Backend node records as reported by the discovery source.
//!
//! Identity and address comparisons always go through [`normalize`], so a
//! node reported as `" API-1 "` and one reported as `"api-1"` are the same
//! node everywhere in the registry.

use serde::{Deserialize, Serialize};

/// Normalizes a name, type tag, or address for comparison.
///
/// Trims surrounding whitespace and lowercases. Stored values keep the
/// spelling the discovery source used; only comparisons are normalized.
#[must_use]
pub fn normalize(value: &str) -> String {
    value.trim().to_lowercase()
}

/// A discovered backend eligible to receive proxied requests.
///
/// Serializes to the same `{name, type, address}` shape the discovery
/// source produces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Node {
    /// Unique stable identifier within the registry.
    pub name: String,
    /// Category tag used to filter candidate pools (e.g. `"api"`).
    #[serde(rename = "type")]
    pub node_type: String,
    /// Host or IP used to connect. Never carries a port.
    pub address: String,
}

impl Node {
    pub fn new(
        name: impl Into<String>,
        node_type: impl Into<String>,
        address: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            node_type: node_type.into(),
            address: address.into(),
        }
    }

    /// Identity key used for uniqueness and change detection.
    #[must_use]
    pub fn normalized_name(&self) -> String {
        normalize(&self.name)
    }

    #[must_use]
    pub fn normalized_address(&self) -> String {
        normalize(&self.address)
    }

    /// Returns `true` if this node belongs to the given type filter.
    ///
    /// An empty (or all-whitespace) filter matches every node.
    #[must_use]
    pub fn is_type(&self, filter: &str) -> bool {
        let filter = normalize(filter);
        filter.is_empty() || normalize(&self.node_type) == filter
    }
}
