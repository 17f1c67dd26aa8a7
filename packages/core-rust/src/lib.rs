//! Balance Core: backend node model, discovery response schema, and
//! registry change events.

pub mod events;
pub mod node;
pub mod schema;

pub use events::{ChangeSummary, EventKind, RegistryEvent};
pub use node::{normalize, Node};
pub use schema::{parse_node_list, ShapeError};
