//! Registry change summaries and the events published from them.

use std::fmt;
use std::sync::Arc;

use crate::node::Node;

/// Outcome of replacing the registry's node set.
///
/// `changed` only detects additions and count deltas. A node that keeps its
/// name but moves to a new address or type, with the count unchanged, is
/// applied to the registry without being reported as a change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Nodes whose normalized name was absent before the replace.
    pub added: Vec<Node>,
    /// `true` if the node count differs or anything was added.
    pub changed: bool,
    /// The full node set after the replace.
    pub servers: Arc<Vec<Node>>,
}

impl ChangeSummary {
    /// Events to publish for this summary, in delivery order.
    ///
    /// `ServersAdded` always precedes `ServerChange` for the same refresh.
    #[must_use]
    pub fn events(&self) -> Vec<RegistryEvent> {
        let mut events = Vec::with_capacity(2);
        if !self.added.is_empty() {
            events.push(RegistryEvent::ServersAdded(self.added.clone()));
        }
        if self.changed {
            events.push(RegistryEvent::ServerChange(Arc::clone(&self.servers)));
        }
        events
    }
}

/// Kinds of registry events a subscriber can filter on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    ServerChange,
    ServersAdded,
    Error,
}

impl EventKind {
    /// Wire name used when events are exposed to external consumers.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::ServerChange => "serverchange",
            Self::ServersAdded => "serversadded",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Topology change notifications emitted by the registry refresher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistryEvent {
    /// The node set changed; carries the full list after the change.
    ServerChange(Arc<Vec<Node>>),
    /// New nodes appeared; carries only the additions.
    ServersAdded(Vec<Node>),
    /// A refresh failed. The registry was left untouched.
    Error(String),
}

impl RegistryEvent {
    #[must_use]
    pub fn kind(&self) -> EventKind {
        match self {
            Self::ServerChange(_) => EventKind::ServerChange,
            Self::ServersAdded(_) => EventKind::ServersAdded,
            Self::Error(_) => EventKind::Error,
        }
    }
}
