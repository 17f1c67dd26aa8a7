use async_trait::async_trait;
use bytes::Bytes;

use crate::error::DiscoveryError;

/// Source of truth for which backend nodes exist.
///
/// Implementations: HTTP against the local directory service
/// ([`crate::discovery::HttpDiscoverySource`]), in-memory (tests).
#[async_trait]
pub trait DiscoverySource: Send + Sync {
    /// Fetches the raw node list, optionally restricted to one node type.
    ///
    /// An empty `type_filter` asks for every node. The body is validated by
    /// the caller, not by the source.
    async fn fetch(&self, type_filter: &str) -> Result<Bytes, DiscoveryError>;
}
