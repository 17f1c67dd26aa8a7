use balance_core::ShapeError;

/// Errors from one fetch against the discovery source.
///
/// Contained within the refresher: they are logged and published as
/// `error` events, and the next scheduled tick retries.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("discovery source unreachable: {0}")]
    Unreachable(#[from] reqwest::Error),
    #[error("discovery source answered with status {0}")]
    Status(u16),
    #[error(transparent)]
    Malformed(#[from] ShapeError),
}

/// Terminal outcomes of a proxied request that did not succeed.
///
/// Each maps to exactly one fixed-body response; see
/// [`crate::proxy::response`].
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProxyError {
    /// No node of the requested type was registered when the request arrived.
    #[error("no backends available")]
    NoBackends,
    /// Every attempt hit a transport failure, or the pool emptied mid-retry.
    #[error("proxy attempt failed after {attempts} attempt(s)")]
    AttemptFailed { attempts: u32 },
    /// The chosen node accepted the request but did not answer in time.
    #[error("proxy request timed out")]
    UpstreamTimeout,
    /// The inbound request body could not be buffered for forwarding.
    #[error("request body could not be read")]
    RequestBody,
}
