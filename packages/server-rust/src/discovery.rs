//! HTTP client for the local directory service.

use async_trait::async_trait;
use bytes::Bytes;
use tracing::debug;

use crate::config::DiscoveryConfig;
use crate::error::DiscoveryError;
use crate::traits::DiscoverySource;

/// Fetches node lists with `GET http://{host}:{port}/servers/{type}`.
#[derive(Debug, Clone)]
pub struct HttpDiscoverySource {
    client: reqwest::Client,
    base_url: String,
}

impl HttpDiscoverySource {
    /// Builds a source for the configured directory service.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed (e.g. the
    /// TLS backend fails to initialize).
    pub fn new(config: &DiscoveryConfig) -> Result<Self, DiscoveryError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .no_proxy()
            .build()?;

        Ok(Self {
            client,
            base_url: format!("http://{}:{}", config.host, config.port),
        })
    }

    /// URL requested for the given filter. The filter is normalized the
    /// same way the registry compares types.
    #[must_use]
    pub fn url_for(&self, type_filter: &str) -> String {
        format!(
            "{}/servers/{}",
            self.base_url,
            balance_core::normalize(type_filter)
        )
    }
}

#[async_trait]
impl DiscoverySource for HttpDiscoverySource {
    async fn fetch(&self, type_filter: &str) -> Result<Bytes, DiscoveryError> {
        let url = self.url_for(type_filter);
        debug!(%url, "Fetching node list");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(DiscoveryError::Status(status.as_u16()));
        }

        Ok(response.bytes().await?)
    }
}
