// # HTTP Fetcher
//
// This crate provides the reqwest-backed `HttpFetcher` used by the IP registrar.
//
// ## Behavior
//
// - One GET per call, no retries (a failed call aborts the registration cycle)
// - Query values are percent-encoded
// - Non-2xx statuses are failures, so an error page is never taken as a body
// - No request timeout unless one is asked for with `with_timeout`
// - The body is returned verbatim; callers decide whether to trim it

use async_trait::async_trait;
use feedrelay_core::traits::HttpFetcher;
use feedrelay_core::{Error, Result};
use std::time::Duration;

/// HTTPS GET client for the registration endpoints
#[derive(Debug, Clone)]
pub struct ReqwestFetcher {
    client: reqwest::Client,
}

impl ReqwestFetcher {
    /// Create a fetcher relying on the transport's own timeouts
    pub fn new() -> Result<Self> {
        Self::build(reqwest::Client::builder())
    }

    /// Create a fetcher whose requests time out after `timeout`
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        Self::build(reqwest::Client::builder().timeout(timeout))
    }

    fn build(builder: reqwest::ClientBuilder) -> Result<Self> {
        let client = builder
            .build()
            .map_err(|e| Error::config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpFetcher for ReqwestFetcher {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        tracing::debug!("GET {}", url);

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| Error::registration_transport(format!("Request to {} failed: {}", url, e)))?;

        if !response.status().is_success() {
            return Err(Error::registration_transport(format!(
                "HTTP error from {}: {}",
                url,
                response.status()
            )));
        }

        response.text().await.map_err(|e| {
            Error::registration_transport(format!("Failed to read response from {}: {}", url, e))
        })
    }
}
