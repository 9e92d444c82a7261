//! HTTP fetcher trait used by the IP registrar

use async_trait::async_trait;

use crate::error::Result;

/// Trait for HTTP GET implementations
///
/// Implementations perform exactly one request per call and never retry.
/// A failed call aborts the registration cycle it belongs to.
#[async_trait]
pub trait HttpFetcher: Send + Sync {
    /// GET `url` with the given query pairs and return the raw response body
    ///
    /// Query values are percent-encoded by the implementation.
    ///
    /// # Returns
    ///
    /// - `Ok(String)`: Body of a successful (2xx) response
    /// - `Err(Error::RegistrationTransport)`: Request, status or body failure
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String>;
}
