//! IP registrar
//!
//! Registers the caller's current public IP with the remote authority using a
//! challenge-response exchange authenticated by the station client key.
//!
//! ## Exchange
//!
//! ```text
//! 1. GET my_ip_url                         -> ip
//! 2. ip == last_known_ip?                  -> done, no further calls
//! 3. session  = md5_hex(client_key)
//! 4. GET key_url                           -> server_key
//! 5. response = md5_hex(session + server_key)
//! 6. GET update_url?sessid=response+server_key&myip=ip&myip6=::
//! 7. body == response + server_key?        -> last_known_ip = ip
//! ```
//!
//! Every call is made once; any failure aborts the whole cycle and leaves the
//! registration state untouched.

use tracing::{debug, info, warn};

use crate::config::RegistrationConfig;
use crate::error::{Error, Result};
use crate::state::{RegistrationState, md5_hex};
use crate::traits::HttpFetcher;

/// Placeholder submitted in the `myip6` field
pub const IPV6_PLACEHOLDER: &str = "::";

/// Result of one registration cycle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// The public IP matches the registered one; nothing was submitted
    Unchanged {
        /// The current public IP
        ip: String,
    },
    /// A new IP was submitted and acknowledged
    Registered {
        /// The newly registered IP
        ip: String,
        /// The IP registered before this cycle
        previous_ip: String,
    },
}

/// Performs the IP registration exchange
pub struct IpRegistrar {
    fetcher: Box<dyn HttpFetcher>,
    config: RegistrationConfig,
}

impl IpRegistrar {
    /// Create a registrar using `fetcher` against the configured endpoints
    pub fn new(fetcher: Box<dyn HttpFetcher>, config: RegistrationConfig) -> Self {
        Self { fetcher, config }
    }

    /// Run one registration cycle against `state`
    ///
    /// `state` is only modified when the update endpoint acknowledges the new IP.
    pub async fn register(&self, state: &mut RegistrationState) -> Result<RegistrationOutcome> {
        let ip = self.fetch_public_ip().await?;

        if ip == state.last_known_ip() {
            debug!("Public IP {} already registered", ip);
            return Ok(RegistrationOutcome::Unchanged { ip });
        }

        info!(
            "IP is different current ip: {} old ip: {}",
            ip,
            state.last_known_ip()
        );

        let session_digest = state.credential().session_digest();
        let server_key = self.fetch(&self.config.key_url, &[]).await?;

        let response_digest = md5_hex(&format!("{}{}", session_digest, server_key));
        let sessid = format!("{}{}", response_digest, server_key);

        let body = self
            .fetch(
                &self.config.update_url,
                &[
                    ("sessid", sessid.as_str()),
                    ("myip", ip.as_str()),
                    ("myip6", IPV6_PLACEHOLDER),
                ],
            )
            .await?;

        if body != sessid {
            warn!("IP update for {} was not acknowledged", ip);
            return Err(Error::registration_rejected(ip));
        }

        let previous_ip = state.record_registration(ip.clone());
        info!("Successfully updated ip: {}", ip);

        Ok(RegistrationOutcome::Registered { ip, previous_ip })
    }

    async fn fetch_public_ip(&self) -> Result<String> {
        let body = self.fetch(&self.config.my_ip_url, &[]).await?;
        let ip = body.trim();
        if ip.is_empty() {
            return Err(Error::registration_transport(format!(
                "Empty IP returned by {}",
                self.config.my_ip_url
            )));
        }
        Ok(ip.to_string())
    }

    async fn fetch(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.fetcher.get(url, query).await.map_err(|e| match e {
            Error::RegistrationTransport(_) => e,
            other => Error::registration_transport(other.to_string()),
        })
    }
}
