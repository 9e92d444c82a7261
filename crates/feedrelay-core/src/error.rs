//! Error types for the relay
//!
//! Every variant is recoverable from the relay's point of view: loops log the
//! error and either retry after the fixed delay or skip the registration cycle.

use thiserror::Error;

/// Result type alias for relay operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the relay
#[derive(Error, Debug)]
pub enum Error {
    /// Dialing a peer failed
    #[error("Could not connect to {endpoint}: {reason}")]
    Connect {
        /// The `host:port` that was dialed
        endpoint: String,
        /// Underlying failure
        reason: String,
    },

    /// Read, write or flush failed on an established connection
    #[error("Stream error: {0}")]
    Stream(String),

    /// One of the IP registration HTTP calls failed
    #[error("IP registration transport error: {0}")]
    RegistrationTransport(String),

    /// The update endpoint did not echo the session digest
    #[error("IP registration rejected for {ip}")]
    RegistrationRejected {
        /// The IP that was submitted
        ip: String,
    },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// The message queue can no longer accept or hand out messages
    #[error("Message queue closed")]
    QueueClosed,
}

impl Error {
    /// Create a connect error
    pub fn connect(endpoint: impl ToString, reason: impl ToString) -> Self {
        Self::Connect {
            endpoint: endpoint.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a stream error
    pub fn stream(msg: impl Into<String>) -> Self {
        Self::Stream(msg.into())
    }

    /// Create a registration transport error
    pub fn registration_transport(msg: impl Into<String>) -> Self {
        Self::RegistrationTransport(msg.into())
    }

    /// Create a registration rejected error
    pub fn registration_rejected(ip: impl Into<String>) -> Self {
        Self::RegistrationRejected { ip: ip.into() }
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether this error came from the IP registration exchange
    pub fn is_registration(&self) -> bool {
        matches!(
            self,
            Self::RegistrationTransport(_) | Self::RegistrationRejected { .. }
        )
    }
}
