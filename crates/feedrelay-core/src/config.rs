//! Configuration types for the relay
//!
//! Configuration is supplied once at startup and never changes afterwards.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Default public IP lookup endpoint
pub const DEFAULT_MY_IP_URL: &str = "https://www.adsbhub.org/getmyip.php";

/// Default server key issuance endpoint
pub const DEFAULT_KEY_URL: &str = "https://www.adsbhub.org/key.php";

/// Default IP update endpoint
pub const DEFAULT_UPDATE_URL: &str = "https://www.adsbhub.org/updateip.php";

/// Main relay configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Local source of line-delimited messages
    #[serde(default = "default_source")]
    pub source: Endpoint,

    /// Remote sink the messages are forwarded to
    #[serde(default = "default_sink")]
    pub sink: Endpoint,

    /// IP registration settings
    pub registration: RegistrationConfig,

    /// Optional engine settings
    #[serde(default)]
    pub engine: EngineConfig,
}

impl RelayConfig {
    /// Create a configuration with default endpoints for the given client key
    pub fn new(client_key: impl Into<String>) -> Self {
        Self {
            source: default_source(),
            sink: default_sink(),
            registration: RegistrationConfig::new(client_key),
            engine: EngineConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.source.validate("source")?;
        self.sink.validate("sink")?;
        self.registration.validate()?;
        self.engine.validate()?;
        Ok(())
    }
}

/// A TCP peer address
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Hostname or IP literal
    pub host: String,
    /// TCP port
    pub port: u16,
}

impl Endpoint {
    /// Create a new endpoint
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }

    fn validate(&self, what: &str) -> Result<(), crate::Error> {
        if self.host.is_empty() {
            return Err(crate::Error::config(format!("{} host cannot be empty", what)));
        }
        if self.port == 0 {
            return Err(crate::Error::config(format!("{} port must be > 0", what)));
        }
        Ok(())
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

/// IP registration configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct RegistrationConfig {
    /// Station client key used to derive the session digest
    /// ⚠️ NEVER log this value
    pub client_key: String,

    /// Endpoint returning the caller's public IP as the raw body
    #[serde(default = "default_my_ip_url")]
    pub my_ip_url: String,

    /// Endpoint returning a fresh server key as the raw body
    #[serde(default = "default_key_url")]
    pub key_url: String,

    /// Endpoint accepting `sessid`, `myip` and `myip6` query parameters
    #[serde(default = "default_update_url")]
    pub update_url: String,
}

impl RegistrationConfig {
    /// Create a registration config pointing at the default endpoints
    pub fn new(client_key: impl Into<String>) -> Self {
        Self {
            client_key: client_key.into(),
            my_ip_url: default_my_ip_url(),
            key_url: default_key_url(),
            update_url: default_update_url(),
        }
    }

    /// Validate the registration configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.client_key.is_empty() {
            return Err(crate::Error::config("Client key cannot be empty"));
        }
        for (name, url) in [
            ("my_ip_url", &self.my_ip_url),
            ("key_url", &self.key_url),
            ("update_url", &self.update_url),
        ] {
            if !url.starts_with("https://") && !url.starts_with("http://") {
                return Err(crate::Error::config(format!(
                    "{} must use HTTP or HTTPS scheme. Got: {}",
                    name, url
                )));
            }
        }
        Ok(())
    }
}

// Custom Debug implementation that hides the client key
impl fmt::Debug for RegistrationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RegistrationConfig")
            .field("client_key", &"<REDACTED>")
            .field("my_ip_url", &self.my_ip_url)
            .field("key_url", &self.key_url)
            .field("update_url", &self.update_url)
            .finish()
    }
}

/// Engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Capacity of the message queue between receiver and sender
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,

    /// Fixed delay between connection attempts (in seconds)
    ///
    /// Applies to every failure type: registration, dial and stream errors.
    #[serde(default = "default_retry_delay_secs")]
    pub retry_delay_secs: u64,

    /// Capacity of the relay event channel
    ///
    /// When full, new events are dropped (with a warning log).
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
}

impl EngineConfig {
    /// Retry delay as a [`Duration`]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_secs(self.retry_delay_secs)
    }

    fn validate(&self) -> Result<(), crate::Error> {
        if self.queue_capacity == 0 {
            return Err(crate::Error::config("Queue capacity must be > 0"));
        }
        if self.event_channel_capacity == 0 {
            return Err(crate::Error::config("Event channel capacity must be > 0"));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            retry_delay_secs: default_retry_delay_secs(),
            event_channel_capacity: default_event_channel_capacity(),
        }
    }
}

fn default_source() -> Endpoint {
    Endpoint::new("localhost", 30003)
}

fn default_sink() -> Endpoint {
    Endpoint::new("data.adsbhub.org", 5001)
}

fn default_my_ip_url() -> String {
    DEFAULT_MY_IP_URL.to_string()
}

fn default_key_url() -> String {
    DEFAULT_KEY_URL.to_string()
}

fn default_update_url() -> String {
    DEFAULT_UPDATE_URL.to_string()
}

fn default_queue_capacity() -> usize {
    100
}

fn default_retry_delay_secs() -> u64 {
    10
}

fn default_event_channel_capacity() -> usize {
    1000
}
