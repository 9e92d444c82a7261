// # Registration State
//
// In-memory record of the last successfully registered public IP.
//
// ## Ownership
//
// The state is an explicit context object owned by the receiver loop, which is
// its only writer. The registrar borrows it mutably for the duration of one
// registration cycle, so no lock is needed.
//
// ## Crash Behavior
//
// - Nothing is persisted; the state starts over on every process start
// - The first cycle after a restart always performs a full registration

use chrono::{DateTime, Utc};
use md5::{Digest, Md5};
use std::fmt;

/// IP reported before any registration has succeeded
pub const UNREGISTERED_IP: &str = "0.0.0.0";

/// Station client key
///
/// The `Debug` implementation intentionally does NOT expose the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ClientCredential(String);

impl ClientCredential {
    /// Wrap a client key
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    /// Session digest: lowercase hex MD5 of the key
    pub fn session_digest(&self) -> String {
        md5_hex(&self.0)
    }
}

impl fmt::Debug for ClientCredential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ClientCredential(<REDACTED>)")
    }
}

/// Registration context for one client identity
#[derive(Debug, Clone)]
pub struct RegistrationState {
    credential: ClientCredential,
    last_known_ip: String,
    registered_at: Option<DateTime<Utc>>,
}

impl RegistrationState {
    /// Create an unregistered state for the given credential
    pub fn new(credential: ClientCredential) -> Self {
        Self::with_last_known_ip(credential, UNREGISTERED_IP)
    }

    /// Create a state that already considers `ip` registered
    pub fn with_last_known_ip(credential: ClientCredential, ip: impl Into<String>) -> Self {
        Self {
            credential,
            last_known_ip: ip.into(),
            registered_at: None,
        }
    }

    /// The credential registrations are made under
    pub fn credential(&self) -> &ClientCredential {
        &self.credential
    }

    /// The IP last successfully registered
    pub fn last_known_ip(&self) -> &str {
        &self.last_known_ip
    }

    /// When the last registration succeeded, if any did in this process
    pub fn registered_at(&self) -> Option<DateTime<Utc>> {
        self.registered_at
    }

    /// Record a successful registration, returning the previous IP
    pub(crate) fn record_registration(&mut self, ip: impl Into<String>) -> String {
        self.registered_at = Some(Utc::now());
        std::mem::replace(&mut self.last_known_ip, ip.into())
    }
}

/// Lowercase hex MD5 of `data`
pub fn md5_hex(data: &str) -> String {
    hex::encode(Md5::digest(data.as_bytes()))
}
