//! Relay events for external monitoring
//!
//! Loops report what they do through a bounded channel. Events are advisory:
//! a full channel drops the event with a warning instead of stalling a loop.

use std::fmt;

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::warn;

/// Which relay loop an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Source-side loop
    Receiver,
    /// Sink-side loop
    Sender,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Receiver => f.write_str("receiver"),
            Role::Sender => f.write_str("sender"),
        }
    }
}

/// Events emitted by the relay loops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayEvent {
    /// Public IP unchanged, registration skipped
    RegistrationSkipped {
        ip: String,
    },

    /// A new public IP was registered
    RegistrationSucceeded {
        ip: String,
        previous_ip: String,
    },

    /// Registration failed; this connection attempt is skipped
    RegistrationFailed {
        error: String,
    },

    /// Dial started
    Connecting {
        role: Role,
        endpoint: String,
    },

    /// Dial succeeded
    Connected {
        role: Role,
        endpoint: String,
    },

    /// Dial failed
    DialFailed {
        role: Role,
        endpoint: String,
        error: String,
    },

    /// An established connection ended
    Disconnected {
        role: Role,
        endpoint: String,
        reason: String,
    },

    /// A write or flush failed and the message was requeued
    SendFailed {
        error: String,
    },
}

/// Cloneable handle for emitting [`RelayEvent`]s
#[derive(Debug, Clone)]
pub struct EventEmitter {
    tx: mpsc::Sender<RelayEvent>,
}

impl EventEmitter {
    /// Create an emitter and the receiving end of its channel
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<RelayEvent>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx }, rx)
    }

    /// Emit an event without waiting
    pub fn emit(&self, event: RelayEvent) {
        match self.tx.try_send(event) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                warn!("Event channel full, dropping event. Consider increasing event_channel_capacity.");
            }
            // Nobody is listening
            Err(TrySendError::Closed(_)) => {}
        }
    }
}
