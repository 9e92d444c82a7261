//! Receiver loop
//!
//! Keeps a connection to the local message source, registering the public IP
//! before every connection attempt.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────────────┐     ┌────────────────┐  ok  ┌────────────┐  ok  ┌───────────┐
//!   │ Disconnected │────►│ RegisteringIp  │─────►│ Connecting │─────►│ Streaming │
//!   └──────────────┘     └────────────────┘      └────────────┘      └───────────┘
//!          ▲                 │ failed               │ failed           │ read error
//!          └──── retry_delay ┴──────────────────────┴──────────────────┘
//! ```
//!
//! A registration failure skips the dial for that attempt. Every attempt, however
//! it ends, is followed by the same fixed delay.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Endpoint;
use crate::error::Error;
use crate::events::{EventEmitter, RelayEvent, Role};
use crate::queue::{Message, MessageQueue};
use crate::registrar::{IpRegistrar, RegistrationOutcome};
use crate::relay::{AttemptOutcome, DEFAULT_RETRY_DELAY};
use crate::state::RegistrationState;
use crate::traits::{Connection, Dialer, RelayMetrics};

/// Receiver loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverState {
    Disconnected,
    RegisteringIp,
    Connecting,
    Streaming,
}

impl fmt::Display for ReceiverState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ReceiverState::Disconnected => "disconnected",
            ReceiverState::RegisteringIp => "registering_ip",
            ReceiverState::Connecting => "connecting",
            ReceiverState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Reads messages from the source and enqueues them
pub struct Receiver {
    endpoint: Endpoint,
    dialer: Arc<dyn Dialer>,
    registrar: IpRegistrar,
    registration: RegistrationState,
    queue: Arc<MessageQueue>,
    metrics: Arc<dyn RelayMetrics>,
    events: EventEmitter,
    retry_delay: Duration,
    state: ReceiverState,
}

impl Receiver {
    /// Create a receiver for `endpoint`
    ///
    /// The retry delay defaults to [`DEFAULT_RETRY_DELAY`].
    pub fn new(
        endpoint: Endpoint,
        dialer: Arc<dyn Dialer>,
        registrar: IpRegistrar,
        registration: RegistrationState,
        queue: Arc<MessageQueue>,
        metrics: Arc<dyn RelayMetrics>,
        events: EventEmitter,
    ) -> Self {
        Self {
            endpoint,
            dialer,
            registrar,
            registration,
            queue,
            metrics,
            events,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: ReceiverState::Disconnected,
        }
    }

    /// Set the delay between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Current state
    pub fn state(&self) -> ReceiverState {
        self.state
    }

    /// Registration context owned by this loop
    pub fn registration(&self) -> &RegistrationState {
        &self.registration
    }

    /// Source endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run attempts forever, sleeping `retry_delay` after each one
    pub async fn run(&mut self) {
        loop {
            let outcome = self.run_attempt().await;
            debug!(
                "Receiver attempt ended ({:?}), retrying in {:?}",
                outcome, self.retry_delay
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Run one pass through the state machine
    pub async fn run_attempt(&mut self) -> AttemptOutcome {
        self.transition(ReceiverState::RegisteringIp);
        if let Err(e) = self.register_ip().await {
            warn!("IP registration failed, skipping receiver connection: {}", e);
            self.events.emit(RelayEvent::RegistrationFailed {
                error: e.to_string(),
            });
            self.transition(ReceiverState::Disconnected);
            return AttemptOutcome::RegistrationFailed;
        }

        self.transition(ReceiverState::Connecting);
        let endpoint = self.endpoint.to_string();
        info!("Trying to connect receiver to {}", endpoint);
        self.events.emit(RelayEvent::Connecting {
            role: Role::Receiver,
            endpoint: endpoint.clone(),
        });

        let mut conn = match self.dialer.dial(&self.endpoint).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Connection failed to receiver {}: {}", endpoint, e);
                self.events.emit(RelayEvent::DialFailed {
                    role: Role::Receiver,
                    endpoint,
                    error: e.to_string(),
                });
                self.transition(ReceiverState::Disconnected);
                return AttemptOutcome::DialFailed;
            }
        };

        info!("Connected receiver to {}", endpoint);
        self.events.emit(RelayEvent::Connected {
            role: Role::Receiver,
            endpoint: endpoint.clone(),
        });
        self.transition(ReceiverState::Streaming);

        let reason = self.stream(&mut conn).await;
        conn.close().await;

        warn!("Receiver disconnected from {}: {}", endpoint, reason);
        self.events.emit(RelayEvent::Disconnected {
            role: Role::Receiver,
            endpoint,
            reason: reason.to_string(),
        });
        self.transition(ReceiverState::Disconnected);
        AttemptOutcome::StreamEnded
    }

    async fn register_ip(&mut self) -> crate::Result<()> {
        match self.registrar.register(&mut self.registration).await? {
            RegistrationOutcome::Unchanged { ip } => {
                self.events.emit(RelayEvent::RegistrationSkipped { ip });
            }
            RegistrationOutcome::Registered { ip, previous_ip } => {
                self.events
                    .emit(RelayEvent::RegistrationSucceeded { ip, previous_ip });
            }
        }
        Ok(())
    }

    /// Read lines until the connection fails, returning the failure
    async fn stream(&self, conn: &mut Connection) -> Error {
        loop {
            let line = match conn.reader.read_line().await {
                Ok(line) => line,
                Err(e) => return e,
            };

            let message = Message::from_line(&line);
            if message.is_empty() {
                debug!("Discarding empty line from {}", self.endpoint);
                continue;
            }

            // Blocks while the queue is full
            if let Err(e) = self.queue.enqueue(message).await {
                return e;
            }
            self.metrics.message_received();
        }
    }

    fn transition(&mut self, next: ReceiverState) {
        debug!("Receiver {} -> {}", self.state, next);
        self.state = next;
    }
}
