//! Sender loop
//!
//! Keeps a connection to the remote sink and forwards queued messages to it.
//!
//! ## State Machine
//!
//! ```text
//!   ┌──────────────┐     ┌────────────┐  ok  ┌───────────┐
//!   │ Disconnected │────►│ Connecting │─────►│ Streaming │
//!   └──────────────┘     └────────────┘      └───────────┘
//!          ▲                 │ failed          │ write/flush error
//!          └──── retry_delay ┴─────────────────┘ (message requeued)
//! ```
//!
//! ## Delivery Semantics
//!
//! A message is written and flushed as one unit. If either step fails the
//! message goes back to the **tail** of the queue and the connection is dropped.
//! This gives at-least-once delivery attempts, but the peer may already have
//! received the bytes of a failed message (duplicate on resend), and the
//! resent message is delivered after messages enqueued before the failure.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::config::Endpoint;
use crate::error::{Error, Result};
use crate::events::{EventEmitter, RelayEvent, Role};
use crate::queue::{Message, MessageQueue};
use crate::relay::{AttemptOutcome, DEFAULT_RETRY_DELAY};
use crate::traits::{Connection, Dialer, RelayMetrics};

/// Sender loop states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderState {
    Disconnected,
    Connecting,
    Streaming,
}

impl fmt::Display for SenderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SenderState::Disconnected => "disconnected",
            SenderState::Connecting => "connecting",
            SenderState::Streaming => "streaming",
        };
        f.write_str(name)
    }
}

/// Dequeues messages and writes them to the sink
pub struct Sender {
    endpoint: Endpoint,
    dialer: Arc<dyn Dialer>,
    queue: Arc<MessageQueue>,
    metrics: Arc<dyn RelayMetrics>,
    events: EventEmitter,
    retry_delay: Duration,
    state: SenderState,
}

impl Sender {
    /// Create a sender for `endpoint`
    pub fn new(
        endpoint: Endpoint,
        dialer: Arc<dyn Dialer>,
        queue: Arc<MessageQueue>,
        metrics: Arc<dyn RelayMetrics>,
        events: EventEmitter,
    ) -> Self {
        Self {
            endpoint,
            dialer,
            queue,
            metrics,
            events,
            retry_delay: DEFAULT_RETRY_DELAY,
            state: SenderState::Disconnected,
        }
    }

    /// Set the delay between attempts
    pub fn with_retry_delay(mut self, retry_delay: Duration) -> Self {
        self.retry_delay = retry_delay;
        self
    }

    /// Current state
    pub fn state(&self) -> SenderState {
        self.state
    }

    /// Sink endpoint
    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    /// Run attempts forever, sleeping `retry_delay` after each one
    pub async fn run(&mut self) {
        loop {
            let outcome = self.run_attempt().await;
            debug!(
                "Sender attempt ended ({:?}), retrying in {:?}",
                outcome, self.retry_delay
            );
            tokio::time::sleep(self.retry_delay).await;
        }
    }

    /// Run one pass through the state machine
    pub async fn run_attempt(&mut self) -> AttemptOutcome {
        self.transition(SenderState::Connecting);
        let endpoint = self.endpoint.to_string();
        info!("Trying to connect sender to {}", endpoint);
        self.events.emit(RelayEvent::Connecting {
            role: Role::Sender,
            endpoint: endpoint.clone(),
        });

        let mut conn = match self.dialer.dial(&self.endpoint).await {
            Ok(conn) => conn,
            Err(e) => {
                warn!("Could not connect sender to {}: {}", endpoint, e);
                self.events.emit(RelayEvent::DialFailed {
                    role: Role::Sender,
                    endpoint,
                    error: e.to_string(),
                });
                self.transition(SenderState::Disconnected);
                return AttemptOutcome::DialFailed;
            }
        };

        info!("Connected sender to {}", endpoint);
        self.events.emit(RelayEvent::Connected {
            role: Role::Sender,
            endpoint: endpoint.clone(),
        });
        self.transition(SenderState::Streaming);

        let reason = self.stream(&mut conn).await;
        conn.close().await;

        self.events.emit(RelayEvent::Disconnected {
            role: Role::Sender,
            endpoint,
            reason: reason.to_string(),
        });
        self.transition(SenderState::Disconnected);
        AttemptOutcome::StreamEnded
    }

    /// Forward messages until a write fails, returning the failure
    async fn stream(&self, conn: &mut Connection) -> Error {
        loop {
            let delivery = match self.queue.dequeue().await {
                Ok(delivery) => delivery,
                Err(e) => return e,
            };

            match deliver(conn, delivery.message()).await {
                Ok(()) => {
                    if !delivery.message().is_empty() {
                        self.metrics.message_sent();
                    }
                    delivery.complete();
                }
                Err(e) => {
                    delivery.requeue();
                    warn!("Could not send message! {}", e);
                    self.events.emit(RelayEvent::SendFailed {
                        error: e.to_string(),
                    });
                    return e;
                }
            }
        }
    }

    fn transition(&mut self, next: SenderState) {
        debug!("Sender {} -> {}", self.state, next);
        self.state = next;
    }
}

/// Write and flush one message
async fn deliver(conn: &mut Connection, message: &Message) -> Result<()> {
    conn.writer.write_line(message.as_str()).await?;
    conn.writer.flush().await
}
