//! Relay wiring
//!
//! The [`Relay`] owns the two long-lived loops and the queue between them.
//!
//! ## Architecture
//!
//! ```text
//!  ┌──────────┐        ┌──────────┐       ┌──────────────┐       ┌──────────┐       ┌──────────┐
//!  │  source  │──line─►│ Receiver │──────►│ MessageQueue │──────►│  Sender  │──line─►│   sink   │
//!  └──────────┘        └──────────┘       └──────────────┘       └──────────┘       └──────────┘
//!                           │
//!                           ▼
//!                     ┌─────────────┐
//!                     │ IpRegistrar │  (before every receiver dial)
//!                     └─────────────┘
//! ```
//!
//! The loops share nothing but the queue. Both run until the process is
//! terminated; there is no shutdown path and open connections are abandoned.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::info;

use crate::config::RelayConfig;
use crate::error::Result;
use crate::events::{EventEmitter, RelayEvent};
use crate::queue::MessageQueue;
use crate::receiver::Receiver;
use crate::registrar::IpRegistrar;
use crate::sender::Sender;
use crate::state::{ClientCredential, RegistrationState};
use crate::traits::{Dialer, HttpFetcher, RelayMetrics};

/// Delay between connection attempts when none is configured
pub const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(10);

/// How one pass through a loop's state machine ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    /// IP registration failed; no dial was attempted
    RegistrationFailed,
    /// The peer could not be dialed
    DialFailed,
    /// A connection was established and later failed
    StreamEnded,
}

/// Receiver, sender and the queue connecting them
pub struct Relay {
    receiver: Receiver,
    sender: Sender,
    queue: Arc<MessageQueue>,
}

impl Relay {
    /// Build a relay from configuration
    ///
    /// # Parameters
    ///
    /// - `config`: Relay configuration (validated here)
    /// - `dialer`: Dialer used for both the source and the sink
    /// - `fetcher`: HTTP client for the IP registration exchange
    /// - `metrics`: Counter sink for received and sent messages
    ///
    /// # Returns
    ///
    /// A tuple of (relay, event_receiver) where event_receiver yields relay events
    pub fn new(
        config: RelayConfig,
        dialer: Arc<dyn Dialer>,
        fetcher: Box<dyn HttpFetcher>,
        metrics: Arc<dyn RelayMetrics>,
    ) -> Result<(Self, mpsc::Receiver<RelayEvent>)> {
        config.validate()?;

        let (events, event_rx) = EventEmitter::channel(config.engine.event_channel_capacity);
        let queue = Arc::new(MessageQueue::new(config.engine.queue_capacity));
        let retry_delay = config.engine.retry_delay();

        let registration = RegistrationState::new(ClientCredential::new(
            config.registration.client_key.clone(),
        ));
        let registrar = IpRegistrar::new(fetcher, config.registration);

        let receiver = Receiver::new(
            config.source,
            Arc::clone(&dialer),
            registrar,
            registration,
            Arc::clone(&queue),
            Arc::clone(&metrics),
            events.clone(),
        )
        .with_retry_delay(retry_delay);

        let sender = Sender::new(config.sink, dialer, Arc::clone(&queue), metrics, events)
            .with_retry_delay(retry_delay);

        Ok((
            Self {
                receiver,
                sender,
                queue,
            },
            event_rx,
        ))
    }

    /// Run both loops concurrently, forever
    pub async fn run(&mut self) {
        info!(
            "Relaying {} -> {} (queue capacity {})",
            self.receiver.endpoint(),
            self.sender.endpoint(),
            self.queue.capacity()
        );

        let Self {
            receiver, sender, ..
        } = self;
        tokio::join!(receiver.run(), sender.run());
    }

    /// The queue between the loops
    pub fn queue(&self) -> &Arc<MessageQueue> {
        &self.queue
    }

    /// The receiver loop
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// The sender loop
    pub fn sender(&self) -> &Sender {
        &self.sender
    }
}
