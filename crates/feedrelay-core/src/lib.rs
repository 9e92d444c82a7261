// # feedrelay-core
//
// Core library for the feedrelay telemetry relay.
//
// ## Architecture Overview
//
// This library relays line-delimited messages from a local TCP source to a
// remote TCP sink, registering the station's public IP before each source
// connection:
// - **MessageQueue**: Bounded FIFO decoupling the two loops (back-pressure)
// - **Receiver**: Source loop; IP registration, dial, read, enqueue
// - **Sender**: Sink loop; dial, dequeue, write, requeue on failure
// - **IpRegistrar**: Challenge-response IP registration
// - **Relay**: Wires the loops together from a `RelayConfig`
//
// ## Design Principles
//
// 1. **Capability traits**: Sockets and HTTP live behind `Dialer` and `HttpFetcher`
// 2. **Never give up**: Every error is logged and retried after a fixed delay
// 3. **No silent loss**: Full queues block producers; failed sends are requeued
// 4. **Library-First**: The daemon is a thin layer over this crate

pub mod traits;
pub mod config;
pub mod error;
pub mod events;
pub mod metrics;
pub mod queue;
pub mod receiver;
pub mod registrar;
pub mod relay;
pub mod sender;
pub mod state;

// Re-export core types for convenience
pub use traits::{Connection, Dialer, HttpFetcher, LineReader, LineWriter, RelayMetrics};
pub use config::{Endpoint, EngineConfig, RegistrationConfig, RelayConfig};
pub use error::{Error, Result};
pub use events::{EventEmitter, RelayEvent, Role};
pub use metrics::Counters;
pub use queue::{Delivery, Message, MessageQueue};
pub use receiver::{Receiver, ReceiverState};
pub use registrar::{IpRegistrar, RegistrationOutcome};
pub use relay::{AttemptOutcome, Relay};
pub use sender::{Sender, SenderState};
pub use state::{ClientCredential, RegistrationState};
