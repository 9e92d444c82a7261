//! Core traits for the relay
//!
//! These are the capability seams between the relay loops and the outside world.
//!
//! - [`Dialer`]: Open line-oriented connections to TCP peers
//! - [`HttpFetcher`]: Perform the HTTPS GETs of the IP registration exchange
//! - [`RelayMetrics`]: Count received and sent messages

pub mod transport;
pub mod http_fetcher;
pub mod metrics;

pub use transport::{Connection, Dialer, LineReader, LineWriter};
pub use http_fetcher::HttpFetcher;
pub use metrics::{NoopMetrics, RelayMetrics};
