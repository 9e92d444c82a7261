//! # Message Counters
//!
//! Atomic implementation of [`RelayMetrics`] with Prometheus text export.
//!
//! ```rust
//! use feedrelay_core::metrics::Counters;
//! use feedrelay_core::traits::RelayMetrics;
//!
//! let counters = Counters::new();
//! counters.message_received();
//! counters.message_sent();
//!
//! let snapshot = counters.snapshot();
//! assert_eq!(snapshot.received, 1);
//! assert!(counters.to_prometheus().contains("adsb_sent_messages 1"));
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

use crate::traits::RelayMetrics;

/// Name of the received-messages counter
pub const RECEIVED_METRIC: &str = "adsb_received_messages";

/// Name of the sent-messages counter
pub const SENT_METRIC: &str = "adsb_sent_messages";

/// Received and sent message counters
#[derive(Debug, Default)]
pub struct Counters {
    received: AtomicU64,
    sent: AtomicU64,
}

impl Counters {
    /// Create zeroed counters
    pub fn new() -> Self {
        Self::default()
    }

    /// Current counter values
    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            received: self.received.load(Ordering::Relaxed),
            sent: self.sent.load(Ordering::Relaxed),
        }
    }

    /// Export the counters in Prometheus text format
    pub fn to_prometheus(&self) -> String {
        let s = self.snapshot();
        let mut output = String::new();

        output.push_str(&format!(
            "# HELP {} The total number of received ADS-B messages\n",
            RECEIVED_METRIC
        ));
        output.push_str(&format!("# TYPE {} counter\n", RECEIVED_METRIC));
        output.push_str(&format!("{} {}\n", RECEIVED_METRIC, s.received));

        output.push_str(&format!(
            "# HELP {} The total number of sent ADS-B messages\n",
            SENT_METRIC
        ));
        output.push_str(&format!("# TYPE {} counter\n", SENT_METRIC));
        output.push_str(&format!("{} {}\n", SENT_METRIC, s.sent));

        output
    }
}

impl RelayMetrics for Counters {
    fn message_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    fn message_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }
}

/// Counter values at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CountersSnapshot {
    pub received: u64,
    pub sent: u64,
}
