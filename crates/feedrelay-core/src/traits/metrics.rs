//! Metrics interface injected into the relay loops

/// Counter interface for relayed messages
///
/// Counters only ever increase, and only for non-empty messages.
pub trait RelayMetrics: Send + Sync {
    /// A non-empty message was read from the source and enqueued
    fn message_received(&self);

    /// A non-empty message was written and flushed to the sink
    fn message_sent(&self);
}

/// Metrics sink that discards everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl RelayMetrics for NoopMetrics {
    fn message_received(&self) {}

    fn message_sent(&self) {}
}
