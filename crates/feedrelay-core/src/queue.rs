//! Bounded message queue
//!
//! The queue is the only synchronization point between the receiver and the
//! sender. It is a FIFO of [`Message`]s with a fixed capacity:
//!
//! - [`MessageQueue::enqueue`] blocks while the queue is full (back-pressure)
//! - [`MessageQueue::dequeue`] blocks while the queue is empty
//!
//! ## Delivery leases
//!
//! A dequeued message is handed out as a [`Delivery`]. The lease keeps its slot
//! occupied until it is resolved:
//!
//! ```text
//!   enqueue ──► [ m3 m2 m1 ] ──► dequeue ──► Delivery(m1)
//!                  ▲                              │
//!                  │                 complete() ──┴──► slot released
//!                  └─────── requeue() / drop ─────┘    (m1 appended at the tail)
//! ```
//!
//! A requeued message reuses the slot it already holds, so putting a failed
//! message back never blocks, even when the receiver has filled every other
//! slot in the meantime. Requeueing appends at the **tail**: a message that
//! failed to send is delivered after everything enqueued before the failure.

use std::fmt;

use tokio::sync::{Mutex, Semaphore, mpsc};
use tracing::debug;

use crate::error::{Error, Result};

/// One line of relayed text, without its line terminator
///
/// Messages carry no identity beyond their content.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct Message(String);

impl Message {
    /// Create a message from already-clean text
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// Create a message from a received line, trimming trailing whitespace and the terminator
    pub fn from_line(line: &str) -> Self {
        Self(line.trim_end().to_string())
    }

    /// Message text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Whether the message has no content
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Message {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

/// Bounded FIFO of messages shared by producers and consumers
///
/// Safe for any number of concurrent producers and consumers.
pub struct MessageQueue {
    /// Fixed capacity
    capacity: usize,

    /// One permit per free slot
    slots: Semaphore,

    /// Tail of the queue
    tx: mpsc::UnboundedSender<Message>,

    /// Head of the queue
    rx: Mutex<mpsc::UnboundedReceiver<Message>>,
}

impl MessageQueue {
    /// Create an empty queue holding at most `capacity` messages
    ///
    /// `capacity` is clamped to `1..=Semaphore::MAX_PERMITS`.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.clamp(1, Semaphore::MAX_PERMITS);
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            capacity,
            slots: Semaphore::new(capacity),
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Append a message, waiting for a free slot if the queue is full
    pub async fn enqueue(&self, message: Message) -> Result<()> {
        let permit = self.slots.acquire().await.map_err(|_| Error::QueueClosed)?;
        // The slot is returned when the message's delivery completes
        permit.forget();
        self.push_tail(message)
    }

    /// Take the head message, waiting until one is available
    pub async fn dequeue(&self) -> Result<Delivery<'_>> {
        let mut rx = self.rx.lock().await;
        match rx.recv().await {
            Some(message) => Ok(Delivery {
                queue: self,
                message,
                resolved: false,
            }),
            None => Err(Error::QueueClosed),
        }
    }

    /// Number of occupied slots (queued plus leased messages)
    pub fn len(&self) -> usize {
        self.capacity - self.slots.available_permits()
    }

    /// Whether no slot is occupied
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Fixed capacity of the queue
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    fn push_tail(&self, message: Message) -> Result<()> {
        self.tx.send(message).map_err(|_| Error::QueueClosed)
    }

    fn release_slot(&self) {
        self.slots.add_permits(1);
    }
}

impl fmt::Debug for MessageQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageQueue")
            .field("capacity", &self.capacity)
            .field("len", &self.len())
            .finish()
    }
}

/// A dequeued message whose slot is held until the delivery is resolved
///
/// Dropping an unresolved delivery requeues the message.
#[must_use = "an unresolved delivery is requeued when dropped"]
pub struct Delivery<'a> {
    queue: &'a MessageQueue,
    message: Message,
    resolved: bool,
}

impl Delivery<'_> {
    /// The leased message
    pub fn message(&self) -> &Message {
        &self.message
    }

    /// Mark the message delivered and free its slot
    pub fn complete(mut self) {
        self.resolved = true;
        self.queue.release_slot();
    }

    /// Put the message back at the tail of the queue, keeping its slot
    pub fn requeue(mut self) {
        self.put_back();
    }

    fn put_back(&mut self) {
        if self.resolved {
            return;
        }
        self.resolved = true;
        let message = std::mem::take(&mut self.message);
        debug!("Requeueing message at tail ({} bytes)", message.as_str().len());
        if self.queue.push_tail(message).is_err() {
            self.queue.release_slot();
        }
    }
}

impl Drop for Delivery<'_> {
    fn drop(&mut self) {
        self.put_back();
    }
}

impl fmt::Debug for Delivery<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Delivery")
            .field("message", &self.message)
            .field("resolved", &self.resolved)
            .finish()
    }
}
