// # Transport Traits
//
// Defines the interface for line-oriented connections to the source and sink.
//
// ## Implementations
//
// - TCP: `feedrelay-tcp` crate
// - In-memory fakes: `tests/common` in this crate
//
// ## Usage
//
// ```rust,ignore
// use feedrelay_core::traits::Dialer;
//
// let mut conn = dialer.dial(&endpoint).await?;
// let line = conn.reader.read_line().await?;
// conn.writer.write_line(line.trim_end()).await?;
// conn.writer.flush().await?;
// conn.close().await;
// ```

use async_trait::async_trait;
use tracing::warn;

use crate::config::Endpoint;
use crate::error::Result;

/// Trait for opening connections to a peer
///
/// A dialer is shared by the loop that owns it; every call returns a fresh,
/// exclusively owned [`Connection`].
#[async_trait]
pub trait Dialer: Send + Sync {
    /// Dial the given endpoint
    ///
    /// # Returns
    ///
    /// - `Ok(Connection)`: A live connection
    /// - `Err(Error::Connect)`: The peer could not be reached
    async fn dial(&self, endpoint: &Endpoint) -> Result<Connection>;
}

/// Reading half of a connection
#[async_trait]
pub trait LineReader: Send {
    /// Read one `\n`-terminated line, terminator included
    ///
    /// End of stream is an error, and so is a final partial line that never
    /// received its terminator. The partial line is discarded.
    async fn read_line(&mut self) -> Result<String>;
}

/// Writing half of a connection
#[async_trait]
pub trait LineWriter: Send {
    /// Buffer `line` followed by a `\n` terminator
    async fn write_line(&mut self, line: &str) -> Result<()>;

    /// Push buffered bytes to the peer
    async fn flush(&mut self) -> Result<()>;

    /// Shut down the write direction
    async fn shutdown(&mut self) -> Result<()>;
}

/// A live bidirectional connection to one peer
///
/// Owned by exactly one loop and discarded on the first read or write error.
pub struct Connection {
    /// Reading half
    pub reader: Box<dyn LineReader>,
    /// Writing half
    pub writer: Box<dyn LineWriter>,
}

impl Connection {
    /// Create a connection from its two halves
    pub fn new(reader: Box<dyn LineReader>, writer: Box<dyn LineWriter>) -> Self {
        Self { reader, writer }
    }

    /// Close the connection
    ///
    /// Close failures are logged and otherwise ignored.
    pub async fn close(mut self) {
        if let Err(e) = self.writer.shutdown().await {
            warn!("Could not close connection: {}", e);
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection").finish_non_exhaustive()
    }
}
