// # TCP Line Transport
//
// This crate provides the TCP `Dialer` for the relay.
//
// ## Framing
//
// Records are `\n`-terminated lines. The reader hands each line to the relay
// with its terminator; the writer appends one to every line it is given.
// Bytes that are not valid UTF-8 are replaced rather than failing the stream.
//
// ## Timeouts
//
// None beyond what the OS applies to connect, read and write. A hung peer
// stalls the owning loop until the socket itself errors.

use async_trait::async_trait;
use feedrelay_core::traits::{Connection, Dialer, LineReader, LineWriter};
use feedrelay_core::{Endpoint, Error, Result};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tracing::debug;

/// Dialer opening plain TCP connections
#[derive(Debug, Clone, Default)]
pub struct TcpDialer {
    nodelay: bool,
}

impl TcpDialer {
    /// Create a dialer with Nagle's algorithm left enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Disable Nagle's algorithm on dialed sockets
    pub fn with_nodelay(mut self, nodelay: bool) -> Self {
        self.nodelay = nodelay;
        self
    }
}

#[async_trait]
impl Dialer for TcpDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Connection> {
        let stream = TcpStream::connect((endpoint.host.as_str(), endpoint.port))
            .await
            .map_err(|e| Error::connect(endpoint, e))?;

        if self.nodelay {
            stream
                .set_nodelay(true)
                .map_err(|e| Error::connect(endpoint, e))?;
        }

        if let Ok(peer) = stream.peer_addr() {
            debug!("Dialed {} ({})", endpoint, peer);
        }

        let (read_half, write_half) = stream.into_split();
        Ok(Connection::new(
            Box::new(TcpLineReader::new(read_half)),
            Box::new(TcpLineWriter::new(write_half)),
        ))
    }
}

/// Buffered line reader over a TCP read half
pub struct TcpLineReader {
    inner: BufReader<OwnedReadHalf>,
    buf: Vec<u8>,
}

impl TcpLineReader {
    fn new(read_half: OwnedReadHalf) -> Self {
        Self {
            inner: BufReader::new(read_half),
            buf: Vec::new(),
        }
    }
}

#[async_trait]
impl LineReader for TcpLineReader {
    async fn read_line(&mut self) -> Result<String> {
        self.buf.clear();
        let n = self
            .inner
            .read_until(b'\n', &mut self.buf)
            .await
            .map_err(|e| Error::stream(format!("read failed: {}", e)))?;

        if n == 0 {
            return Err(Error::stream("connection closed by peer"));
        }
        if self.buf.last() != Some(&b'\n') {
            return Err(Error::stream("connection closed mid-line"));
        }

        Ok(String::from_utf8_lossy(&self.buf).into_owned())
    }
}

/// Buffered line writer over a TCP write half
pub struct TcpLineWriter {
    inner: BufWriter<OwnedWriteHalf>,
}

impl TcpLineWriter {
    fn new(write_half: OwnedWriteHalf) -> Self {
        Self {
            inner: BufWriter::new(write_half),
        }
    }
}

#[async_trait]
impl LineWriter for TcpLineWriter {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        self.inner
            .write_all(line.as_bytes())
            .await
            .map_err(|e| Error::stream(format!("write failed: {}", e)))?;
        self.inner
            .write_all(b"\n")
            .await
            .map_err(|e| Error::stream(format!("write failed: {}", e)))
    }

    async fn flush(&mut self) -> Result<()> {
        self.inner
            .flush()
            .await
            .map_err(|e| Error::stream(format!("flush failed: {}", e)))
    }

    async fn shutdown(&mut self) -> Result<()> {
        self.inner
            .shutdown()
            .await
            .map_err(|e| Error::stream(format!("shutdown failed: {}", e)))
    }
}
