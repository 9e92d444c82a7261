//! Prometheus metrics endpoint
//!
//! Serves `GET /metrics` in the text exposition format. Every other request
//! gets a 404. The endpoint is best-effort: failing to bind is logged and the
//! relay keeps running without it.

use feedrelay_core::Counters;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

/// Largest request head we read before answering
const MAX_REQUEST_HEAD: usize = 8 * 1024;

const CONTENT_TYPE: &str = "text/plain; version=0.0.4";

/// Bind `addr` and serve metrics until the process exits
pub async fn serve(addr: SocketAddr, counters: Arc<Counters>) {
    let listener = match TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind metrics endpoint on {}: {}", addr, e);
            return;
        }
    };

    info!("Serving metrics on http://{}/metrics", addr);
    serve_on(listener, counters).await;
}

async fn serve_on(listener: TcpListener, counters: Arc<Counters>) {
    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                let counters = Arc::clone(&counters);
                tokio::spawn(async move {
                    if let Err(e) = handle(socket, &counters).await {
                        debug!("Metrics request from {} failed: {}", peer, e);
                    }
                });
            }
            Err(e) => {
                debug!("Metrics accept failed: {}", e);
            }
        }
    }
}

async fn handle(mut socket: TcpStream, counters: &Counters) -> std::io::Result<()> {
    let mut head = Vec::new();
    let mut buf = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") && head.len() < MAX_REQUEST_HEAD {
        let n = socket.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        head.extend_from_slice(&buf[..n]);
    }

    let request = String::from_utf8_lossy(&head);
    let response = respond(request.lines().next().unwrap_or_default(), counters);

    socket.write_all(response.as_bytes()).await?;
    socket.shutdown().await
}

/// Build the full HTTP response for a request line
fn respond(request_line: &str, counters: &Counters) -> String {
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default();
    let path = parts.next().unwrap_or_default();
    let path = path.split('?').next().unwrap_or_default();

    if method == "GET" && path == "/metrics" {
        let body = counters.to_prometheus();
        format!(
            "HTTP/1.1 200 OK\r\nContent-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            CONTENT_TYPE,
            body.len(),
            body
        )
    } else {
        let body = "Not Found\n";
        format!(
            "HTTP/1.1 404 Not Found\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            body.len(),
            body
        )
    }
}
