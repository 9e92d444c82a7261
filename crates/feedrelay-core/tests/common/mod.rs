//! Test doubles and common utilities for relay contract tests
//!
//! These fakes replace sockets and HTTPS with scripted in-memory behavior.

#![allow(dead_code)]

use async_trait::async_trait;
use feedrelay_core::error::{Error, Result};
use feedrelay_core::traits::{Connection, Dialer, HttpFetcher, LineReader, LineWriter};
use feedrelay_core::{
    ClientCredential, Counters, Endpoint, EventEmitter, IpRegistrar, MessageQueue, Receiver,
    RegistrationConfig, RegistrationState, RelayEvent, Sender,
};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const SOURCE_PORT: u16 = 30003;
pub const SINK_PORT: u16 = 5001;

pub const MY_IP_URL: &str = "https://auth.test/getmyip.php";
pub const KEY_URL: &str = "https://auth.test/key.php";
pub const UPDATE_URL: &str = "https://auth.test/updateip.php";

pub const RETRY_DELAY: Duration = Duration::from_secs(10);

pub fn source_endpoint() -> Endpoint {
    Endpoint::new("localhost", SOURCE_PORT)
}

pub fn sink_endpoint() -> Endpoint {
    Endpoint::new("sink.test", SINK_PORT)
}

pub fn registration_config(client_key: &str) -> RegistrationConfig {
    let mut config = RegistrationConfig::new(client_key);
    config.my_ip_url = MY_IP_URL.to_string();
    config.key_url = KEY_URL.to_string();
    config.update_url = UPDATE_URL.to_string();
    config
}

// ---------------------------------------------------------------------------
// Connections
// ---------------------------------------------------------------------------

/// Reader yielding scripted lines, then either EOF or a read that never completes
pub struct ScriptedReader {
    lines: VecDeque<String>,
    hang_at_end: bool,
}

#[async_trait]
impl LineReader for ScriptedReader {
    async fn read_line(&mut self) -> Result<String> {
        if let Some(line) = self.lines.pop_front() {
            return Ok(line);
        }
        if self.hang_at_end {
            std::future::pending::<()>().await;
        }
        Err(Error::stream("connection closed by peer"))
    }
}

/// Writer that discards everything
pub struct NullWriter;

#[async_trait]
impl LineWriter for NullWriter {
    async fn write_line(&mut self, _line: &str) -> Result<()> {
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Writer recording every flushed line into a shared sink
pub struct RecordingWriter {
    delivered: Arc<Mutex<Vec<String>>>,
    pending: Vec<String>,
    writes: usize,
    flushes: usize,
    fail_on_write: Option<usize>,
    fail_on_flush: Option<usize>,
}

#[async_trait]
impl LineWriter for RecordingWriter {
    async fn write_line(&mut self, line: &str) -> Result<()> {
        let index = self.writes;
        self.writes += 1;
        if self.fail_on_write == Some(index) {
            return Err(Error::stream("connection reset"));
        }
        self.pending.push(format!("{}\n", line));
        Ok(())
    }

    async fn flush(&mut self) -> Result<()> {
        let index = self.flushes;
        self.flushes += 1;
        if self.fail_on_flush == Some(index) {
            self.pending.clear();
            return Err(Error::stream("broken pipe"));
        }
        self.delivered.lock().unwrap().append(&mut self.pending);
        Ok(())
    }

    async fn shutdown(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Source connection delivering `lines`, then closing
pub fn source_connection(lines: &[&str]) -> Connection {
    Connection::new(
        Box::new(ScriptedReader {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            hang_at_end: false,
        }),
        Box::new(NullWriter),
    )
}

/// Source connection delivering `lines`, then staying open
pub fn open_source_connection(lines: &[&str]) -> Connection {
    Connection::new(
        Box::new(ScriptedReader {
            lines: lines.iter().map(|l| l.to_string()).collect(),
            hang_at_end: true,
        }),
        Box::new(NullWriter),
    )
}

/// Sink connection recording into `delivered`; flush number `fail_on_flush` fails
pub fn sink_connection(
    delivered: &Arc<Mutex<Vec<String>>>,
    fail_on_flush: Option<usize>,
) -> Connection {
    recording_sink(delivered, None, fail_on_flush)
}

/// Sink connection recording into `delivered`; write number `fail_on_write` fails
pub fn write_failing_sink_connection(
    delivered: &Arc<Mutex<Vec<String>>>,
    fail_on_write: usize,
) -> Connection {
    recording_sink(delivered, Some(fail_on_write), None)
}

fn recording_sink(
    delivered: &Arc<Mutex<Vec<String>>>,
    fail_on_write: Option<usize>,
    fail_on_flush: Option<usize>,
) -> Connection {
    Connection::new(
        Box::new(ScriptedReader {
            lines: VecDeque::new(),
            hang_at_end: true,
        }),
        Box::new(RecordingWriter {
            delivered: Arc::clone(delivered),
            pending: Vec::new(),
            writes: 0,
            flushes: 0,
            fail_on_write,
            fail_on_flush,
        }),
    )
}

// ---------------------------------------------------------------------------
// Dialer
// ---------------------------------------------------------------------------

/// One scripted dial result
pub enum DialScript {
    Refuse,
    Accept(Connection),
}

/// Dialer answering each port from its own script; an exhausted script refuses
pub struct ScriptedDialer {
    scripts: Mutex<HashMap<u16, VecDeque<DialScript>>>,
    dials: Mutex<Vec<(u16, Instant)>>,
}

impl ScriptedDialer {
    pub fn new() -> Self {
        Self {
            scripts: Mutex::new(HashMap::new()),
            dials: Mutex::new(Vec::new()),
        }
    }

    pub fn script(&self, port: u16, step: DialScript) {
        self.scripts
            .lock()
            .unwrap()
            .entry(port)
            .or_default()
            .push_back(step);
    }

    /// Number of dials made to `port`
    pub fn dial_count(&self, port: u16) -> usize {
        self.dial_times(port).len()
    }

    /// When each dial to `port` happened
    pub fn dial_times(&self, port: u16) -> Vec<Instant> {
        self.dials
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| *p == port)
            .map(|(_, at)| *at)
            .collect()
    }
}

#[async_trait]
impl Dialer for ScriptedDialer {
    async fn dial(&self, endpoint: &Endpoint) -> Result<Connection> {
        self.dials
            .lock()
            .unwrap()
            .push((endpoint.port, Instant::now()));

        let step = self
            .scripts
            .lock()
            .unwrap()
            .get_mut(&endpoint.port)
            .and_then(|steps| steps.pop_front());

        match step {
            Some(DialScript::Accept(conn)) => Ok(conn),
            Some(DialScript::Refuse) | None => Err(Error::connect(endpoint, "connection refused")),
        }
    }
}

// ---------------------------------------------------------------------------
// HTTP
// ---------------------------------------------------------------------------

/// A scripted HTTP response
#[derive(Clone)]
pub enum Reply {
    Body(String),
    /// The update endpoint echoes the submitted `sessid`
    EchoSessid,
    Fail,
}

/// HTTP fetcher answering per URL and counting calls
pub struct ScriptedFetcher {
    replies: Mutex<HashMap<String, VecDeque<Reply>>>,
    calls: Mutex<Vec<(String, Vec<(String, String)>)>>,
    call_count: Arc<AtomicUsize>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self {
            replies: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
            call_count: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Queue a reply for `url`; the last reply for a URL repeats forever
    pub fn reply(&self, url: &str, reply: Reply) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(url.to_string())
            .or_default()
            .push_back(reply);
        self
    }

    /// Number of calls made to `url`
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|(u, _)| u == url)
            .count()
    }

    /// Total number of calls
    pub fn total_calls(&self) -> usize {
        self.call_count.load(Ordering::SeqCst)
    }

    /// Query pairs of the most recent call to `url`
    pub fn last_query(&self, url: &str) -> Option<HashMap<String, String>> {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .rev()
            .find(|(u, _)| u == url)
            .map(|(_, q)| q.iter().cloned().collect())
    }
}

/// Shares a [`ScriptedFetcher`] so the test keeps inspecting it after handing it over
pub struct SharedFetcher(pub Arc<ScriptedFetcher>);

#[async_trait]
impl HttpFetcher for SharedFetcher {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.0.get(url, query).await
    }
}

#[async_trait]
impl HttpFetcher for ScriptedFetcher {
    async fn get(&self, url: &str, query: &[(&str, &str)]) -> Result<String> {
        self.call_count.fetch_add(1, Ordering::SeqCst);
        self.calls.lock().unwrap().push((
            url.to_string(),
            query
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        ));

        let reply = {
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(url) {
                Some(queue) if queue.len() > 1 => queue.pop_front(),
                Some(queue) => queue.front().cloned(),
                None => None,
            }
        };

        match reply {
            Some(Reply::Body(body)) => Ok(body),
            Some(Reply::EchoSessid) => Ok(query
                .iter()
                .find(|(k, _)| *k == "sessid")
                .map(|(_, v)| v.to_string())
                .unwrap_or_default()),
            Some(Reply::Fail) | None => Err(Error::registration_transport(format!(
                "GET {} failed",
                url
            ))),
        }
    }
}

/// Fetcher whose public IP always equals `ip`, so registration is a no-op after the first cycle
pub fn accepting_fetcher(ip: &str) -> Arc<ScriptedFetcher> {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .reply(MY_IP_URL, Reply::Body(ip.to_string()))
        .reply(KEY_URL, Reply::Body("K1".to_string()))
        .reply(UPDATE_URL, Reply::EchoSessid);
    fetcher
}

/// Like [`accepting_fetcher`], but the first public IP lookup fails
pub fn accepting_fetcher_after_failure(ip: &str) -> Arc<ScriptedFetcher> {
    let fetcher = Arc::new(ScriptedFetcher::new());
    fetcher
        .reply(MY_IP_URL, Reply::Fail)
        .reply(MY_IP_URL, Reply::Body(ip.to_string()))
        .reply(KEY_URL, Reply::Body("K1".to_string()))
        .reply(UPDATE_URL, Reply::EchoSessid);
    fetcher
}

pub fn registrar(fetcher: &Arc<ScriptedFetcher>, client_key: &str) -> IpRegistrar {
    IpRegistrar::new(
        Box::new(SharedFetcher(Arc::clone(fetcher))),
        registration_config(client_key),
    )
}

// ---------------------------------------------------------------------------
// Loops
// ---------------------------------------------------------------------------

pub struct ReceiverHarness {
    pub receiver: Receiver,
    pub queue: Arc<MessageQueue>,
    pub counters: Arc<Counters>,
    pub events: mpsc::Receiver<RelayEvent>,
}

pub fn receiver_harness(
    dialer: &Arc<ScriptedDialer>,
    fetcher: &Arc<ScriptedFetcher>,
    queue_capacity: usize,
) -> ReceiverHarness {
    let queue = Arc::new(MessageQueue::new(queue_capacity));
    let counters = Arc::new(Counters::new());
    let (emitter, events) = EventEmitter::channel(1000);

    let receiver = Receiver::new(
        source_endpoint(),
        dialer.clone(),
        registrar(fetcher, "abc"),
        RegistrationState::new(ClientCredential::new("abc")),
        Arc::clone(&queue),
        counters.clone(),
        emitter,
    )
    .with_retry_delay(RETRY_DELAY);

    ReceiverHarness {
        receiver,
        queue,
        counters,
        events,
    }
}

pub struct SenderHarness {
    pub sender: Sender,
    pub queue: Arc<MessageQueue>,
    pub counters: Arc<Counters>,
    pub events: mpsc::Receiver<RelayEvent>,
}

pub fn sender_harness(dialer: &Arc<ScriptedDialer>, queue_capacity: usize) -> SenderHarness {
    let queue = Arc::new(MessageQueue::new(queue_capacity));
    let counters = Arc::new(Counters::new());
    let (emitter, events) = EventEmitter::channel(1000);

    let sender = Sender::new(
        sink_endpoint(),
        dialer.clone(),
        Arc::clone(&queue),
        counters.clone(),
        emitter,
    )
    .with_retry_delay(RETRY_DELAY);

    SenderHarness {
        sender,
        queue,
        counters,
        events,
    }
}

/// Drain every event currently buffered
pub fn drain_events(events: &mut mpsc::Receiver<RelayEvent>) -> Vec<RelayEvent> {
    let mut out = Vec::new();
    while let Ok(event) = events.try_recv() {
        out.push(event);
    }
    out
}
