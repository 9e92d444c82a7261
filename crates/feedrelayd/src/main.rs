// # feedrelayd - Telemetry Relay Daemon
//
// This is a thin integration layer: all relay logic lives in feedrelay-core.
//
// The feedrelayd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Serving the Prometheus metrics endpoint
// 4. Starting the relay
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Source (local feed)
// - `FEEDRELAY_SOURCE_HOST`: Source hostname (default: localhost)
// - `FEEDRELAY_SOURCE_PORT`: Source port (default: 30003)
//
// ### Destination (remote sink)
// - `FEEDRELAY_DEST_HOST`: Destination hostname (default: data.adsbhub.org)
// - `FEEDRELAY_DEST_PORT`: Destination port (default: 5001)
// - `FEEDRELAY_TCP_NODELAY`: Disable Nagle's algorithm on both connections (default: false)
//
// ### IP Registration
// - `FEEDRELAY_CLIENT_KEY`: Station dynamic IP update key (required)
// - `FEEDRELAY_MY_IP_URL`, `FEEDRELAY_KEY_URL`, `FEEDRELAY_UPDATE_URL`: Endpoint overrides
// - `FEEDRELAY_HTTP_TIMEOUT_SECS`: HTTP request timeout (default: none)
//
// ### Engine
// - `FEEDRELAY_QUEUE_CAPACITY`: Message queue capacity (default: 100)
// - `FEEDRELAY_RETRY_DELAY_SECS`: Delay between connection attempts (default: 10)
//
// ### Observability
// - `FEEDRELAY_METRICS_ADDR`: Metrics bind address (default: 0.0.0.0:9180)
// - `FEEDRELAY_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export FEEDRELAY_CLIENT_KEY=your_station_key
// export FEEDRELAY_SOURCE_HOST=192.168.1.20
//
// feedrelayd
// ```

mod metrics_server;

use anyhow::{Context, Result};
use feedrelay_core::{Counters, Endpoint, Relay, RelayConfig, RelayEvent};
use feedrelay_http::ReqwestFetcher;
use feedrelay_tcp::TcpDialer;
use std::env;
use std::fmt::Display;
use std::net::SocketAddr;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{Level, debug, error, info};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Terminated by signal
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum RelayExitCode {
    /// Terminated by SIGTERM/SIGINT
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<RelayExitCode> for ExitCode {
    fn from(code: RelayExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
struct Config {
    source_host: String,
    source_port: u16,
    dest_host: String,
    dest_port: u16,
    tcp_nodelay: bool,
    client_key: String,
    my_ip_url: Option<String>,
    key_url: Option<String>,
    update_url: Option<String>,
    http_timeout_secs: Option<u64>,
    queue_capacity: usize,
    retry_delay_secs: u64,
    metrics_addr: String,
    log_level: String,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            source_host: env::var("FEEDRELAY_SOURCE_HOST")
                .unwrap_or_else(|_| "localhost".to_string()),
            source_port: parse_env("FEEDRELAY_SOURCE_PORT", 30003)?,
            dest_host: env::var("FEEDRELAY_DEST_HOST")
                .unwrap_or_else(|_| "data.adsbhub.org".to_string()),
            dest_port: parse_env("FEEDRELAY_DEST_PORT", 5001)?,
            tcp_nodelay: parse_env("FEEDRELAY_TCP_NODELAY", false)?,
            client_key: env::var("FEEDRELAY_CLIENT_KEY").unwrap_or_default(),
            my_ip_url: env::var("FEEDRELAY_MY_IP_URL").ok(),
            key_url: env::var("FEEDRELAY_KEY_URL").ok(),
            update_url: env::var("FEEDRELAY_UPDATE_URL").ok(),
            http_timeout_secs: parse_optional_env("FEEDRELAY_HTTP_TIMEOUT_SECS")?,
            queue_capacity: parse_env("FEEDRELAY_QUEUE_CAPACITY", 100)?,
            retry_delay_secs: parse_env("FEEDRELAY_RETRY_DELAY_SECS", 10)?,
            metrics_addr: env::var("FEEDRELAY_METRICS_ADDR")
                .unwrap_or_else(|_| "0.0.0.0:9180".to_string()),
            log_level: env::var("FEEDRELAY_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    ///
    /// Structural checks on the relay itself happen again in `RelayConfig::validate`;
    /// this adds the daemon-level checks and friendlier messages.
    fn validate(&self) -> Result<()> {
        if self.client_key.is_empty() {
            anyhow::bail!(
                "FEEDRELAY_CLIENT_KEY is required. \
                Set it via: export FEEDRELAY_CLIENT_KEY=your_station_key"
            );
        }

        if self.source_host.is_empty() || self.dest_host.is_empty() {
            anyhow::bail!("FEEDRELAY_SOURCE_HOST and FEEDRELAY_DEST_HOST cannot be empty");
        }

        if !(1..=1_000_000).contains(&self.queue_capacity) {
            anyhow::bail!(
                "FEEDRELAY_QUEUE_CAPACITY must be between 1 and 1000000. Got: {}",
                self.queue_capacity
            );
        }

        if !(1..=3600).contains(&self.retry_delay_secs) {
            anyhow::bail!(
                "FEEDRELAY_RETRY_DELAY_SECS must be between 1 and 3600 seconds. Got: {}",
                self.retry_delay_secs
            );
        }

        if let Some(secs) = self.http_timeout_secs {
            if !(1..=300).contains(&secs) {
                anyhow::bail!(
                    "FEEDRELAY_HTTP_TIMEOUT_SECS must be between 1 and 300 seconds. Got: {}",
                    secs
                );
            }
        }

        self.metrics_addr.parse::<SocketAddr>().with_context(|| {
            format!(
                "FEEDRELAY_METRICS_ADDR must be a socket address like 0.0.0.0:9180. Got: {}",
                self.metrics_addr
            )
        })?;

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "FEEDRELAY_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        let relay_config = self.relay_config();
        relay_config.validate()?;

        Ok(())
    }

    /// Build the TCP dialer shared by the source and sink loops
    fn dialer(&self) -> TcpDialer {
        TcpDialer::new().with_nodelay(self.tcp_nodelay)
    }

    /// Build the registration HTTP client; without a timeout the transport's own limits apply
    fn fetcher(&self) -> feedrelay_core::Result<ReqwestFetcher> {
        match self.http_timeout_secs {
            Some(secs) => ReqwestFetcher::with_timeout(Duration::from_secs(secs)),
            None => ReqwestFetcher::new(),
        }
    }

    /// Build the core relay configuration
    fn relay_config(&self) -> RelayConfig {
        let mut config = RelayConfig::new(self.client_key.clone());
        config.source = Endpoint::new(self.source_host.clone(), self.source_port);
        config.sink = Endpoint::new(self.dest_host.clone(), self.dest_port);
        if let Some(url) = &self.my_ip_url {
            config.registration.my_ip_url = url.clone();
        }
        if let Some(url) = &self.key_url {
            config.registration.key_url = url.clone();
        }
        if let Some(url) = &self.update_url {
            config.registration.update_url = url.clone();
        }
        config.engine.queue_capacity = self.queue_capacity;
        config.engine.retry_delay_secs = self.retry_delay_secs;
        config
    }
}

/// Parse an environment variable, falling back to `default` when unset
fn parse_env<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    Ok(parse_optional_env(name)?.unwrap_or(default))
}

/// Parse an environment variable that has no default
fn parse_optional_env<T>(name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: Display,
{
    match env::var(name) {
        Ok(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|e| anyhow::anyhow!("{} is not valid. Got '{}': {}", name, value, e)),
        Err(_) => Ok(None),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return RelayExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return RelayExitCode::ConfigError.into();
    }

    // Initialize tracing
    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return RelayExitCode::ConfigError.into();
    }

    info!("Starting feedrelayd daemon");

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return RelayExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        match run_daemon(config).await {
            Ok(()) => RelayExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                RelayExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Run the daemon until a termination signal arrives
async fn run_daemon(config: Config) -> Result<()> {
    let counters = Arc::new(Counters::new());

    let metrics_addr: SocketAddr = config.metrics_addr.parse()?;
    tokio::spawn(metrics_server::serve(metrics_addr, Arc::clone(&counters)));

    let (mut relay, events) = Relay::new(
        config.relay_config(),
        Arc::new(config.dialer()),
        Box::new(config.fetcher()?),
        counters,
    )?;

    tokio::spawn(log_events(events));

    tokio::select! {
        _ = relay.run() => {
            error!("Relay loops exited unexpectedly");
            anyhow::bail!("relay stopped");
        }
        signal = wait_for_shutdown() => {
            let signal = signal?;
            info!("Received {}, abandoning open connections", signal);
        }
    }

    Ok(())
}

/// Drain relay events so the channel never fills
async fn log_events(events: mpsc::Receiver<RelayEvent>) {
    let mut events = ReceiverStream::new(events);
    while let Some(event) = events.next().await {
        debug!("Relay event: {:?}", event);
    }
}

/// Wait for SIGTERM or SIGINT
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate()).context("Failed to setup SIGTERM handler")?;
    let mut sigint = signal(SignalKind::interrupt()).context("Failed to setup SIGINT handler")?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .context("Failed to wait for CTRL-C")?;
    Ok("SIGINT")
}
