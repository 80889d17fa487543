//! Relay orchestrator - wires the settings store, capture feed and sinks.
//!
//! Uses real WebSocket transports when the `real-ws` feature is enabled and
//! scripted mock transports otherwise.

use std::future::Future;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use config_loader::SettingsStore;
use contracts::{CapturedEvent, RelaySink};
use dispatcher::{pump, Dispatcher, FeedStats, HubSink, SocketSink};
use tokio::io::{AsyncBufRead, BufReader};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::RelayStats;

#[cfg(feature = "real-ws")]
type HubConnectorImpl = transport::WsHubConnector;
#[cfg(feature = "real-ws")]
type SocketConnectorImpl = transport::WsSocketConnector;

#[cfg(not(feature = "real-ws"))]
type HubConnectorImpl = transport::MockHubConnector;
#[cfg(not(feature = "real-ws"))]
type SocketConnectorImpl = transport::MockSocketConnector;

/// Dispatcher over the transports selected at build time
pub type RelayDispatcher = Dispatcher<HubSink<HubConnectorImpl>, SocketSink<SocketConnectorImpl>>;

/// Build a dispatcher with fresh, unconfigured sinks
pub fn build_dispatcher() -> RelayDispatcher {
    #[cfg(feature = "real-ws")]
    info!("Using WebSocket transports");
    #[cfg(not(feature = "real-ws"))]
    warn!("Built without `real-ws`, using mock transports");

    Dispatcher::new(
        HubSink::new(HubConnectorImpl::default()),
        SocketSink::new(SocketConnectorImpl::default()),
    )
}

/// Relay configuration
#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Live settings, already loaded and overridden
    pub store: SettingsStore,

    /// Settings file re-read on SIGHUP
    pub config_path: PathBuf,

    /// `--set` overrides re-applied after every reload
    pub overrides: Vec<String>,

    /// Capture feed file (None = stdin)
    pub input: Option<PathBuf>,

    /// Capture channel buffer size
    pub buffer_size: usize,

    /// Grace period for queued events after the feed ends (None = none)
    pub drain: Option<Duration>,

    /// Metrics server port (None = disabled)
    pub metrics_port: Option<u16>,
}

/// Main relay orchestrator
pub struct Relay {
    config: RelayConfig,
}

impl Relay {
    /// Create a new relay with the given configuration
    pub fn new(config: RelayConfig) -> Self {
        Self { config }
    }

    /// Run until the feed ends or `shutdown` resolves
    pub async fn run<F>(self, shutdown: F) -> Result<RelayStats>
    where
        F: Future<Output = ()>,
    {
        if let Some(port) = self.config.metrics_port {
            observability::init_metrics_only(port)?;
            info!("Metrics endpoint available on port {}", port);
        }

        let dispatcher = build_dispatcher();
        let input = open_input(self.config.input.as_ref()).await?;
        self.run_with(dispatcher, input, shutdown).await
    }

    /// Run against an explicit dispatcher and feed
    pub async fn run_with<H, S, R, F>(
        self,
        dispatcher: Dispatcher<H, S>,
        input: R,
        shutdown: F,
    ) -> Result<RelayStats>
    where
        H: RelaySink + Clone + Send + Sync + 'static,
        S: RelaySink + Clone + Send + Sync + 'static,
        R: AsyncBufRead + Unpin,
        F: Future<Output = ()>,
    {
        let start_time = Instant::now();
        let config = self.config;

        let (tx, rx) = mpsc::channel::<CapturedEvent>(config.buffer_size.max(1));
        let handle = dispatcher.clone().spawn(rx, config.store.subscribe());

        let reloads = Arc::new(AtomicU64::new(0));
        let reload_task = spawn_reload_task(
            config.store.clone(),
            config.config_path.clone(),
            config.overrides.clone(),
            reloads.clone(),
        );

        info!(buffer_size = config.buffer_size, "Relay started, reading capture feed");

        tokio::pin!(shutdown);

        let mut interrupted = false;
        let feed = tokio::select! {
            result = pump(input, &tx) => result.context("Capture feed failed")?,
            _ = &mut shutdown => {
                warn!("Received shutdown signal, stopping relay...");
                interrupted = true;
                FeedStats::default()
            }
        };

        if !interrupted {
            if let Some(grace) = config.drain {
                interrupted = drain(&dispatcher, grace, &mut shutdown).await;
            }
        }

        // Closing the channel stops the dispatcher and disconnects both sinks.
        drop(tx);
        let summary = handle.await.context("Dispatcher task failed")?;

        if let Some(task) = reload_task {
            task.abort();
        }

        Ok(RelayStats {
            summary,
            feed,
            duration: start_time.elapsed(),
            reloads: reloads.load(Ordering::Relaxed),
            interrupted,
        })
    }
}

/// Open the capture feed
async fn open_input(path: Option<&PathBuf>) -> Result<Box<dyn AsyncBufRead + Unpin + Send>> {
    match path {
        Some(path) => {
            let file = tokio::fs::File::open(path)
                .await
                .with_context(|| format!("Failed to open capture feed {}", path.display()))?;
            info!(input = %path.display(), "Reading capture feed from file");
            Ok(Box::new(BufReader::new(file)))
        }
        None => {
            info!("Reading capture feed from stdin");
            Ok(Box::new(BufReader::new(tokio::io::stdin())))
        }
    }
}

/// Wait until both sink queues are empty
///
/// Returns `true` when interrupted by `shutdown`.
async fn drain<H, S, F>(dispatcher: &Dispatcher<H, S>, grace: Duration, shutdown: &mut F) -> bool
where
    H: RelaySink + Clone + Send + Sync + 'static,
    S: RelaySink + Clone + Send + Sync + 'static,
    F: Future<Output = ()> + Unpin,
{
    let deadline = tokio::time::Instant::now() + grace;
    let mut ticker = tokio::time::interval(Duration::from_millis(100));

    loop {
        let status = dispatcher.status();
        let pending = status.hub.queue_len + status.socket.queue_len;
        if pending == 0 {
            debug!("Sink queues drained");
            return false;
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(pending = pending, "Drain period elapsed with events still queued");
            return false;
        }

        tokio::select! {
            _ = ticker.tick() => {}
            _ = &mut *shutdown => {
                warn!(pending = pending, "Received shutdown signal while draining");
                return true;
            }
        }
    }
}

/// Re-read the settings file on SIGHUP
#[cfg(unix)]
fn spawn_reload_task(
    store: SettingsStore,
    path: PathBuf,
    overrides: Vec<String>,
    reloads: Arc<AtomicU64>,
) -> Option<JoinHandle<()>> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut hangup = match signal(SignalKind::hangup()) {
        Ok(hangup) => hangup,
        Err(e) => {
            warn!(error = %e, "Failed to install SIGHUP handler, live reload disabled");
            return None;
        }
    };

    Some(tokio::spawn(async move {
        while hangup.recv().await.is_some() {
            info!(config = %path.display(), "SIGHUP received, reloading settings");
            match reload_settings(&store, &path, &overrides) {
                Ok(changed) if changed.is_empty() => info!("Settings unchanged"),
                Ok(changed) => {
                    reloads.fetch_add(1, Ordering::Relaxed);
                    info!(changed = ?changed, "Settings reloaded");
                }
                Err(e) => warn!(error = %e, "Settings reload rejected, keeping current settings"),
            }
        }
    }))
}

#[cfg(not(unix))]
fn spawn_reload_task(
    _store: SettingsStore,
    _path: PathBuf,
    _overrides: Vec<String>,
    _reloads: Arc<AtomicU64>,
) -> Option<JoinHandle<()>> {
    None
}

/// Load `path`, re-apply `overrides` and commit the result to `store`
///
/// The live snapshot is only touched when the whole reload succeeds.
pub(crate) fn reload_settings(
    store: &SettingsStore,
    path: &std::path::Path,
    overrides: &[String],
) -> Result<Vec<&'static str>> {
    let staged = SettingsStore::new(crate::commands::load_settings(path)?);
    crate::commands::apply_overrides(&staged, overrides)?;
    Ok(store.replace(staged.snapshot())?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::RelaySettings;
    use std::io::Write;
    use transport::{MockHubConnector, MockSocketConnector};

    fn mock_dispatcher(
        hub: &MockHubConnector,
        socket: &MockSocketConnector,
    ) -> Dispatcher<HubSink<MockHubConnector>, SocketSink<MockSocketConnector>> {
        Dispatcher::new(HubSink::new(hub.clone()), SocketSink::new(socket.clone()))
    }

    fn config(store: SettingsStore) -> RelayConfig {
        RelayConfig {
            store,
            config_path: PathBuf::from("relay.toml"),
            overrides: Vec::new(),
            input: None,
            buffer_size: 8,
            drain: Some(Duration::from_secs(5)),
            metrics_port: None,
        }
    }

    fn socket_settings() -> RelaySettings {
        let mut settings = RelaySettings::default();
        settings.socket.enabled = true;
        settings.socket.url = "ws://127.0.0.1:9000".into();
        settings.socket.publish_incoming = true;
        settings
    }

    #[tokio::test]
    async fn test_relay_feed_to_socket() {
        let hub = MockHubConnector::new();
        let socket = MockSocketConnector::new();
        let store = SettingsStore::new(socket_settings());

        let feed = concat!(
            r#"{"direction":"incoming","url":"wss://a.test/ws","rawPayload":"{\"channel\":\"ticks\"}","timestamp":"2024-05-01T12:00:00Z"}"#,
            "\n",
            "not json\n",
            "\n",
            r#"{"direction":"outgoing","url":"wss://a.test/ws","rawPayload":"ping","timestamp":"2024-05-01T12:00:01Z"}"#,
            "\n",
        );

        let stats = Relay::new(config(store))
            .run_with(
                mock_dispatcher(&hub, &socket),
                feed.as_bytes(),
                std::future::pending::<()>(),
            )
            .await
            .unwrap();

        assert_eq!(stats.feed.lines, 4);
        assert_eq!(stats.feed.forwarded, 2);
        assert_eq!(stats.feed.rejected, 1);
        assert_eq!(stats.summary.total_events, 2);
        assert_eq!(stats.summary.socket.skipped, 1);
        assert_eq!(stats.summary.hub.skipped, 2);
        assert_eq!(stats.summary.channel_counts.get("ticks"), Some(&1));
        assert!(!stats.interrupted);
    }

    #[tokio::test]
    async fn test_relay_shutdown_signal() {
        let hub = MockHubConnector::new();
        let socket = MockSocketConnector::new();
        let (_writer, reader) = tokio::io::duplex(64);

        let stats = Relay::new(config(SettingsStore::default()))
            .run_with(
                mock_dispatcher(&hub, &socket),
                BufReader::new(reader),
                async {},
            )
            .await
            .unwrap();

        assert!(stats.interrupted);
        assert_eq!(stats.summary.total_events, 0);
    }

    #[test]
    fn test_reload_settings_keeps_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            "[socket]\nenabled = true\nurl = \"ws://127.0.0.1:9000\""
        )
        .unwrap();

        let store = SettingsStore::default();
        let changed = reload_settings(
            &store,
            file.path(),
            &["socket.url=ws://127.0.0.1:9100".to_string()],
        )
        .unwrap();

        assert_eq!(changed, vec!["socket.enabled", "socket.url"]);
        assert_eq!(store.snapshot().socket.url, "ws://127.0.0.1:9100");

        let rejected = reload_settings(&store, file.path(), &["socket.port=1".to_string()]);
        assert!(rejected.is_err());
        assert_eq!(store.snapshot().socket.url, "ws://127.0.0.1:9100");
    }
}
