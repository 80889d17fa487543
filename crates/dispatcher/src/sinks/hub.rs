//! HubSink - RPC hub publishing with reconnect and backoff
//!
//! Events are delivered as single-argument invocations of the configured
//! method. While the hub is unreachable they wait in a bounded queue that is
//! flushed, in order, whenever a connection comes up.

use std::sync::Arc;

use contracts::{
    ConfigureEffect, ConnectionState, ContractError, EnsureConnected, Event, HubConnection,
    HubConnector, HubLifecycle, Invocation, PublishOutcome, RelaySettings, RelaySink, SinkKind,
    SinkStatus,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Level};

use crate::backoff;
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::noise::{log_at, NoiseFilter};
use crate::queue::{BoundedQueue, QueuedMessage, DEFAULT_QUEUE_CAPACITY};
use crate::sinks::retry::RetryTimer;

struct HubInner<K> {
    url: String,
    method: String,
    enabled: bool,
    filter: NoiseFilter,
    configured: bool,
    state: ConnectionState,
    connection: Option<K>,
    /// Bumped whenever the current connection is superseded
    generation: u64,
    attempts: u32,
    retry: RetryTimer,
    watcher: Option<JoinHandle<()>>,
    queue: BoundedQueue<QueuedMessage>,
    metrics: Arc<SinkMetrics>,
}

impl<K: HubConnection> HubInner<K> {
    fn is_active(&self) -> bool {
        self.enabled && !self.url.is_empty()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(sink = "hub", from = %self.state, to = %state, "State change");
            self.state = state;
            self.metrics.record_state(state);
        }
    }

    /// Forget the current connection and everything bound to it
    fn supersede(&mut self) -> Option<K> {
        self.generation = self.generation.wrapping_add(1);
        if let Some(watcher) = self.watcher.take() {
            watcher.abort();
        }
        self.connection.take()
    }

    fn enqueue(&mut self, event: Event) -> Result<(), ContractError> {
        let capacity = self.queue.capacity();
        match self.queue.push(QueuedMessage::new(event)) {
            Ok(()) => {
                self.metrics.set_queue_len(self.queue.len());
                Ok(())
            }
            Err(_) => {
                self.metrics.inc_dropped_count();
                Err(ContractError::QueueFull {
                    sink: SinkKind::Hub,
                    capacity,
                })
            }
        }
    }
}

/// Hub sink
///
/// Cheap to clone; clones share one connection and one queue.
pub struct HubSink<C: HubConnector> {
    inner: Arc<Mutex<HubInner<C::Connection>>>,
    connector: Arc<C>,
    metrics: Arc<SinkMetrics>,
}

impl<C: HubConnector> Clone for HubSink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            connector: Arc::clone(&self.connector),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<C: HubConnector> HubSink<C> {
    /// Create an unconfigured sink; nothing connects until `configure`
    pub fn new(connector: C) -> Self {
        Self::with_capacity(connector, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(connector: C, capacity: usize) -> Self {
        let metrics = Arc::new(SinkMetrics::new(SinkKind::Hub));
        let inner = HubInner {
            url: String::new(),
            method: contracts::DEFAULT_HUB_METHOD.to_string(),
            enabled: false,
            filter: NoiseFilter::default(),
            configured: false,
            state: ConnectionState::Disconnected,
            connection: None,
            generation: 0,
            attempts: 0,
            retry: RetryTimer::default(),
            watcher: None,
            queue: BoundedQueue::new(capacity),
            metrics: Arc::clone(&metrics),
        };
        Self {
            inner: Arc::new(Mutex::new(inner)),
            connector: Arc::new(connector),
            metrics,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().state
    }

    pub fn queue_len(&self) -> usize {
        self.inner.lock().queue.len()
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// Start a connection if the sink is active
    ///
    /// Returns immediately; the connect runs in the background.
    pub fn ensure_connected(&self) -> EnsureConnected {
        {
            let inner = self.inner.lock();
            if !inner.enabled {
                return EnsureConnected::Disabled;
            }
            if inner.url.is_empty() {
                return EnsureConnected::NoUrl;
            }
        }
        self.spawn_connect();
        EnsureConnected::Started
    }

    /// Connect to the configured hub
    ///
    /// A no-op while already connected or connecting. On failure a reconnect
    /// is scheduled before the error is returned.
    ///
    /// # Errors
    /// Returns `SinkDisabled` when inactive, or the transport's start error
    #[instrument(name = "hub_sink_connect", skip(self))]
    pub async fn connect(&self) -> Result<(), ContractError> {
        let (url, generation, previous) = {
            let mut inner = self.inner.lock();
            if !inner.is_active() {
                return Err(ContractError::SinkDisabled {
                    sink: SinkKind::Hub,
                });
            }
            if matches!(
                inner.state,
                ConnectionState::Connected
                    | ConnectionState::Connecting
                    | ConnectionState::Reconnecting
            ) {
                return Ok(());
            }
            let previous = inner.supersede();
            inner.set_state(ConnectionState::Connecting);
            (inner.url.clone(), inner.generation, previous)
        };

        if let Some(previous) = previous {
            previous.stop().await;
        }

        info!(sink = "hub", url = %url, "Connecting to hub");
        match self.connector.connect(&url).await {
            Ok((connection, lifecycle)) => {
                self.on_started(generation, connection, lifecycle).await;
                Ok(())
            }
            Err(e) => {
                let level = {
                    let mut inner = self.inner.lock();
                    if inner.generation != generation {
                        return Err(e);
                    }
                    inner.set_state(ConnectionState::Disconnected);
                    inner.filter.handshake_level()
                };
                log_at!(level, sink = "hub", error = %e, "Hub connection failed, will retry");
                self.schedule_reconnect("start-failed");
                Err(e)
            }
        }
    }

    async fn on_started(
        &self,
        generation: u64,
        connection: C::Connection,
        lifecycle: mpsc::UnboundedReceiver<HubLifecycle>,
    ) {
        let stale = {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                true
            } else {
                inner.connection = Some(connection.clone());
                inner.attempts = 0;
                inner.retry.cancel();
                inner.set_state(ConnectionState::Connected);
                inner.watcher = Some(self.spawn_watcher(generation, lifecycle));
                false
            }
        };

        if stale {
            debug!(sink = "hub", "Discarding superseded connection");
            connection.stop().await;
            return;
        }

        info!(
            sink = "hub",
            connection_id = connection.connection_id().as_deref().unwrap_or("-"),
            "Hub connected"
        );
        self.flush_queue();
    }

    fn spawn_connect(&self) {
        let sink = self.clone();
        tokio::spawn(async move {
            // Failures are logged and rescheduled inside connect.
            let _ = sink.connect().await;
        });
    }

    fn spawn_watcher(
        &self,
        generation: u64,
        mut lifecycle: mpsc::UnboundedReceiver<HubLifecycle>,
    ) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            while let Some(event) = lifecycle.recv().await {
                if !sink.on_lifecycle(generation, event) {
                    break;
                }
            }
        })
    }

    /// Apply one lifecycle event; false once the connection is done
    fn on_lifecycle(&self, generation: u64, event: HubLifecycle) -> bool {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return false;
        }

        match event {
            HubLifecycle::Reconnecting { error } => {
                inner.set_state(ConnectionState::Reconnecting);
                let message = error.unwrap_or_default();
                let level = inner.filter.level_for(Level::DEBUG, &message);
                drop(inner);
                log_at!(level, sink = "hub", error = %message, "Hub transport reconnecting");
                true
            }
            HubLifecycle::Reconnected { connection_id } => {
                inner.attempts = 0;
                inner.retry.cancel();
                inner.set_state(ConnectionState::Connected);
                drop(inner);
                info!(
                    sink = "hub",
                    connection_id = connection_id.as_deref().unwrap_or("-"),
                    "Hub transport reconnected"
                );
                self.flush_queue();
                true
            }
            HubLifecycle::Closed { error } => {
                inner.connection = None;
                inner.watcher = None;
                inner.set_state(ConnectionState::Disconnected);
                let message = match &error {
                    Some(e) => format!("Connection disconnected with error '{e}'"),
                    None => "Connection closed".to_string(),
                };
                let level = inner.filter.level_for(Level::WARN, &message);
                drop(inner);
                log_at!(level, sink = "hub", reason = %message, "Hub connection closed");
                self.schedule_reconnect("closed");
                false
            }
        }
    }

    /// Arm the reconnect timer unless inactive or one is already pending
    fn schedule_reconnect(&self, reason: &'static str) {
        let mut inner = self.inner.lock();
        if !inner.is_active() || inner.retry.is_pending() {
            return;
        }

        inner.attempts = inner.attempts.saturating_add(1);
        let attempt = inner.attempts;
        let delay = backoff::hub_delay(attempt);
        let sink = self.clone();
        inner
            .retry
            .arm(delay, move |ticket| async move { sink.on_retry_timer(ticket).await });
        drop(inner);

        let delay_ms = delay.as_millis() as u64;
        self.metrics.record_reconnect(delay_ms);
        debug!(sink = "hub", attempt, delay_ms, reason, "Hub reconnect scheduled");
    }

    async fn on_retry_timer(&self, ticket: u64) {
        {
            let mut inner = self.inner.lock();
            if !inner.retry.claim(ticket) {
                return;
            }
            if !inner.is_active() {
                inner.attempts = 0;
                return;
            }
            if inner.state.is_connected() {
                inner.attempts = 0;
                return;
            }
        }
        let _ = self.connect().await;
    }

    /// Issue every queued event, oldest first, on the live connection
    ///
    /// Invocations go on the wire synchronously in queue order; completions
    /// are observed in the background and failures re-queued at the tail.
    fn flush_queue(&self) {
        let (connection, method, batch) = {
            let mut inner = self.inner.lock();
            if !inner.state.is_connected() || inner.queue.is_empty() {
                return;
            }
            let Some(connection) = inner.connection.clone() else {
                return;
            };
            let batch = inner.queue.drain_all();
            inner.metrics.set_queue_len(0);
            (connection, inner.method.clone(), batch)
        };

        debug!(sink = "hub", count = batch.len(), "Flushing hub queue");
        let mut pending: Vec<(Event, Invocation)> = Vec::with_capacity(batch.len());
        for message in batch {
            let argument = match message.event.to_value() {
                Ok(value) => value,
                Err(e) => {
                    warn!(sink = "hub", error = %e, "Dropping unserializable event");
                    continue;
                }
            };
            match connection.invoke(&method, argument) {
                Ok(invocation) => pending.push((message.event, invocation)),
                Err(e) => {
                    self.requeue(message.event, &e, Level::DEBUG);
                }
            }
        }

        self.watch_completions(pending, Level::DEBUG);
    }

    /// Observe invocation completions off the publish path
    ///
    /// A rejected invocation goes back to the tail of the queue; `level` is
    /// the log level of that failure before noise filtering.
    fn watch_completions(&self, pending: Vec<(Event, Invocation)>, level: Level) {
        if pending.is_empty() {
            return;
        }
        let sink = self.clone();
        tokio::spawn(async move {
            for (event, invocation) in pending {
                match invocation.await {
                    Ok(()) => sink.metrics.record_outcome(&PublishOutcome::Delivered),
                    Err(e) => {
                        let requeued = sink.requeue(event, &e, level);
                        let error = ContractError::delivery(SinkKind::Hub, e.to_string(), requeued);
                        let outcome = PublishOutcome::errored(error.to_string());
                        sink.metrics.record_outcome(&outcome);
                    }
                }
            }
        });
    }

    fn queued_outcome(
        &self,
        queued: Result<(), ContractError>,
    ) -> Result<PublishOutcome, ContractError> {
        match queued {
            Ok(()) => {
                self.metrics.record_outcome(&PublishOutcome::Queued);
                Ok(PublishOutcome::Queued)
            }
            Err(e) => {
                warn!(sink = "hub", "Hub queue full, dropping message");
                self.metrics.record_outcome(&PublishOutcome::errored(e.to_string()));
                Err(e)
            }
        }
    }

    /// Put a failed event back at the tail; true if it fit
    fn requeue(&self, event: Event, error: &ContractError, level: Level) -> bool {
        let mut inner = self.inner.lock();
        let requeued = inner.enqueue(event).is_ok();
        let level = inner.filter.level_for(level, &error.to_string());
        drop(inner);
        log_at!(level, sink = "hub", error = %error, requeued, "Hub invocation failed");
        requeued
    }
}

impl<C: HubConnector> RelaySink for HubSink<C> {
    fn kind(&self) -> SinkKind {
        SinkKind::Hub
    }

    #[instrument(name = "hub_sink_configure", skip(self, settings))]
    fn configure(&self, settings: &RelaySettings) -> ConfigureEffect {
        let section = &settings.hub;
        let url = section.url.trim().to_string();

        let (effect, previous) = {
            let mut inner = self.inner.lock();
            let first = !inner.configured;
            let changed = first || inner.enabled != section.enabled || inner.url != url;
            inner.configured = true;
            inner.enabled = section.enabled;
            inner.url = url;
            inner.method = section.method.clone();
            inner.filter = NoiseFilter::new(section.verbose_logging);

            if !changed {
                (ConfigureEffect::None, None)
            } else if inner.is_active() {
                // New target: drop the old link and start over
                let previous = inner.supersede();
                inner.retry.cancel();
                inner.attempts = 0;
                inner.set_state(ConnectionState::Disconnected);
                (ConfigureEffect::Connect, previous)
            } else if first {
                (ConfigureEffect::None, None)
            } else {
                (ConfigureEffect::Disconnect, None)
            }
        };

        match effect {
            ConfigureEffect::Connect => {
                if let Some(previous) = previous {
                    tokio::spawn(async move { previous.stop().await });
                }
                self.spawn_connect();
            }
            ConfigureEffect::Disconnect => self.disconnect(),
            ConfigureEffect::None => {}
        }
        debug!(sink = "hub", effect = ?effect, "Hub configured");
        effect
    }

    #[instrument(name = "hub_sink_publish", skip(self, event), fields(direction = %event.direction))]
    async fn publish(&self, event: Event) -> Result<PublishOutcome, ContractError> {
        let (connection, method) = {
            let mut inner = self.inner.lock();
            match inner.connection.clone().filter(|_| inner.state.is_connected()) {
                Some(connection) => (connection, inner.method.clone()),
                None => {
                    let queued = inner.enqueue(event);
                    drop(inner);
                    return self.queued_outcome(queued);
                }
            }
        };

        let argument = match event.to_value() {
            Ok(argument) => argument,
            Err(e) => {
                let e = ContractError::from(e);
                self.metrics.record_outcome(&PublishOutcome::errored(e.to_string()));
                return Err(e);
            }
        };

        // Issue and move on; the completion is watched in the background
        match connection.invoke(&method, argument) {
            Ok(invocation) => {
                self.watch_completions(vec![(event, invocation)], Level::WARN);
                Ok(PublishOutcome::Delivered)
            }
            Err(e) => {
                let requeued = self.requeue(event, &e, Level::WARN);
                let error = ContractError::delivery(SinkKind::Hub, e.to_string(), requeued);
                self.metrics.record_outcome(&PublishOutcome::errored(error.to_string()));
                Err(error)
            }
        }
    }

    fn disconnect(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            let previous = inner.supersede();
            inner.retry.cancel();
            inner.attempts = 0;
            inner.set_state(ConnectionState::Disconnected);
            previous
        };
        if let Some(previous) = previous {
            tokio::spawn(async move { previous.stop().await });
        }
        debug!(sink = "hub", "Hub disconnected");
    }

    fn status(&self) -> SinkStatus {
        let inner = self.inner.lock();
        SinkStatus {
            kind: SinkKind::Hub,
            state: inner.state,
            queue_len: inner.queue.len(),
            reconnect_attempts: inner.attempts,
            retry_pending: inner.retry.is_pending(),
            retry_delay_ms: inner.retry.delay_ms(),
            auto_exhausted: false,
        }
    }
}
