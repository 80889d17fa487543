//! SocketSink - raw WebSocket publishing with capped auto-retry
//!
//! Each event is sent as one JSON text frame. Automatic reconnects stop after
//! a fixed number of attempts; a publish while disconnected still triggers a
//! one-off manual dial.

use std::sync::Arc;

use contracts::{
    ConfigureEffect, ConnectionState, ContractError, Event, PublishOutcome, RelaySettings,
    RelaySink, SinkKind, SinkStatus, SocketConnection, SocketConnector, SocketEvent,
};
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, instrument, warn, Level};

use crate::backoff::{SocketBackoff, SOCKET_MAX_ATTEMPTS};
use crate::metrics::{MetricsSnapshot, SinkMetrics};
use crate::noise::{log_at, NoiseFilter};
use crate::queue::{BoundedQueue, QueuedMessage, DEFAULT_QUEUE_CAPACITY};
use crate::sinks::retry::RetryTimer;

/// Who asked for a dial
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DialKind {
    /// Configure or the retry timer; a failed dial schedules the next retry
    Auto,
    /// Triggered by a publish; neither a failed dial nor a later close
    /// of the socket it opened schedules a retry
    Manual,
}

struct SocketInner<K> {
    url: String,
    enabled: bool,
    filter: NoiseFilter,
    configured: bool,
    state: ConnectionState,
    socket: Option<Arc<K>>,
    generation: u64,
    backoff: SocketBackoff,
    retry: RetryTimer,
    reader: Option<JoinHandle<()>>,
    queue: BoundedQueue<QueuedMessage>,
    metrics: Arc<SinkMetrics>,
}

impl<K: SocketConnection> SocketInner<K> {
    fn is_active(&self) -> bool {
        self.enabled && !self.url.is_empty()
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            debug!(sink = "socket", from = %self.state, to = %state, "State change");
            self.state = state;
            self.metrics.record_state(state);
        }
    }

    fn supersede(&mut self) -> Option<Arc<K>> {
        self.generation = self.generation.wrapping_add(1);
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.socket.take()
    }

    /// Socket usable for sending right now
    fn open_socket(&self) -> Option<Arc<K>> {
        self.socket
            .as_ref()
            .filter(|s| self.state.is_connected() && s.is_open())
            .cloned()
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
                    sink: SinkKind::Socket,
                    capacity,
                })
            }
        }
    }
}

/// Raw socket sink
pub struct SocketSink<C: SocketConnector> {
    inner: Arc<Mutex<SocketInner<C::Connection>>>,
    connector: Arc<C>,
    metrics: Arc<SinkMetrics>,
}

impl<C: SocketConnector> Clone for SocketSink<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
            connector: Arc::clone(&self.connector),
            metrics: Arc::clone(&self.metrics),
        }
    }
}

impl<C: SocketConnector> SocketSink<C> {
    pub fn new(connector: C) -> Self {
        Self::with_capacity(connector, DEFAULT_QUEUE_CAPACITY)
    }

    pub fn with_capacity(connector: C, capacity: usize) -> Self {
        let metrics = Arc::new(SinkMetrics::new(SinkKind::Socket));
        let inner = SocketInner {
            url: String::new(),
            enabled: false,
            filter: NoiseFilter::default(),
            configured: false,
            state: ConnectionState::Disconnected,
            socket: None,
            generation: 0,
            backoff: SocketBackoff::default(),
            retry: RetryTimer::default(),
            reader: None,
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

    /// Dial the configured endpoint
    ///
    /// A no-op while open or while another dial is in flight.
    ///
    /// # Errors
    /// Returns `SinkDisabled` when inactive, or the dial error
    #[instrument(name = "socket_sink_connect", skip(self))]
    pub async fn connect(&self, dial: DialKind) -> Result<(), ContractError> {
        let (url, generation, previous) = {
            let mut inner = self.inner.lock();
            if !inner.is_active() {
                return Err(ContractError::SinkDisabled {
                    sink: SinkKind::Socket,
                });
            }
            if inner.open_socket().is_some() {
                debug!(sink = "socket", "Socket already connected");
                return Ok(());
            }
            if inner.state == ConnectionState::Connecting {
                return Ok(());
            }
            let previous = inner.supersede();
            inner.set_state(ConnectionState::Connecting);
            (inner.url.clone(), inner.generation, previous)
        };

        if let Some(previous) = previous {
            previous.close();
        }

        info!(sink = "socket", url = %url, dial = ?dial, "Connecting socket");
        match self.connector.open(&url).await {
            Ok((socket, events)) => {
                self.on_open(generation, dial, socket, events);
                Ok(())
            }
            Err(e) => {
                let level = {
                    let inner = self.inner.lock();
                    if inner.generation != generation {
                        return Err(e);
                    }
                    inner.filter.level_for(Level::ERROR, &e.to_string())
                };
                log_at!(level, sink = "socket", error = %e, "Socket error");
                self.on_closed(generation, dial, None, &e.to_string());
                Err(e)
            }
        }
    }

    fn on_open(
        &self,
        generation: u64,
        dial: DialKind,
        socket: C::Connection,
        events: mpsc::UnboundedReceiver<SocketEvent>,
    ) {
        {
            let mut inner = self.inner.lock();
            if inner.generation != generation {
                drop(inner);
                debug!(sink = "socket", "Discarding superseded socket");
                socket.close();
                return;
            }
            inner.socket = Some(Arc::new(socket));
            inner.backoff.reset();
            inner.retry.cancel();
            inner.set_state(ConnectionState::Connected);
            inner.reader = Some(self.spawn_reader(generation, dial, events));
        }
        info!(sink = "socket", "Socket connected");
        self.flush_queue();
    }

    fn spawn_connect(&self, dial: DialKind) {
        let sink = self.clone();
        tokio::spawn(async move {
            let _ = sink.connect(dial).await;
        });
    }

    /// Watch an open socket; `dial` decides whether its close retries
    fn spawn_reader(
        &self,
        generation: u64,
        dial: DialKind,
        mut events: mpsc::UnboundedReceiver<SocketEvent>,
    ) -> JoinHandle<()> {
        let sink = self.clone();
        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                match event {
                    SocketEvent::Message { text } => {
                        debug!(sink = "socket", bytes = text.len(), "Socket received message");
                    }
                    SocketEvent::Error { message } => {
                        let level = sink.inner.lock().filter.level_for(Level::ERROR, &message);
                        log_at!(level, sink = "socket", error = %message, "Socket error");
                    }
                    SocketEvent::Closed { code, reason } => {
                        sink.on_closed(generation, dial, code, &reason);
                        break;
                    }
                }
            }
        })
    }

    /// Drop the socket and decide whether to retry
    fn on_closed(&self, generation: u64, dial: DialKind, code: Option<u16>, reason: &str) {
        let mut inner = self.inner.lock();
        if inner.generation != generation {
            return;
        }
        inner.socket = None;
        inner.reader = None;

        let message = match code {
            Some(code) => format!("WebSocket closed with status code: {code}"),
            None => "WebSocket closed".to_string(),
        };
        let level = inner.filter.level_for(Level::WARN, &message);

        if !inner.enabled || dial == DialKind::Manual {
            inner.set_state(ConnectionState::Disconnected);
            drop(inner);
            log_at!(level, sink = "socket", reason, "{}", message);
            return;
        }

        match inner.backoff.next_delay() {
            Some(delay) => {
                inner.set_state(ConnectionState::Disconnected);
                let attempt = inner.backoff.attempts();
                let sink = self.clone();
                inner
                    .retry
                    .arm(delay, move |ticket| async move { sink.on_retry_timer(ticket).await });
                drop(inner);

                let delay_ms = delay.as_millis() as u64;
                self.metrics.record_reconnect(delay_ms);
                log_at!(level, sink = "socket", reason, "{}", message);
                info!(sink = "socket", attempt, delay_ms, "Socket reconnecting");
            }
            None => {
                inner.retry.cancel();
                inner.set_state(ConnectionState::RetryExhausted);
                drop(inner);
                log_at!(level, sink = "socket", reason, "{}", message);
                warn!(
                    sink = "socket",
                    attempts = SOCKET_MAX_ATTEMPTS,
                    "Socket auto-retry stopped"
                );
            }
        }
    }

    async fn on_retry_timer(&self, ticket: u64) {
        {
            let mut inner = self.inner.lock();
            if !inner.retry.claim(ticket) || !inner.is_active() {
                return;
            }
            if inner.open_socket().is_some() {
                return;
            }
        }
        let _ = self.connect(DialKind::Auto).await;
    }

    /// Send queued frames oldest first; stop at the first failed send
    fn flush_queue(&self) {
        let mut inner = self.inner.lock();
        let Some(socket) = inner.open_socket() else {
            return;
        };

        let mut sent = 0usize;
        while let Some(message) = inner.queue.pop() {
            let result = message
                .event
                .to_json()
                .map_err(ContractError::from)
                .and_then(|frame| socket.send_text(frame));
            match result {
                Ok(()) => {
                    sent += 1;
                    self.metrics.record_outcome(&PublishOutcome::Delivered);
                }
                Err(e) => {
                    let requeued = inner.enqueue(message.event).is_ok();
                    debug!(sink = "socket", error = %e, requeued, "Socket send failed when flushing");
                    break;
                }
            }
        }
        let remaining = inner.queue.len();
        inner.metrics.set_queue_len(remaining);
        drop(inner);

        if sent > 0 {
            debug!(sink = "socket", sent, remaining, "Flushed socket queue");
        }
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
                warn!(sink = "socket", "Socket queue full, dropping message");
                self.metrics.record_outcome(&PublishOutcome::errored(e.to_string()));
                Err(e)
            }
        }
    }
}

impl<C: SocketConnector> RelaySink for SocketSink<C> {
    fn kind(&self) -> SinkKind {
        SinkKind::Socket
    }

    #[instrument(name = "socket_sink_configure", skip(self, settings))]
    fn configure(&self, settings: &RelaySettings) -> ConfigureEffect {
        let section = &settings.socket;
        let url = section.url.trim().to_string();

        let (effect, previous) = {
            let mut inner = self.inner.lock();
            let first = !inner.configured;
            let changed = first || inner.enabled != section.enabled || inner.url != url;
            inner.configured = true;
            inner.enabled = section.enabled;
            inner.url = url;
            inner.filter = NoiseFilter::new(section.verbose_logging);

            if !changed {
                (ConfigureEffect::None, None)
            } else if inner.is_active() {
                let previous = inner.supersede();
                inner.retry.cancel();
                inner.backoff.reset();
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
                    previous.close();
                }
                self.spawn_connect(DialKind::Auto);
            }
            ConfigureEffect::Disconnect => self.disconnect(),
            ConfigureEffect::None => {}
        }
        debug!(sink = "socket", effect = ?effect, "Socket configured");
        effect
    }

    #[instrument(name = "socket_sink_publish", skip(self, event), fields(direction = %event.direction))]
    async fn publish(&self, event: Event) -> Result<PublishOutcome, ContractError> {
        let (socket, event) = {
            let mut inner = self.inner.lock();
            match inner.open_socket() {
                Some(socket) => (socket, event),
                None => {
                    let queued = inner.enqueue(event);
                    let dial = inner.enabled && inner.state != ConnectionState::Connecting;
                    drop(inner);
                    if dial {
                        self.spawn_connect(DialKind::Manual);
                    }
                    return self.queued_outcome(queued);
                }
            }
        };

        let frame = match event.to_json() {
            Ok(frame) => frame,
            Err(e) => {
                let e = ContractError::from(e);
                self.metrics.record_outcome(&PublishOutcome::errored(e.to_string()));
                return Err(e);
            }
        };

        match socket.send_text(frame) {
            Ok(()) => {
                debug!(sink = "socket", "Socket sent message");
                self.metrics.record_outcome(&PublishOutcome::Delivered);
                Ok(PublishOutcome::Delivered)
            }
            Err(e) => {
                let mut inner = self.inner.lock();
                let requeued = inner.enqueue(event).is_ok();
                let level = inner.filter.level_for(Level::WARN, &e.to_string());
                drop(inner);
                log_at!(level, sink = "socket", error = %e, requeued, "Socket send error");

                let error = ContractError::delivery(SinkKind::Socket, e.to_string(), requeued);
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
            inner.set_state(ConnectionState::Disconnected);
            previous
        };
        if let Some(previous) = previous {
            previous.close();
        }
        debug!(sink = "socket", "Socket disconnected");
    }

    fn status(&self) -> SinkStatus {
        let inner = self.inner.lock();
        SinkStatus {
            kind: SinkKind::Socket,
            state: inner.state,
            queue_len: inner.queue.len(),
            reconnect_attempts: inner.backoff.attempts(),
            retry_pending: inner.retry.is_pending(),
            retry_delay_ms: inner.retry.delay_ms(),
            auto_exhausted: inner.backoff.is_exhausted(),
        }
    }
}
