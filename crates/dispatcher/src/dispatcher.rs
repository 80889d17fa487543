//! Dispatcher - direction gating and fan-out to both sinks

use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, instrument};

use contracts::{
    CapturedEvent, ConfigureEffect, DispatchReport, EnsureConnected, Event, HubConnector,
    PublishOutcome, RelaySettings, RelaySink, RelayStatus,
};
use observability::{RelayStatsAggregator, RelaySummary};

use crate::channel::resolve_channel;
use crate::sinks::HubSink;

/// What a settings snapshot set in motion on each sink
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedSettings {
    pub hub: ConfigureEffect,
    pub socket: ConfigureEffect,
}

/// Routes captured events to the hub and socket sinks
///
/// Sinks are injected by the host; the dispatcher only keeps the latest
/// settings snapshot for gating.
#[derive(Clone)]
pub struct Dispatcher<H, S> {
    hub: H,
    socket: S,
    settings: Arc<RwLock<RelaySettings>>,
}

impl<H, S> Dispatcher<H, S>
where
    H: RelaySink + Clone + Send + Sync + 'static,
    S: RelaySink + Clone + Send + Sync + 'static,
{
    /// Create a dispatcher with default (all disabled) settings
    pub fn new(hub: H, socket: S) -> Self {
        Self {
            hub,
            socket,
            settings: Arc::new(RwLock::new(RelaySettings::default())),
        }
    }

    pub fn hub(&self) -> &H {
        &self.hub
    }

    pub fn socket(&self) -> &S {
        &self.socket
    }

    pub fn settings(&self) -> RelaySettings {
        self.settings.read().clone()
    }

    /// Store a settings snapshot and reconfigure both sinks
    #[instrument(name = "dispatcher_apply_settings", skip(self, settings))]
    pub fn apply_settings(&self, settings: RelaySettings) -> AppliedSettings {
        *self.settings.write() = settings.clone();
        let applied = AppliedSettings {
            hub: self.hub.configure(&settings),
            socket: self.socket.configure(&settings),
        };
        info!(
            hub = ?applied.hub,
            socket = ?applied.socket,
            "Settings applied"
        );
        applied
    }

    /// Publish one captured event to every sink whose gate allows it
    ///
    /// Sinks are driven concurrently; a failure in one is reported in its
    /// slot and never affects the other.
    #[instrument(
        name = "dispatcher_dispatch",
        skip(self, captured),
        fields(direction = %captured.direction)
    )]
    pub async fn dispatch(&self, captured: CapturedEvent) -> DispatchReport {
        let (hub_gate, socket_gate) = {
            let settings = self.settings.read();
            (settings.hub.gate(), settings.socket.gate())
        };
        let to_hub = hub_gate.allows(captured.direction);
        let to_socket = socket_gate.allows(captured.direction);
        let channel = resolve_channel(&captured);

        if !to_hub && !to_socket {
            observability::record_event_gated();
            debug!(channel = channel.as_deref().unwrap_or("-"), "No sink enabled for event");
            return DispatchReport::disabled(channel);
        }

        let event = Event::from_captured(captured, channel.clone());
        let hub_publish = async {
            if to_hub {
                Some(PublishOutcome::from(self.hub.publish(event.clone()).await))
            } else {
                None
            }
        };
        let socket_publish = async {
            if to_socket {
                Some(PublishOutcome::from(self.socket.publish(event.clone()).await))
            } else {
                None
            }
        };
        let (hub, socket) = tokio::join!(hub_publish, socket_publish);

        debug!(
            channel = channel.as_deref().unwrap_or("-"),
            hub = hub.as_ref().map_or("skipped", PublishOutcome::as_str),
            socket = socket.as_ref().map_or("skipped", PublishOutcome::as_str),
            "Event dispatched"
        );

        DispatchReport {
            published: true,
            reason: None,
            channel,
            hub,
            socket,
        }
    }

    pub fn status(&self) -> RelayStatus {
        RelayStatus::new(self.hub.status(), self.socket.status(), self.settings())
    }

    /// Disconnect both sinks
    pub fn shutdown(&self) {
        self.hub.disconnect();
        self.socket.disconnect();
    }

    /// Run the dispatcher main loop
    ///
    /// Dispatches captured events in arrival order and applies every settings
    /// snapshot published on `settings`. Returns when the event channel is
    /// closed, after disconnecting both sinks.
    #[instrument(name = "dispatcher_run", skip_all)]
    pub async fn run(
        self,
        mut events: mpsc::Receiver<CapturedEvent>,
        mut settings: watch::Receiver<RelaySettings>,
    ) -> RelaySummary {
        let initial = settings.borrow_and_update().clone();
        self.apply_settings(initial);
        info!("Dispatcher started");

        let mut stats = RelayStatsAggregator::new();
        let mut watching = true;

        loop {
            tokio::select! {
                biased;

                changed = settings.changed(), if watching => {
                    if changed.is_ok() {
                        let snapshot = settings.borrow_and_update().clone();
                        self.apply_settings(snapshot);
                    } else {
                        debug!("Settings source closed, keeping current snapshot");
                        watching = false;
                    }
                }

                captured = events.recv() => {
                    let Some(captured) = captured else {
                        break;
                    };
                    let started = Instant::now();
                    let report = self.dispatch(captured).await;
                    let latency_ms = started.elapsed().as_secs_f64() * 1000.0;
                    observability::record_dispatch_latency_ms(latency_ms);
                    stats.update(&report, latency_ms);

                    if stats.total_events % 100 == 0 {
                        debug!(events = stats.total_events, "Dispatcher progress");
                    }
                }
            }
        }

        info!(
            events = stats.total_events,
            "Dispatcher input closed, shutting down"
        );
        self.shutdown();
        info!("Dispatcher shutdown complete");

        stats.summary()
    }

    /// Spawn the dispatcher as a background task
    pub fn spawn(
        self,
        events: mpsc::Receiver<CapturedEvent>,
        settings: watch::Receiver<RelaySettings>,
    ) -> JoinHandle<RelaySummary> {
        tokio::spawn(async move { self.run(events, settings).await })
    }
}

impl<C, S> Dispatcher<HubSink<C>, S>
where
    C: HubConnector,
    S: RelaySink + Clone + Send + Sync + 'static,
{
    /// Explicit request to bring the hub up
    pub fn ensure_hub_connected(&self) -> EnsureConnected {
        self.hub.ensure_connected()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sinks::SocketSink;
    use contracts::{ConnectionState, Direction, HubSettings, SkipReason, SocketSettings};
    use std::time::Duration;
    use transport::{MockHubConnector, MockSocketConnector};

    type MockDispatcher = Dispatcher<HubSink<MockHubConnector>, SocketSink<MockSocketConnector>>;

    fn dispatcher(hub: &MockHubConnector, socket: &MockSocketConnector) -> MockDispatcher {
        Dispatcher::new(HubSink::new(hub.clone()), SocketSink::new(socket.clone()))
    }

    fn hub_only() -> RelaySettings {
        RelaySettings {
            hub: HubSettings {
                enabled: true,
                url: "wss://hub.test/relay".into(),
                publish_incoming: true,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    fn captured(direction: Direction, text: &str) -> CapturedEvent {
        CapturedEvent::now(direction, "wss://origin.test/ws", Some(text.into()))
    }

    async fn settle() {
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_enabled_is_disabled() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);

        let report = dispatcher
            .dispatch(captured(Direction::Incoming, r#"{"channel":"lobby"}"#))
            .await;
        assert!(!report.published);
        assert_eq!(report.reason, Some(SkipReason::Disabled));
        assert_eq!(report.channel.as_deref(), Some("lobby"));
        assert_eq!(hub.connect_count() + socket.open_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_incoming_queued_while_hub_down() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        hub.refuse_all(Some("Failed to fetch"));
        let dispatcher = dispatcher(&hub, &socket);
        dispatcher.apply_settings(hub_only());
        settle().await;

        let report = dispatcher.dispatch(captured(Direction::Incoming, "tick")).await;
        assert!(report.published);
        assert_eq!(report.hub, Some(PublishOutcome::Queued));
        assert_eq!(report.socket, None);
        assert_eq!(dispatcher.status().hub.queue_len, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direction_gate() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        dispatcher.apply_settings(hub_only());
        settle().await;

        let report = dispatcher.dispatch(captured(Direction::Outgoing, "x")).await;
        assert!(!report.published);
        assert_eq!(socket.open_count(), 0);
        assert!(hub.invocations().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_one_sink_failure_does_not_affect_other() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        let mut settings = hub_only();
        settings.socket = SocketSettings {
            enabled: true,
            url: "ws://localhost:9/feed".into(),
            publish_incoming: true,
            ..Default::default()
        };
        dispatcher.apply_settings(settings);
        settle().await;

        hub.fail_next_invokes(1);
        let report = dispatcher
            .dispatch(captured(Direction::Incoming, r#"{"topic":"ignored","channel":"c1"}"#))
            .await;
        assert!(matches!(report.hub, Some(PublishOutcome::Errored { .. })));
        assert_eq!(report.socket, Some(PublishOutcome::Delivered));
        assert_eq!(report.channel.as_deref(), Some("c1"));

        let frame: serde_json::Value = serde_json::from_str(&socket.sent_frames()[0]).unwrap();
        assert_eq!(frame["channel"], "c1");
    }

    #[tokio::test(start_paused = true)]
    async fn test_disabled_socket_ignores_outgoing_flag() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        dispatcher.apply_settings(RelaySettings {
            socket: SocketSettings {
                enabled: false,
                url: "ws://localhost:9/feed".into(),
                publish_outgoing: true,
                ..Default::default()
            },
            ..Default::default()
        });
        settle().await;

        let report = dispatcher
            .dispatch(captured(Direction::Outgoing, "subscribe"))
            .await;
        assert!(!report.published);
        assert_eq!(report.socket, None);
        assert_eq!(report.reason, Some(SkipReason::Disabled));
        assert_eq!(socket.open_count(), 0);
        assert!(socket.sent_frames().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_hub_does_not_stall_socket() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        let mut settings = hub_only();
        settings.socket = SocketSettings {
            enabled: true,
            url: "ws://localhost:9/feed".into(),
            publish_incoming: true,
            ..Default::default()
        };
        let (_settings_tx, settings_rx) = watch::channel(settings);
        let (events_tx, events_rx) = mpsc::channel(16);
        let task = dispatcher.clone().spawn(events_rx, settings_rx);
        settle().await;

        // Hub invocations never complete
        hub.hold_invocations(true);
        for n in 0..3 {
            events_tx
                .send(captured(Direction::Incoming, &format!("tick {n}")))
                .await
                .unwrap();
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        settle().await;

        assert_eq!(socket.sent_frames().len(), 3);
        assert_eq!(hub.held_count(), 3);
        assert_eq!(dispatcher.status().hub_state, ConnectionState::Connected);

        drop(events_tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.socket.delivered, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_settings_and_states() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        dispatcher.apply_settings(hub_only());
        settle().await;

        let status = dispatcher.status();
        assert_eq!(status.hub_state, ConnectionState::Connected);
        assert_eq!(status.socket_state, ConnectionState::Disconnected);
        assert!(!status.socket_auto_exhausted);
        assert_eq!(status.settings, hub_only());
        assert_eq!(dispatcher.ensure_hub_connected(), EnsureConnected::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_applies_updates_and_shuts_down() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let dispatcher = dispatcher(&hub, &socket);
        let (settings_tx, settings_rx) = watch::channel(RelaySettings::default());
        let (events_tx, events_rx) = mpsc::channel(16);
        let task = dispatcher.clone().spawn(events_rx, settings_rx);

        events_tx.send(captured(Direction::Incoming, "gated")).await.unwrap();
        settle().await;

        settings_tx.send(hub_only()).unwrap();
        settle().await;
        events_tx.send(captured(Direction::Incoming, "sent")).await.unwrap();
        settle().await;

        drop(events_tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.total_events, 2);
        assert_eq!(summary.gated_events, 1);
        assert_eq!(summary.hub.delivered, 1);

        settle().await;
        assert_eq!(dispatcher.status().hub_state, ConnectionState::Disconnected);
        assert_eq!(hub.live_connections(), 0);
    }
}
