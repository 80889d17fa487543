//! # Integration Tests
//!
//! 基于 mock 传输层的端到端测试。
//!
//! 覆盖：
//! - Wire shape of published events
//! - Settings store → dispatcher → sinks
//! - Outage and recovery of both sinks
//! - Capture feed → dispatcher

#[cfg(test)]
mod contract_tests {
    use contracts::{CapturedEvent, Direction, Event, Payload};

    #[test]
    fn test_event_wire_shape() {
        let captured = CapturedEvent::now(
            Direction::Outgoing,
            "wss://origin.test/ws",
            Some(Payload::Binary),
        );
        let event = Event::from_captured(captured, None);
        let value = event.to_value().unwrap();

        assert_eq!(value["direction"], "outgoing");
        assert_eq!(value["url"], "wss://origin.test/ws");
        assert_eq!(value["rawPayload"], "(binary data)");
        assert!(value["channel"].is_null());
        assert!(value.get("timestamp").is_some());
        assert!(value.get("origin").is_none());
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::time::Duration;

    use config_loader::SettingsStore;
    use contracts::{
        CapturedEvent, ConnectionState, Direction, HubLifecycle, HubSettings, PublishOutcome,
        RelaySettings, SocketSettings,
    };
    use dispatcher::{pump, Dispatcher, HubSink, SocketSink};
    use serde_json::json;
    use tokio::sync::mpsc;
    use transport::{MockHubConnector, MockSocketConnector};

    type MockDispatcher = Dispatcher<HubSink<MockHubConnector>, SocketSink<MockSocketConnector>>;

    const HUB_URL: &str = "wss://hub.test/relay";
    const SOCKET_URL: &str = "ws://127.0.0.1:9000/feed";

    fn dispatcher(hub: &MockHubConnector, socket: &MockSocketConnector) -> MockDispatcher {
        Dispatcher::new(HubSink::new(hub.clone()), SocketSink::new(socket.clone()))
    }

    fn both_sinks() -> RelaySettings {
        RelaySettings {
            hub: HubSettings {
                enabled: true,
                url: HUB_URL.into(),
                publish_incoming: true,
                publish_outgoing: true,
                ..Default::default()
            },
            socket: SocketSettings {
                enabled: true,
                url: SOCKET_URL.into(),
                publish_incoming: true,
                ..Default::default()
            },
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

    /// Settings store -> running dispatcher -> both sinks
    #[tokio::test(start_paused = true)]
    async fn test_store_drives_running_dispatcher() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let relay = dispatcher(&hub, &socket);
        let store = SettingsStore::default();
        let (events_tx, events_rx) = mpsc::channel(16);
        let task = relay.clone().spawn(events_rx, store.subscribe());
        settle().await;
        assert_eq!(hub.connect_count() + socket.open_count(), 0);

        store.replace(both_sinks()).unwrap();
        settle().await;
        assert_eq!(relay.status().hub_state, ConnectionState::Connected);
        assert_eq!(relay.status().socket_state, ConnectionState::Connected);

        events_tx
            .send(captured(Direction::Incoming, r#"{"channel":"quotes","px":1}"#))
            .await
            .unwrap();
        events_tx
            .send(captured(Direction::Outgoing, "subscribe:quotes"))
            .await
            .unwrap();
        settle().await;

        let invocations = hub.invocations();
        assert_eq!(invocations.len(), 2);
        assert_eq!(invocations[0].method, "Publish");
        assert_eq!(invocations[0].argument["channel"], "quotes");
        assert_eq!(invocations[1].argument["direction"], "outgoing");

        // Outgoing traffic is gated out of the socket
        let frames = socket.sent_frames();
        assert_eq!(frames.len(), 1);
        let frame: serde_json::Value = serde_json::from_str(&frames[0]).unwrap();
        assert_eq!(frame["direction"], "incoming");

        // A method change applies to the next invocation without reconnecting
        let changed = store
            .apply_changes([("hub.method", json!("Capture"))])
            .unwrap();
        assert_eq!(changed, vec!["hub.method"]);
        settle().await;
        events_tx
            .send(captured(Direction::Incoming, "tick"))
            .await
            .unwrap();
        settle().await;
        assert_eq!(hub.connect_count(), 1);
        assert_eq!(hub.invocations()[2].method, "Capture");

        // Disabling the hub tears it down, the socket keeps relaying
        store
            .apply_changes([("hub.enabled", json!(false))])
            .unwrap();
        settle().await;
        assert_eq!(hub.live_connections(), 0);
        events_tx
            .send(captured(Direction::Incoming, "after"))
            .await
            .unwrap();
        settle().await;
        assert_eq!(hub.invocations().len(), 3);
        assert_eq!(socket.sent_frames().len(), 3);

        drop(events_tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.total_events, 4);
        assert_eq!(summary.hub.delivered, 3);
        assert_eq!(summary.socket.delivered, 3);
        assert_eq!(summary.socket.skipped, 1);
        assert_eq!(summary.channel_counts.get("quotes"), Some(&1));
    }

    /// Hub outage: events queue up and flush in order after the backoff
    #[tokio::test(start_paused = true)]
    async fn test_hub_outage_and_recovery() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        hub.push_connect_result(Err("Failed to fetch"));
        let relay = dispatcher(&hub, &socket);
        let mut settings = both_sinks();
        settings.socket.enabled = false;
        relay.apply_settings(settings);
        settle().await;

        let status = relay.status();
        assert_eq!(status.hub_state, ConnectionState::Disconnected);
        assert!(status.hub.retry_pending);
        assert_eq!(status.hub.reconnect_attempts, 1);

        for text in ["one", "two", "three"] {
            let report = relay.dispatch(captured(Direction::Incoming, text)).await;
            assert_eq!(report.hub, Some(PublishOutcome::Queued));
        }
        assert_eq!(relay.status().hub.queue_len, 3);

        // First retry lands within 2 s +/- 30 %
        tokio::time::sleep(Duration::from_millis(2_700)).await;
        settle().await;

        let status = relay.status();
        assert_eq!(status.hub_state, ConnectionState::Connected);
        assert_eq!(status.hub.queue_len, 0);
        assert_eq!(status.hub.reconnect_attempts, 0);
        let payloads: Vec<_> = hub
            .invocations()
            .iter()
            .map(|i| i.argument["rawPayload"].clone())
            .collect();
        assert_eq!(payloads, vec![json!("one"), json!("two"), json!("three")]);

        // Transport-level reconnect: queue while reconnecting, flush after
        hub.emit(HubLifecycle::Reconnecting { error: None });
        settle().await;
        assert_eq!(relay.status().hub_state, ConnectionState::Reconnecting);
        let report = relay.dispatch(captured(Direction::Incoming, "four")).await;
        assert_eq!(report.hub, Some(PublishOutcome::Queued));

        hub.emit(HubLifecycle::Reconnected { connection_id: None });
        settle().await;
        assert_eq!(relay.status().hub_state, ConnectionState::Connected);
        assert_eq!(hub.invocations().len(), 4);
        assert_eq!(hub.connect_count(), 2);
    }

    /// Socket outage: auto-retry stops at the ceiling, new traffic dials again
    #[tokio::test(start_paused = true)]
    async fn test_socket_exhaustion_and_manual_recovery() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        socket.refuse_all(Some("connection refused"));
        let relay = dispatcher(&hub, &socket);
        let mut settings = both_sinks();
        settings.hub.enabled = false;
        relay.apply_settings(settings);
        settle().await;

        tokio::time::sleep(Duration::from_secs(10 * 60)).await;
        settle().await;

        let status = relay.status();
        assert_eq!(status.socket_state, ConnectionState::RetryExhausted);
        assert!(status.socket_auto_exhausted);
        assert_eq!(status.socket_auto_attempts, 6);
        assert_eq!(socket.open_count(), 7);

        socket.refuse_all(None);
        let report = relay.dispatch(captured(Direction::Incoming, "wake")).await;
        assert_eq!(report.socket, Some(PublishOutcome::Queued));
        settle().await;

        let status = relay.status();
        assert_eq!(status.socket_state, ConnectionState::Connected);
        assert!(!status.socket_auto_exhausted);
        assert_eq!(status.socket.queue_len, 0);
        assert_eq!(socket.sent_frames().len(), 1);

        // The manually dialed socket stays down after a server close
        socket.close_current(1006, "abnormal");
        settle().await;
        let status = relay.status();
        assert_eq!(status.socket_state, ConnectionState::Disconnected);
        assert!(!status.socket.retry_pending);
        assert_eq!(status.socket.retry_delay_ms, None);
        tokio::time::sleep(Duration::from_secs(60)).await;
        settle().await;
        assert_eq!(socket.open_count(), 8);

        // Until the next event dials again
        let report = relay.dispatch(captured(Direction::Incoming, "again")).await;
        assert_eq!(report.socket, Some(PublishOutcome::Queued));
        settle().await;
        assert_eq!(relay.status().socket_state, ConnectionState::Connected);
        assert_eq!(socket.open_count(), 9);
        assert_eq!(socket.sent_frames().len(), 2);
    }

    /// Capture feed -> dispatcher -> socket
    #[tokio::test(start_paused = true)]
    async fn test_feed_pump_end_to_end() {
        let (hub, socket) = (MockHubConnector::new(), MockSocketConnector::new());
        let relay = dispatcher(&hub, &socket);
        let mut settings = both_sinks();
        settings.hub.enabled = false;
        let store = SettingsStore::new(settings);

        let (events_tx, events_rx) = mpsc::channel(4);
        let task = relay.clone().spawn(events_rx, store.subscribe());
        settle().await;

        let feed = concat!(
            r#"{"direction":"incoming","url":"wss://a.test","rawPayload":"{\"channel\":\"trade\",\"v\":1}","timestamp":"2024-05-01T12:00:00Z"}"#,
            "\n",
            r#"{"direction":"incoming","url":"wss://a.test","rawPayload":{"topic":"book"},"timestamp":"2024-05-01T12:00:01Z","channel":"  "}"#,
            "\n",
            "{broken\n",
            r#"{"direction":"incoming","url":"wss://a.test","rawPayload":"(binary data)","timestamp":"2024-05-01T12:00:02Z","channel":"pre"}"#,
            "\n",
        );

        let stats = pump(feed.as_bytes(), &events_tx).await.unwrap();
        assert_eq!(stats.forwarded, 3);
        assert_eq!(stats.rejected, 1);

        drop(events_tx);
        let summary = task.await.unwrap();
        assert_eq!(summary.total_events, 3);
        assert_eq!(summary.with_channel, 3);

        let channels: Vec<String> = socket
            .sent_frames()
            .iter()
            .map(|frame| {
                let value: serde_json::Value = serde_json::from_str(frame).unwrap();
                value["channel"].as_str().unwrap_or_default().to_string()
            })
            .collect();
        assert_eq!(channels, vec!["trade", "book", "pre"]);
        assert_eq!(hub.connect_count(), 0);
    }
}
