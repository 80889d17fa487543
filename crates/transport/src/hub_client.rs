//! WebSocket hub client
//!
//! Speaks the JSON hub protocol over a direct WebSocket (no negotiate
//! round-trip). A single event loop task owns the socket and handles:
//!
//! - Outgoing invocations from the sink
//! - Completion correlation by invocation id
//! - Keep-alive pings and the server timeout
//! - Automatic reconnect on link loss, reported as [`HubLifecycle`] events

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, HubConnection, HubConnector, HubLifecycle, Invocation, SinkKind,
};
use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::time::{timeout, Instant};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace, warn};
use url::Url;

use crate::endpoint::hub_socket_url;
use crate::hub_protocol::{self, ServerMessage};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Map of invocation ids to in-flight invocations.
type CorrelationMap = HashMap<String, PendingInvocation>;

struct PendingInvocation {
    method: String,
    completion: oneshot::Sender<Result<(), ContractError>>,
}

/// Hub client options
#[derive(Debug, Clone)]
pub struct HubClientOptions {
    /// Delays before each automatic reconnect attempt; empty disables it
    pub reconnect_delays: Vec<Duration>,
    /// Ping interval
    pub keep_alive: Duration,
    /// Link is considered lost after this long without any server message
    pub server_timeout: Duration,
    /// Dial plus handshake deadline
    pub handshake_timeout: Duration,
}

impl Default for HubClientOptions {
    fn default() -> Self {
        Self {
            reconnect_delays: [0, 2_000, 10_000, 30_000]
                .into_iter()
                .map(Duration::from_millis)
                .collect(),
            keep_alive: Duration::from_secs(15),
            server_timeout: Duration::from_secs(30),
            handshake_timeout: Duration::from_secs(15),
        }
    }
}

/// Connector producing [`WsHubClient`]s
#[derive(Debug, Clone, Default)]
pub struct WsHubConnector {
    options: HubClientOptions,
}

impl WsHubConnector {
    pub fn new(options: HubClientOptions) -> Self {
        Self { options }
    }
}

impl HubConnector for WsHubConnector {
    type Connection = WsHubClient;

    #[instrument(name = "hub_connect", skip(self), fields(url = %url))]
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(WsHubClient, mpsc::UnboundedReceiver<HubLifecycle>), ContractError> {
        let url = hub_socket_url(url)?;
        let (ws, leftover) = open_session(&url, &self.options).await?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            connected: AtomicBool::new(true),
            next_id: AtomicU64::new(0),
        });

        let event_loop = EventLoop {
            url,
            options: self.options.clone(),
            command_rx,
            lifecycle_tx,
            shared: Arc::clone(&shared),
            pending: CorrelationMap::new(),
        };
        tokio::spawn(event_loop.run(ws, leftover));

        debug!("Hub connection started");
        Ok((WsHubClient { command_tx, shared }, lifecycle_rx))
    }
}

struct Shared {
    connected: AtomicBool,
    next_id: AtomicU64,
}

/// Internal commands for the event loop.
enum Command {
    Invoke {
        invocation_id: String,
        method: String,
        frame: String,
        completion: oneshot::Sender<Result<(), ContractError>>,
    },
    Stop {
        done: oneshot::Sender<()>,
    },
}

/// Started hub connection handle
#[derive(Clone)]
pub struct WsHubClient {
    command_tx: mpsc::UnboundedSender<Command>,
    shared: Arc<Shared>,
}

impl std::fmt::Debug for WsHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsHubClient").finish_non_exhaustive()
    }
}

impl HubConnection for WsHubClient {
    fn invoke(&self, method: &str, argument: Value) -> Result<Invocation, ContractError> {
        if !self.shared.connected.load(Ordering::Acquire) {
            return Err(ContractError::delivery(
                SinkKind::Hub,
                "Cannot send data if the connection is not in the 'Connected' State.",
                false,
            ));
        }
        let invocation_id = self
            .shared
            .next_id
            .fetch_add(1, Ordering::Relaxed)
            .to_string();
        let frame = hub_protocol::invocation_message(&invocation_id, method, argument);
        let (completion, invocation) = Invocation::channel();
        self.command_tx
            .send(Command::Invoke {
                invocation_id,
                method: method.to_string(),
                frame,
                completion,
            })
            .map_err(|_| ContractError::ConnectionClosed {
                sink: SinkKind::Hub,
            })?;
        Ok(invocation)
    }

    async fn stop(&self) {
        let (done, wait) = oneshot::channel();
        if self.command_tx.send(Command::Stop { done }).is_ok() {
            let _ = wait.await;
        }
    }

    fn connection_id(&self) -> Option<String> {
        // Direct WebSocket sessions skip negotiation, so the server never
        // hands out an id.
        None
    }
}

/// Why a session ended
enum SessionEnd {
    Stopped(Option<oneshot::Sender<()>>),
    Lost(String),
    ServerClosed {
        error: Option<String>,
        allow_reconnect: bool,
    },
}

struct EventLoop {
    url: Url,
    options: HubClientOptions,
    command_rx: mpsc::UnboundedReceiver<Command>,
    lifecycle_tx: mpsc::UnboundedSender<HubLifecycle>,
    shared: Arc<Shared>,
    pending: CorrelationMap,
}

impl EventLoop {
    async fn run(mut self, ws: WsStream, leftover: Vec<String>) {
        let mut session = Some((ws, leftover));

        while let Some((ws, leftover)) = session.take() {
            let end = self.run_session(ws, leftover).await;
            self.shared.connected.store(false, Ordering::Release);
            self.fail_pending();

            let error = match end {
                SessionEnd::Stopped(done) => {
                    self.emit(HubLifecycle::Closed { error: None });
                    if let Some(done) = done {
                        let _ = done.send(());
                    }
                    break;
                }
                SessionEnd::ServerClosed {
                    error,
                    allow_reconnect: false,
                } => {
                    debug!(?error, "Server closed the hub connection");
                    self.emit(HubLifecycle::Closed { error });
                    break;
                }
                SessionEnd::ServerClosed { error, .. } => {
                    error.unwrap_or_else(|| "Server requested a reconnect".to_string())
                }
                SessionEnd::Lost(error) => error,
            };

            session = self.reconnect(error).await;
        }

        debug!("Hub event loop terminated");
    }

    /// Retry on the configured schedule; `None` means the loop should end.
    async fn reconnect(&mut self, error: String) -> Option<(WsStream, Vec<String>)> {
        if self.options.reconnect_delays.is_empty() {
            self.emit(HubLifecycle::Closed { error: Some(error) });
            return None;
        }

        self.emit(HubLifecycle::Reconnecting {
            error: Some(error.clone()),
        });
        let mut last_error = error;

        for (attempt, delay) in self.options.reconnect_delays.clone().into_iter().enumerate() {
            if let Some(done) = self.wait_or_stop(delay).await {
                self.emit(HubLifecycle::Closed { error: None });
                if let Some(done) = done {
                    let _ = done.send(());
                }
                return None;
            }

            debug!(attempt = attempt + 1, delay_ms = delay.as_millis() as u64, "Hub transport reconnecting");
            match open_session(&self.url, &self.options).await {
                Ok(session) => {
                    self.shared.connected.store(true, Ordering::Release);
                    self.emit(HubLifecycle::Reconnected {
                        connection_id: None,
                    });
                    return Some(session);
                }
                Err(e) => last_error = e.to_string(),
            }
        }

        self.emit(HubLifecycle::Closed {
            error: Some(last_error),
        });
        None
    }

    /// Sleep for `delay` unless a stop arrives first.
    ///
    /// Returns `Some` with the stop acknowledgement when stopped.
    async fn wait_or_stop(&mut self, delay: Duration) -> Option<Option<oneshot::Sender<()>>> {
        let deadline = Instant::now() + delay;
        loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => return None,
                command = self.command_rx.recv() => match command {
                    Some(Command::Stop { done }) => return Some(Some(done)),
                    Some(Command::Invoke { completion, .. }) => {
                        let _ = completion.send(Err(ContractError::ConnectionClosed {
                            sink: SinkKind::Hub,
                        }));
                    }
                    None => return Some(None),
                },
            }
        }
    }

    async fn run_session(&mut self, ws: WsStream, leftover: Vec<String>) -> SessionEnd {
        let (mut ws_write, mut ws_read) = ws.split();

        for frame in &leftover {
            if let Some(end) = self.handle_frame(frame) {
                return end;
            }
        }

        let keep_alive = self.options.keep_alive;
        let mut ping = tokio::time::interval_at(Instant::now() + keep_alive, keep_alive);
        let mut last_seen = Instant::now();

        loop {
            tokio::select! {
                message = ws_read.next() => {
                    last_seen = Instant::now();
                    match message {
                        Some(Ok(Message::Text(text))) => {
                            for frame in hub_protocol::split_frames(&text) {
                                if let Some(end) = self.handle_frame(frame) {
                                    return end;
                                }
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            let code = frame.map(|f| u16::from(f.code)).unwrap_or(1005);
                            return SessionEnd::Lost(format!(
                                "WebSocket closed with status code: {code}"
                            ));
                        }
                        Some(Err(e)) => return SessionEnd::Lost(e.to_string()),
                        None => return SessionEnd::Lost("WebSocket stream ended".to_string()),
                        // Binary, Ping, Pong
                        _ => {}
                    }
                }

                command = self.command_rx.recv() => match command {
                    Some(Command::Invoke { invocation_id, method, frame, completion }) => {
                        trace!(%invocation_id, "Sending invocation");
                        if let Err(e) = ws_write.send(Message::Text(frame.into())).await {
                            let _ = completion.send(Err(ContractError::delivery(
                                SinkKind::Hub,
                                e.to_string(),
                                false,
                            )));
                            return SessionEnd::Lost(e.to_string());
                        }
                        self.pending
                            .insert(invocation_id, PendingInvocation { method, completion });
                    }
                    Some(Command::Stop { done }) => {
                        debug!("Stop requested");
                        let _ = ws_write
                            .send(Message::Text(hub_protocol::close_message().into()))
                            .await;
                        let _ = ws_write.close().await;
                        return SessionEnd::Stopped(Some(done));
                    }
                    None => {
                        let _ = ws_write.close().await;
                        return SessionEnd::Stopped(None);
                    }
                },

                _ = ping.tick() => {
                    if last_seen.elapsed() >= self.options.server_timeout {
                        return SessionEnd::Lost(
                            "Server timeout elapsed without receiving a message from the server."
                                .to_string(),
                        );
                    }
                    if let Err(e) = ws_write
                        .send(Message::Text(hub_protocol::ping_message().into()))
                        .await
                    {
                        return SessionEnd::Lost(e.to_string());
                    }
                }
            }
        }
    }

    fn handle_frame(&mut self, frame: &str) -> Option<SessionEnd> {
        match hub_protocol::parse_message(frame) {
            Ok(ServerMessage::Completion {
                invocation_id,
                error,
            }) => {
                let pending = self.pending.remove(&invocation_id);
                match pending {
                    Some(PendingInvocation { method, completion }) => {
                        let result = match error {
                            None => Ok(()),
                            Some(message) => Err(ContractError::remote_invocation(
                                SinkKind::Hub,
                                method,
                                message,
                            )),
                        };
                        let _ = completion.send(result);
                    }
                    None => warn!(%invocation_id, "Completion for unknown invocation"),
                }
                None
            }
            Ok(ServerMessage::Close {
                error,
                allow_reconnect,
            }) => Some(SessionEnd::ServerClosed {
                error,
                allow_reconnect,
            }),
            Ok(ServerMessage::Ping) => None,
            Ok(ServerMessage::Invocation { target }) => {
                trace!(%target, "Ignoring server invocation");
                None
            }
            Ok(ServerMessage::Other(kind)) => {
                trace!(kind, "Ignoring hub message");
                None
            }
            Err(e) => {
                warn!(error = %e, "Malformed hub message");
                None
            }
        }
    }

    /// Fail all in-flight invocations when a session ends
    fn fail_pending(&mut self) {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.completion.send(Err(ContractError::ConnectionClosed {
                sink: SinkKind::Hub,
            }));
        }
        if count > 0 {
            debug!(count, "Failed pending invocations");
        }
    }

    fn emit(&self, event: HubLifecycle) {
        let _ = self.lifecycle_tx.send(event);
    }
}

/// Dial and complete the protocol handshake
async fn open_session(
    url: &Url,
    options: &HubClientOptions,
) -> Result<(WsStream, Vec<String>), ContractError> {
    let handshake = async {
        let (mut ws, _response) = connect_async(url.as_str())
            .await
            .map_err(|e| ContractError::handshake(SinkKind::Hub, format!("Failed to start the connection: {e}")))?;

        ws.send(Message::Text(hub_protocol::handshake_request().into()))
            .await
            .map_err(|e| ContractError::handshake(SinkKind::Hub, e.to_string()))?;

        loop {
            match ws.next().await {
                Some(Ok(Message::Text(text))) => {
                    let leftover = hub_protocol::parse_handshake_response(&text)
                        .map_err(|e| ContractError::handshake(SinkKind::Hub, e))?
                        .into_iter()
                        .map(str::to_string)
                        .collect();
                    return Ok::<_, ContractError>((ws, leftover));
                }
                Some(Ok(Message::Close(_))) | None => {
                    return Err(ContractError::handshake(
                        SinkKind::Hub,
                        "Failed to complete negotiation with the server: connection closed",
                    ))
                }
                Some(Err(e)) => {
                    return Err(ContractError::handshake(SinkKind::Hub, e.to_string()))
                }
                _ => {}
            }
        }
    };

    timeout(options.handshake_timeout, handshake)
        .await
        .map_err(|_| {
            ContractError::handshake(
                SinkKind::Hub,
                "Failed to complete negotiation with the server: handshake timed out",
            )
        })?
}
