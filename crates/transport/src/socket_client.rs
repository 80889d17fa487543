//! Raw WebSocket client
//!
//! One task owns the socket: it writes queued text frames and turns
//! everything the server does into [`SocketEvent`]s.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{ContractError, SinkKind, SocketConnection, SocketConnector, SocketEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, instrument, trace};

use crate::endpoint::socket_url;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Abnormal closure, reported when no close frame was received.
const ABNORMAL_CLOSURE: u16 = 1006;

/// Connector producing [`WsSocket`]s
#[derive(Debug, Clone)]
pub struct WsSocketConnector {
    connect_timeout: Duration,
}

impl Default for WsSocketConnector {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(15),
        }
    }
}

impl WsSocketConnector {
    pub fn new(connect_timeout: Duration) -> Self {
        Self { connect_timeout }
    }
}

impl SocketConnector for WsSocketConnector {
    type Connection = WsSocket;

    #[instrument(name = "socket_open", skip(self), fields(url = %url))]
    async fn open(
        &self,
        url: &str,
    ) -> Result<(WsSocket, mpsc::UnboundedReceiver<SocketEvent>), ContractError> {
        let url = socket_url(url)?;
        let (ws, _response) = timeout(self.connect_timeout, connect_async(url.as_str()))
            .await
            .map_err(|_| ContractError::handshake(SinkKind::Socket, "connect timed out"))?
            .map_err(|e| ContractError::handshake(SinkKind::Socket, e.to_string()))?;

        let (frame_tx, frame_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));

        tokio::spawn(run_socket(ws, frame_rx, event_tx, Arc::clone(&open)));

        debug!("Socket open");
        Ok((WsSocket { frame_tx, open }, event_rx))
    }
}

enum Outbound {
    Text(String),
    Close,
}

/// Open socket handle
pub struct WsSocket {
    frame_tx: mpsc::UnboundedSender<Outbound>,
    open: Arc<AtomicBool>,
}

impl std::fmt::Debug for WsSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsSocket").finish_non_exhaustive()
    }
}

impl SocketConnection for WsSocket {
    fn send_text(&self, text: String) -> Result<(), ContractError> {
        if !self.is_open() {
            return Err(ContractError::ConnectionClosed {
                sink: SinkKind::Socket,
            });
        }
        self.frame_tx
            .send(Outbound::Text(text))
            .map_err(|_| ContractError::ConnectionClosed {
                sink: SinkKind::Socket,
            })
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        self.open.store(false, Ordering::Release);
        let _ = self.frame_tx.send(Outbound::Close);
    }
}

impl Drop for WsSocket {
    fn drop(&mut self) {
        let _ = self.frame_tx.send(Outbound::Close);
    }
}

async fn run_socket(
    ws: WsStream,
    mut frame_rx: mpsc::UnboundedReceiver<Outbound>,
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    open: Arc<AtomicBool>,
) {
    let (mut ws_write, mut ws_read) = ws.split();
    let emit = |event: SocketEvent| {
        if matches!(event, SocketEvent::Closed { .. }) {
            open.store(false, Ordering::Release);
        }
        let _ = event_tx.send(event);
    };

    loop {
        tokio::select! {
            message = ws_read.next() => match message {
                Some(Ok(Message::Text(text))) => {
                    emit(SocketEvent::Message { text: text.to_string() });
                }
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = frame
                        .map(|f| (u16::from(f.code), f.reason.to_string()))
                        .unwrap_or((1005, String::new()));
                    emit(SocketEvent::Closed { code: Some(code), reason });
                    break;
                }
                Some(Err(e)) => {
                    emit(SocketEvent::Error { message: e.to_string() });
                    emit(SocketEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: String::new(),
                    });
                    break;
                }
                None => {
                    emit(SocketEvent::Closed {
                        code: Some(ABNORMAL_CLOSURE),
                        reason: String::new(),
                    });
                    break;
                }
                // Binary, Ping, Pong
                _ => {}
            },

            outbound = frame_rx.recv() => match outbound {
                Some(Outbound::Text(text)) => {
                    trace!(len = text.len(), "Sending frame");
                    if let Err(e) = ws_write.send(Message::Text(text.into())).await {
                        emit(SocketEvent::Error { message: e.to_string() });
                        emit(SocketEvent::Closed {
                            code: Some(ABNORMAL_CLOSURE),
                            reason: String::new(),
                        });
                        break;
                    }
                }
                Some(Outbound::Close) | None => {
                    let _ = ws_write.close().await;
                    emit(SocketEvent::Closed { code: Some(1000), reason: String::new() });
                    break;
                }
            },
        }
    }

    debug!("Socket task terminated");
}
