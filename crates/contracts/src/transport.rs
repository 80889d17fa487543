//! Transport abstraction
//!
//! Sinks own the queueing, gating and retry policy; transports only know how
//! to open a connection, push bytes and report lifecycle changes. Real
//! WebSocket transports and scripted mocks both implement these traits.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};

use crate::{ContractError, SinkKind};

// ============================================================================
// Hub transport
// ============================================================================

/// Lifecycle notifications raised by a hub connection after it started
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HubLifecycle {
    /// Transport lost the link and is retrying on its own schedule
    Reconnecting { error: Option<String> },
    /// Transport restored the link
    Reconnected { connection_id: Option<String> },
    /// Connection is gone for good
    Closed { error: Option<String> },
}

/// Completion handle for one remote invocation
///
/// The invocation is already on the wire when this handle exists, so issue
/// order is fixed by the `invoke` call order; awaiting only observes the
/// completion.
#[must_use = "invocation completion should be observed"]
pub struct Invocation {
    rx: oneshot::Receiver<Result<(), ContractError>>,
}

impl Invocation {
    /// Create a pending invocation and the sender that completes it
    pub fn channel() -> (oneshot::Sender<Result<(), ContractError>>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    /// Create an already-completed invocation
    pub fn ready(result: Result<(), ContractError>) -> Self {
        let (tx, invocation) = Self::channel();
        let _ = tx.send(result);
        invocation
    }
}

impl Future for Invocation {
    type Output = Result<(), ContractError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ContractError::ConnectionClosed {
                sink: SinkKind::Hub,
            })),
            Poll::Pending => Poll::Pending,
        }
    }
}

/// Started hub connection
pub trait HubConnection: Clone + Send + Sync + 'static {
    /// Put an invocation of `method` with a single argument on the wire
    ///
    /// # Errors
    /// Returns error immediately when the connection cannot accept it
    fn invoke(&self, method: &str, argument: Value) -> Result<Invocation, ContractError>;

    /// Stop the connection; no lifecycle events follow except `Closed`
    fn stop(&self) -> impl Future<Output = ()> + Send;

    /// Server-assigned connection id, if any
    fn connection_id(&self) -> Option<String>;
}

/// Factory for hub connections
pub trait HubConnector: Send + Sync + 'static {
    type Connection: HubConnection;

    /// Build and start a connection to `url`
    ///
    /// Resolves once the handshake completed. Lifecycle events for this
    /// connection arrive on the returned receiver.
    fn connect(
        &self,
        url: &str,
    ) -> impl Future<
        Output = Result<(Self::Connection, mpsc::UnboundedReceiver<HubLifecycle>), ContractError>,
    > + Send;
}

// ============================================================================
// Socket transport
// ============================================================================

/// Notifications raised by an open raw socket
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SocketEvent {
    /// Text frame from the server (ignored by the relay)
    Message { text: String },
    /// Transport-level error; a `Closed` event follows
    Error { message: String },
    /// Socket closed
    Closed { code: Option<u16>, reason: String },
}

/// Open raw socket
pub trait SocketConnection: Send + Sync + 'static {
    /// Queue a text frame for sending
    ///
    /// # Errors
    /// Returns error when the socket is no longer open
    fn send_text(&self, text: String) -> Result<(), ContractError>;

    /// Whether the socket is still in the open state
    fn is_open(&self) -> bool;

    /// Begin a graceful close
    fn close(&self);
}

/// Factory for raw sockets
pub trait SocketConnector: Send + Sync + 'static {
    type Connection: SocketConnection;

    /// Dial `url`; resolves once the socket is open
    fn open(
        &self,
        url: &str,
    ) -> impl Future<
        Output = Result<(Self::Connection, mpsc::UnboundedReceiver<SocketEvent>), ContractError>,
    > + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_ready_invocation() {
        assert!(Invocation::ready(Ok(())).await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_sender_reports_closed() {
        let (tx, invocation) = Invocation::channel();
        drop(tx);
        let err = invocation.await.unwrap_err();
        assert!(matches!(err, ContractError::ConnectionClosed { sink: SinkKind::Hub }));
    }
}
