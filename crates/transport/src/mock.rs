//! Mock 传输层
//!
//! 用于单元测试和端到端测试的脚本化内存连接器，支持注入连接、调用和发送失败。
//! Every connection a
//! mock hands out stays reachable through the connector so tests can raise
//! lifecycle events on it later.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use contracts::{
    ContractError, HubConnection, HubConnector, HubLifecycle, Invocation, SinkKind,
    SocketConnection, SocketConnector, SocketEvent,
};
use parking_lot::Mutex;
use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tracing::instrument;

/// Dial outcome script shared by both mocks
#[derive(Debug, Default)]
struct DialScript {
    queued: VecDeque<Result<(), String>>,
    refuse_all: Option<String>,
    delay: Option<Duration>,
}

impl DialScript {
    fn next(&mut self) -> Result<(), String> {
        match self.queued.pop_front() {
            Some(result) => result,
            None => match &self.refuse_all {
                Some(message) => Err(message.clone()),
                None => Ok(()),
            },
        }
    }
}

// ============================================================================
// Hub
// ============================================================================

/// Invocation observed by the mock hub
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedInvocation {
    /// Index of the connection it was issued on
    pub connection: usize,
    pub method: String,
    pub argument: Value,
}

#[derive(Default)]
struct HubState {
    script: DialScript,
    dialed: Vec<String>,
    invocations: Vec<RecordedInvocation>,
    fail_invokes: usize,
    reject_invokes: usize,
    hold_invokes: bool,
    held: Vec<oneshot::Sender<Result<(), ContractError>>>,
    links: Vec<HubLink>,
    stops: usize,
}

struct HubLink {
    lifecycle_tx: mpsc::UnboundedSender<HubLifecycle>,
    live: Arc<AtomicBool>,
}

/// Mock hub connector
#[derive(Clone, Default)]
pub struct MockHubConnector {
    state: Arc<Mutex<HubState>>,
}

impl MockHubConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next dial; `Err` carries the failure message
    pub fn push_connect_result(&self, result: Result<(), &str>) {
        self.state
            .lock()
            .script
            .queued
            .push_back(result.map_err(str::to_string));
    }

    /// Refuse every dial not covered by a queued result
    pub fn refuse_all(&self, message: Option<&str>) {
        self.state.lock().script.refuse_all = message.map(str::to_string);
    }

    /// Delay every dial by `delay`
    pub fn set_connect_delay(&self, delay: Option<Duration>) {
        self.state.lock().script.delay = delay;
    }

    /// Make the next `count` invocations fail before reaching the wire
    pub fn fail_next_invokes(&self, count: usize) {
        self.state.lock().fail_invokes = count;
    }

    /// Make the next `count` invocations complete with a remote error
    pub fn reject_next_invokes(&self, count: usize) {
        self.state.lock().reject_invokes = count;
    }

    /// Leave accepted invocations uncompleted until [`Self::release_held`]
    pub fn hold_invocations(&self, hold: bool) {
        self.state.lock().hold_invokes = hold;
    }

    /// Number of invocations waiting on a completion
    pub fn held_count(&self) -> usize {
        self.state.lock().held.len()
    }

    /// Complete every held invocation successfully, oldest first
    pub fn release_held(&self) {
        let held = std::mem::take(&mut self.state.lock().held);
        for tx in held {
            let _ = tx.send(Ok(()));
        }
    }

    /// Number of dials attempted
    pub fn connect_count(&self) -> usize {
        self.state.lock().dialed.len()
    }

    /// URLs dialed, in order
    pub fn dialed_urls(&self) -> Vec<String> {
        self.state.lock().dialed.clone()
    }

    /// Invocations accepted onto the wire, in issue order
    pub fn invocations(&self) -> Vec<RecordedInvocation> {
        self.state.lock().invocations.clone()
    }

    /// Number of `stop` calls observed
    pub fn stop_count(&self) -> usize {
        self.state.lock().stops
    }

    /// Number of connections started and not stopped
    pub fn live_connections(&self) -> usize {
        self.state
            .lock()
            .links
            .iter()
            .filter(|l| l.live.load(Ordering::Acquire))
            .count()
    }

    /// Raise a lifecycle event on the most recent connection
    pub fn emit(&self, event: HubLifecycle) {
        let state = self.state.lock();
        if let Some(link) = state.links.last() {
            if matches!(event, HubLifecycle::Closed { .. }) {
                link.live.store(false, Ordering::Release);
            }
            let _ = link.lifecycle_tx.send(event);
        }
    }
}

impl HubConnector for MockHubConnector {
    type Connection = MockHubConnection;

    #[instrument(name = "mock_hub_connect", skip(self), fields(url = %url))]
    async fn connect(
        &self,
        url: &str,
    ) -> Result<(MockHubConnection, mpsc::UnboundedReceiver<HubLifecycle>), ContractError> {
        let (result, delay) = {
            let mut state = self.state.lock();
            state.dialed.push(url.to_string());
            (state.script.next(), state.script.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Err(message) = result {
            return Err(ContractError::handshake(SinkKind::Hub, message));
        }

        let (lifecycle_tx, lifecycle_rx) = mpsc::unbounded_channel();
        let live = Arc::new(AtomicBool::new(true));
        let index = {
            let mut state = self.state.lock();
            state.links.push(HubLink {
                lifecycle_tx,
                live: Arc::clone(&live),
            });
            state.links.len() - 1
        };

        let connection = MockHubConnection {
            state: Arc::clone(&self.state),
            index,
            live,
        };
        Ok((connection, lifecycle_rx))
    }
}

/// Connection handed out by [`MockHubConnector`]
#[derive(Clone)]
pub struct MockHubConnection {
    state: Arc<Mutex<HubState>>,
    index: usize,
    live: Arc<AtomicBool>,
}

impl HubConnection for MockHubConnection {
    fn invoke(&self, method: &str, argument: Value) -> Result<Invocation, ContractError> {
        let mut state = self.state.lock();
        if !self.live.load(Ordering::Acquire) {
            return Err(ContractError::ConnectionClosed {
                sink: SinkKind::Hub,
            });
        }
        if state.fail_invokes > 0 {
            state.fail_invokes -= 1;
            return Err(ContractError::delivery(
                SinkKind::Hub,
                "mock invoke failure",
                false,
            ));
        }
        state.invocations.push(RecordedInvocation {
            connection: self.index,
            method: method.to_string(),
            argument,
        });
        if state.reject_invokes > 0 {
            state.reject_invokes -= 1;
            return Ok(Invocation::ready(Err(ContractError::remote_invocation(
                SinkKind::Hub,
                method,
                "mock remote error",
            ))));
        }
        if state.hold_invokes {
            let (tx, invocation) = Invocation::channel();
            state.held.push(tx);
            return Ok(invocation);
        }
        Ok(Invocation::ready(Ok(())))
    }

    async fn stop(&self) {
        let mut state = self.state.lock();
        state.stops += 1;
        if self.live.swap(false, Ordering::AcqRel) {
            if let Some(link) = state.links.get(self.index) {
                let _ = link.lifecycle_tx.send(HubLifecycle::Closed { error: None });
            }
        }
    }

    fn connection_id(&self) -> Option<String> {
        Some(format!("mock-{}", self.index))
    }
}

// ============================================================================
// Socket
// ============================================================================

#[derive(Default)]
struct SocketState {
    script: DialScript,
    dialed: Vec<String>,
    sent: Vec<String>,
    fail_sends: usize,
    links: Vec<SocketLink>,
    closes: usize,
}

struct SocketLink {
    event_tx: mpsc::UnboundedSender<SocketEvent>,
    open: Arc<AtomicBool>,
}

impl SocketLink {
    fn close(&self, code: u16, reason: &str) {
        if self.open.swap(false, Ordering::AcqRel) {
            let _ = self.event_tx.send(SocketEvent::Closed {
                code: Some(code),
                reason: reason.to_string(),
            });
        }
    }
}

/// Mock raw socket connector
#[derive(Clone, Default)]
pub struct MockSocketConnector {
    state: Arc<Mutex<SocketState>>,
}

impl MockSocketConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue the outcome of the next dial; `Err` carries the failure message
    pub fn push_open_result(&self, result: Result<(), &str>) {
        self.state
            .lock()
            .script
            .queued
            .push_back(result.map_err(str::to_string));
    }

    /// Refuse every dial not covered by a queued result
    pub fn refuse_all(&self, message: Option<&str>) {
        self.state.lock().script.refuse_all = message.map(str::to_string);
    }

    /// Delay every dial by `delay`
    pub fn set_open_delay(&self, delay: Option<Duration>) {
        self.state.lock().script.delay = delay;
    }

    /// Make the next `count` sends fail
    pub fn fail_next_sends(&self, count: usize) {
        self.state.lock().fail_sends = count;
    }

    /// Number of dials attempted
    pub fn open_count(&self) -> usize {
        self.state.lock().dialed.len()
    }

    /// Frames accepted for sending, in order
    pub fn sent_frames(&self) -> Vec<String> {
        self.state.lock().sent.clone()
    }

    /// Number of client-initiated closes
    pub fn close_count(&self) -> usize {
        self.state.lock().closes
    }

    /// Whether the most recent socket is still open
    pub fn is_current_open(&self) -> bool {
        self.state
            .lock()
            .links
            .last()
            .is_some_and(|l| l.open.load(Ordering::Acquire))
    }

    /// Server-side close of the most recent socket
    pub fn close_current(&self, code: u16, reason: &str) {
        if let Some(link) = self.state.lock().links.last() {
            link.close(code, reason);
        }
    }

    /// Transport error on the most recent socket, followed by a close
    pub fn fail_current(&self, message: &str) {
        if let Some(link) = self.state.lock().links.last() {
            let _ = link.event_tx.send(SocketEvent::Error {
                message: message.to_string(),
            });
            link.close(1006, "");
        }
    }

    /// Server → client text frame on the most recent socket
    pub fn push_message(&self, text: &str) {
        if let Some(link) = self.state.lock().links.last() {
            let _ = link.event_tx.send(SocketEvent::Message {
                text: text.to_string(),
            });
        }
    }
}

impl SocketConnector for MockSocketConnector {
    type Connection = MockSocket;

    #[instrument(name = "mock_socket_open", skip(self), fields(url = %url))]
    async fn open(
        &self,
        url: &str,
    ) -> Result<(MockSocket, mpsc::UnboundedReceiver<SocketEvent>), ContractError> {
        let (result, delay) = {
            let mut state = self.state.lock();
            state.dialed.push(url.to_string());
            (state.script.next(), state.script.delay)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if let Err(message) = result {
            return Err(ContractError::handshake(SinkKind::Socket, message));
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let open = Arc::new(AtomicBool::new(true));
        let index = {
            let mut state = self.state.lock();
            state.links.push(SocketLink {
                event_tx,
                open: Arc::clone(&open),
            });
            state.links.len() - 1
        };

        let socket = MockSocket {
            state: Arc::clone(&self.state),
            index,
            open,
        };
        Ok((socket, event_rx))
    }
}

/// Socket handed out by [`MockSocketConnector`]
pub struct MockSocket {
    state: Arc<Mutex<SocketState>>,
    index: usize,
    open: Arc<AtomicBool>,
}

impl SocketConnection for MockSocket {
    fn send_text(&self, text: String) -> Result<(), ContractError> {
        let mut state = self.state.lock();
        if !self.open.load(Ordering::Acquire) {
            return Err(ContractError::ConnectionClosed {
                sink: SinkKind::Socket,
            });
        }
        if state.fail_sends > 0 {
            state.fail_sends -= 1;
            return Err(ContractError::delivery(
                SinkKind::Socket,
                "mock send failure",
                false,
            ));
        }
        state.sent.push(text);
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    fn close(&self) {
        let mut state = self.state.lock();
        state.closes += 1;
        if let Some(link) = state.links.get(self.index) {
            link.close(1000, "");
        }
    }
}
