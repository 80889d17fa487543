//! Reconnect timer slot shared by both sinks

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;

/// At most one pending reconnect per sink
///
/// Each arm hands out a ticket. A firing timer only counts if its ticket is
/// still current, so a timer that raced a cancel becomes a no-op.
#[derive(Debug, Default)]
pub(crate) struct RetryTimer {
    handle: Option<JoinHandle<()>>,
    ticket: u64,
    delay: Option<Duration>,
}

impl RetryTimer {
    pub(crate) fn is_pending(&self) -> bool {
        self.handle.is_some()
    }

    pub(crate) fn delay_ms(&self) -> Option<u64> {
        self.delay.map(|d| d.as_millis() as u64)
    }

    /// Spawn `on_fire(ticket)` after `delay`, replacing any pending timer
    pub(crate) fn arm<F, Fut>(&mut self, delay: Duration, on_fire: F)
    where
        F: FnOnce(u64) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        self.cancel();
        let ticket = self.ticket;
        self.delay = Some(delay);
        self.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            on_fire(ticket).await;
        }));
    }

    /// Claim a fired timer; false when it was cancelled or superseded
    pub(crate) fn claim(&mut self, ticket: u64) -> bool {
        if self.ticket != ticket || self.handle.is_none() {
            return false;
        }
        // Dropping the handle detaches the running task instead of aborting it.
        self.handle = None;
        self.delay = None;
        true
    }

    pub(crate) fn cancel(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
        self.ticket = self.ticket.wrapping_add(1);
        self.delay = None;
    }
}
