//! Sink 运行指标

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use contracts::{ConnectionState, PublishOutcome, SinkKind};

/// Metrics for a single sink
///
/// Counters mirror what is exported to Prometheus so a host can print a
/// summary without scraping.
#[derive(Debug)]
pub struct SinkMetrics {
    kind: SinkKind,
    /// Current queue length
    queue_len: AtomicUsize,
    /// Events handed to the transport
    delivered_count: AtomicU64,
    /// Events parked in the queue
    queued_count: AtomicU64,
    /// Failed deliveries
    failure_count: AtomicU64,
    /// Events dropped due to full queue
    dropped_count: AtomicU64,
    /// Reconnects scheduled
    reconnect_count: AtomicU64,
}

impl SinkMetrics {
    pub fn new(kind: SinkKind) -> Self {
        Self {
            kind,
            queue_len: AtomicUsize::new(0),
            delivered_count: AtomicU64::new(0),
            queued_count: AtomicU64::new(0),
            failure_count: AtomicU64::new(0),
            dropped_count: AtomicU64::new(0),
            reconnect_count: AtomicU64::new(0),
        }
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Set current queue length
    pub fn set_queue_len(&self, len: usize) {
        self.queue_len.store(len, Ordering::Relaxed);
        observability::record_queue_depth(self.kind, len);
    }

    /// Count one publish outcome
    pub fn record_outcome(&self, outcome: &PublishOutcome) {
        let counter = match outcome {
            PublishOutcome::Delivered => &self.delivered_count,
            PublishOutcome::Queued => &self.queued_count,
            PublishOutcome::Errored { .. } => &self.failure_count,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        observability::record_event_dispatched(self.kind, outcome);
    }

    /// Count a message dropped by the full queue
    pub fn inc_dropped_count(&self) {
        self.dropped_count.fetch_add(1, Ordering::Relaxed);
        observability::record_queue_overflow(self.kind);
    }

    pub fn record_reconnect(&self, delay_ms: u64) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
        observability::record_reconnect_scheduled(self.kind, delay_ms);
    }

    pub fn record_state(&self, state: ConnectionState) {
        observability::record_connection_state(self.kind, state);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            delivered_count: self.delivered_count.load(Ordering::Relaxed),
            queued_count: self.queued_count.load(Ordering::Relaxed),
            failure_count: self.failure_count.load(Ordering::Relaxed),
            dropped_count: self.dropped_count.load(Ordering::Relaxed),
            reconnect_count: self.reconnect_count.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of sink metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub delivered_count: u64,
    pub queued_count: u64,
    pub failure_count: u64,
    pub dropped_count: u64,
    pub reconnect_count: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_counters() {
        let metrics = SinkMetrics::new(SinkKind::Hub);
        metrics.record_outcome(&PublishOutcome::Delivered);
        metrics.record_outcome(&PublishOutcome::Queued);
        metrics.record_outcome(&PublishOutcome::errored("x"));
        metrics.inc_dropped_count();
        metrics.set_queue_len(4);

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.delivered_count, 1);
        assert_eq!(snapshot.queued_count, 1);
        assert_eq!(snapshot.failure_count, 1);
        assert_eq!(snapshot.dropped_count, 1);
        assert_eq!(snapshot.queue_len, 4);
    }
}
