//! 中继指标收集模块
//!
//! 为分发路径记录 Prometheus 指标，并在内存中汇总运行结束时的统计摘要。

use std::collections::BTreeMap;

use contracts::{ConnectionState, DispatchReport, PublishOutcome, SinkKind};
use metrics::{counter, gauge, histogram};

/// Record one per-sink publish outcome
pub fn record_event_dispatched(sink: SinkKind, outcome: &PublishOutcome) {
    counter!(
        "ws_relay_events_dispatched_total",
        "sink" => sink.as_str(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// Record an event that no sink accepted
pub fn record_event_gated() {
    counter!("ws_relay_events_gated_total").increment(1);
}

/// Record pending queue depth
pub fn record_queue_depth(sink: SinkKind, depth: usize) {
    gauge!("ws_relay_queue_depth", "sink" => sink.as_str()).set(depth as f64);
}

/// Record a message dropped by a full queue
pub fn record_queue_overflow(sink: SinkKind) {
    counter!("ws_relay_queue_overflow_total", "sink" => sink.as_str()).increment(1);
}

/// Record a connection state transition
pub fn record_connection_state(sink: SinkKind, state: ConnectionState) {
    gauge!("ws_relay_connection_state", "sink" => sink.as_str()).set(state.as_gauge());
    counter!(
        "ws_relay_connection_transitions_total",
        "sink" => sink.as_str(),
        "state" => state.as_str()
    )
    .increment(1);
}

/// Record a scheduled reconnect
pub fn record_reconnect_scheduled(sink: SinkKind, delay_ms: u64) {
    counter!("ws_relay_reconnects_scheduled_total", "sink" => sink.as_str()).increment(1);
    histogram!("ws_relay_reconnect_delay_ms", "sink" => sink.as_str()).record(delay_ms as f64);
}

/// Record dispatch latency (capture to publish completion)
pub fn record_dispatch_latency_ms(latency_ms: f64) {
    histogram!("ws_relay_dispatch_latency_ms").record(latency_ms);
}

/// Per-sink outcome tallies
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OutcomeCounts {
    pub delivered: u64,
    pub queued: u64,
    pub errored: u64,
    /// Events this sink was gated out of
    pub skipped: u64,
}

impl OutcomeCounts {
    fn update(&mut self, outcome: Option<&PublishOutcome>) {
        match outcome {
            Some(PublishOutcome::Delivered) => self.delivered += 1,
            Some(PublishOutcome::Queued) => self.queued += 1,
            Some(PublishOutcome::Errored { .. }) => self.errored += 1,
            None => self.skipped += 1,
        }
    }
}

impl std::fmt::Display for OutcomeCounts {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "delivered={}, queued={}, errored={}, skipped={}",
            self.delivered, self.queued, self.errored, self.skipped
        )
    }
}

/// Relay statistics aggregator
///
/// Aggregates dispatch reports in memory for the run summary.
#[derive(Debug, Clone, Default)]
pub struct RelayStatsAggregator {
    /// Total events dispatched
    pub total_events: u64,

    /// Events no sink accepted
    pub gated_events: u64,

    /// Events carrying a channel
    pub with_channel: u64,

    pub hub: OutcomeCounts,
    pub socket: OutcomeCounts,

    /// Events per channel
    pub channel_counts: BTreeMap<String, u64>,

    /// Dispatch latency statistics (ms)
    pub latency_stats: RunningStats,
}

impl RelayStatsAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Update with one dispatch report and its latency
    pub fn update(&mut self, report: &DispatchReport, latency_ms: f64) {
        self.total_events += 1;
        if !report.published {
            self.gated_events += 1;
        }
        if let Some(channel) = &report.channel {
            self.with_channel += 1;
            *self.channel_counts.entry(channel.clone()).or_insert(0) += 1;
        }
        self.hub.update(report.hub.as_ref());
        self.socket.update(report.socket.as_ref());
        self.latency_stats.push(latency_ms);
    }

    /// Generate summary report
    pub fn summary(&self) -> RelaySummary {
        RelaySummary {
            total_events: self.total_events,
            gated_events: self.gated_events,
            gated_rate: if self.total_events > 0 {
                self.gated_events as f64 / self.total_events as f64 * 100.0
            } else {
                0.0
            },
            with_channel: self.with_channel,
            hub: self.hub,
            socket: self.socket,
            latency_ms: StatsSummary::from(&self.latency_stats),
            channel_counts: self.channel_counts.clone(),
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Relay summary
#[derive(Debug, Clone, Default)]
pub struct RelaySummary {
    pub total_events: u64,
    pub gated_events: u64,
    pub gated_rate: f64,
    pub with_channel: u64,
    pub hub: OutcomeCounts,
    pub socket: OutcomeCounts,
    pub latency_ms: StatsSummary,
    pub channel_counts: BTreeMap<String, u64>,
}

impl std::fmt::Display for RelaySummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Relay Summary ===")?;
        writeln!(f, "Total events: {}", self.total_events)?;
        writeln!(
            f,
            "Gated events: {} ({:.2}%)",
            self.gated_events, self.gated_rate
        )?;
        writeln!(f, "Events with channel: {}", self.with_channel)?;
        writeln!(f, "Hub: {}", self.hub)?;
        writeln!(f, "Socket: {}", self.socket)?;
        writeln!(f, "Dispatch latency (ms): {}", self.latency_ms)?;

        if !self.channel_counts.is_empty() {
            writeln!(f, "Channels:")?;
            for (channel, count) in &self.channel_counts {
                writeln!(f, "  {}: {}", channel, count)?;
            }
        }

        Ok(())
    }
}

/// Statistics summary
#[derive(Debug, Clone, Default)]
pub struct StatsSummary {
    pub count: u64,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub std_dev: f64,
}

impl From<&RunningStats> for StatsSummary {
    fn from(stats: &RunningStats) -> Self {
        Self {
            count: stats.count,
            min: stats.min,
            max: stats.max,
            mean: stats.mean(),
            std_dev: stats.std_dev(),
        }
    }
}

impl std::fmt::Display for StatsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.count == 0 {
            write!(f, "N/A")
        } else {
            write!(
                f,
                "min={:.3}, max={:.3}, mean={:.3}, std={:.3} (n={})",
                self.min, self.max, self.mean, self.std_dev, self.count
            )
        }
    }
}

/// Online statistics (Welford's algorithm)
#[derive(Debug, Clone, Default)]
pub struct RunningStats {
    count: u64,
    mean: f64,
    m2: f64,
    min: f64,
    max: f64,
}

impl RunningStats {
    pub fn push(&mut self, value: f64) {
        self.count += 1;

        if self.count == 1 {
            self.min = value;
            self.max = value;
            self.mean = value;
            self.m2 = 0.0;
        } else {
            self.min = self.min.min(value);
            self.max = self.max.max(value);

            let delta = value - self.mean;
            self.mean += delta / self.count as f64;
            let delta2 = value - self.mean;
            self.m2 += delta * delta2;
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Sample variance
    pub fn variance(&self) -> f64 {
        if self.count < 2 {
            0.0
        } else {
            self.m2 / (self.count - 1) as f64
        }
    }

    pub fn std_dev(&self) -> f64 {
        self.variance().sqrt()
    }

    pub fn min(&self) -> f64 {
        self.min
    }

    pub fn max(&self) -> f64 {
        self.max
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_running_stats() {
        let mut stats = RunningStats::default();

        for v in [1.0, 2.0, 3.0, 4.0, 5.0] {
            stats.push(v);
        }

        assert_eq!(stats.count(), 5);
        assert!((stats.mean() - 3.0).abs() < 1e-10);
        assert!((stats.min() - 1.0).abs() < 1e-10);
        assert!((stats.max() - 5.0).abs() < 1e-10);
        assert!((stats.variance() - 2.5).abs() < 1e-10);
    }

    #[test]
    fn test_aggregator_update() {
        let mut aggregator = RelayStatsAggregator::new();

        aggregator.update(
            &DispatchReport {
                published: true,
                reason: None,
                channel: Some("lobby".into()),
                hub: Some(PublishOutcome::Queued),
                socket: Some(PublishOutcome::Delivered),
            },
            1.5,
        );
        aggregator.update(&DispatchReport::disabled(None), 0.1);

        assert_eq!(aggregator.total_events, 2);
        assert_eq!(aggregator.gated_events, 1);
        assert_eq!(aggregator.hub.queued, 1);
        assert_eq!(aggregator.hub.skipped, 1);
        assert_eq!(aggregator.socket.delivered, 1);
        assert_eq!(aggregator.channel_counts.get("lobby"), Some(&1));
    }

    #[test]
    fn test_summary_display() {
        let mut aggregator = RelayStatsAggregator::new();
        aggregator.update(&DispatchReport::disabled(None), 0.2);
        aggregator.update(
            &DispatchReport {
                published: true,
                reason: None,
                channel: None,
                hub: Some(PublishOutcome::errored("queue full")),
                socket: None,
            },
            0.4,
        );

        let output = format!("{}", aggregator.summary());
        assert!(output.contains("Total events: 2"));
        assert!(output.contains("50.00%"));
        assert!(output.contains("errored=1"));
    }

    #[test]
    fn test_recorders_without_exporter() {
        // No recorder installed: calls are no-ops.
        record_event_dispatched(SinkKind::Hub, &PublishOutcome::Delivered);
        record_queue_depth(SinkKind::Socket, 3);
        record_connection_state(SinkKind::Hub, ConnectionState::Connected);
        record_reconnect_scheduled(SinkKind::Socket, 3000);
    }
}
