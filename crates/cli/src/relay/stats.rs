//! Relay run statistics.

use std::time::Duration;

use dispatcher::FeedStats;
use observability::RelaySummary;

/// Statistics from a relay run
#[derive(Debug, Clone, Default)]
pub struct RelayStats {
    /// Dispatcher outcome tallies
    pub summary: RelaySummary,

    /// Capture feed counters
    pub feed: FeedStats,

    /// Total duration of the run
    pub duration: Duration,

    /// Settings reloads applied while running
    pub reloads: u64,

    /// Feed was cut short by a shutdown signal
    pub interrupted: bool,
}

impl RelayStats {
    /// Dispatched events per second
    pub fn events_per_sec(&self) -> f64 {
        if self.duration.as_secs_f64() > 0.0 {
            self.summary.total_events as f64 / self.duration.as_secs_f64()
        } else {
            0.0
        }
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n╔══════════════════════════════════════════════════════════════╗");
        println!("║                     Relay Statistics                         ║");
        println!("╚══════════════════════════════════════════════════════════════╝\n");

        println!("📊 Overview");
        println!("   ├─ Duration: {:.2}s", self.duration.as_secs_f64());
        println!("   ├─ Feed lines: {}", self.feed.lines);
        println!("   ├─ Rejected lines: {}", self.feed.rejected);
        println!("   ├─ Events dispatched: {}", self.summary.total_events);
        println!("   ├─ Events/s: {:.2}", self.events_per_sec());
        println!("   ├─ Settings reloads: {}", self.reloads);
        println!("   └─ Interrupted: {}", self.interrupted);

        let summary = &self.summary;

        println!("\n📤 Sinks");
        println!("   ├─ Hub: {}", summary.hub);
        println!("   ├─ Socket: {}", summary.socket);
        println!(
            "   └─ Gated out everywhere: {} ({:.2}%)",
            summary.gated_events, summary.gated_rate
        );

        println!("\n⏱  Dispatch latency (ms)");
        println!("   └─ {}", summary.latency_ms);

        if !summary.channel_counts.is_empty() {
            println!("\n📡 Channels ({} events tagged)", summary.with_channel);
            for (channel, count) in &summary.channel_counts {
                println!("   ├─ {}: {}", channel, count);
            }
        }

        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_events_per_sec() {
        let mut stats = RelayStats::default();
        assert_eq!(stats.events_per_sec(), 0.0);

        stats.summary.total_events = 50;
        stats.duration = Duration::from_secs(2);
        assert!((stats.events_per_sec() - 25.0).abs() < f64::EPSILON);
    }
}
