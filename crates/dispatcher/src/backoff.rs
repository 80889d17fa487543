//! 重连退避策略
//!
//! Hub：指数退避加抖动，不限次数。
//! Socket：延迟翻倍，次数有上限。

use std::time::Duration;

use rand::Rng;

/// Hub 基础延迟
pub const HUB_BASE_DELAY_MS: u64 = 2_000;
/// Hub 延迟上限
pub const HUB_MAX_DELAY_MS: u64 = 60_000;
/// Hub delay floor after jitter
pub const HUB_MIN_DELAY_MS: u64 = 1_000;
/// Hub 抖动比例
pub const HUB_JITTER: f64 = 0.3;

/// Socket base delay
pub const SOCKET_BASE_DELAY_MS: u64 = 3_000;
/// Socket delay cap
pub const SOCKET_MAX_DELAY_MS: u64 = 60_000;
/// Socket 自动重试次数上限
pub const SOCKET_MAX_ATTEMPTS: u32 = 6;

/// Un-jittered hub delay for attempt `attempt` (1-based)
pub fn hub_base_delay_ms(attempt: u32) -> u64 {
    let exp = attempt.saturating_sub(1).min(16);
    HUB_BASE_DELAY_MS
        .saturating_mul(1u64 << exp)
        .min(HUB_MAX_DELAY_MS)
}

/// Hub delay for `attempt` with jitter unit `unit` in [-1, 1]
pub fn hub_delay_with_unit(attempt: u32, unit: f64) -> Duration {
    let base = hub_base_delay_ms(attempt) as f64;
    let jitter = (base * HUB_JITTER * unit.clamp(-1.0, 1.0)).floor();
    let delay = (base + jitter).max(HUB_MIN_DELAY_MS as f64);
    Duration::from_millis(delay as u64)
}

/// Hub delay for `attempt` with uniform random jitter
pub fn hub_delay(attempt: u32) -> Duration {
    let unit = rand::rng().random_range(-1.0..=1.0);
    hub_delay_with_unit(attempt, unit)
}

/// Socket retry bookkeeping
///
/// The current delay is used for the next schedule and then doubled, so the
/// scheduled delays run 3s, 6s, 12s, 24s, 48s, 60s.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SocketBackoff {
    attempts: u32,
    delay_ms: u64,
}

impl Default for SocketBackoff {
    fn default() -> Self {
        Self {
            attempts: 0,
            delay_ms: SOCKET_BASE_DELAY_MS,
        }
    }
}

impl SocketBackoff {
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= SOCKET_MAX_ATTEMPTS
    }

    /// Consume one attempt; `None` once the ceiling is reached
    pub fn next_delay(&mut self) -> Option<Duration> {
        if self.is_exhausted() {
            return None;
        }
        self.attempts += 1;
        let delay = self.delay_ms;
        self.delay_ms = (self.delay_ms * 2).min(SOCKET_MAX_DELAY_MS);
        Some(Duration::from_millis(delay))
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}
