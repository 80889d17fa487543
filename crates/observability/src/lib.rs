//! # Observability
//!
//! 可观测性模块：Tracing + Prometheus 指标。
//!
//! ## 功能
//!
//! - Tracing 初始化 (JSON/Pretty/Compact 格式)
//! - Prometheus 指标导出
//! - DispatchReport 统计与运行摘要
//!
//! ## 使用示例
//!
//! ```ignore
//! use observability::metrics;
//!
//! observability::init()?;
//!
//! let report = dispatcher.dispatch(event).await;
//! aggregator.update(&report, latency_ms);
//! ```

pub mod metrics;

use anyhow::{Context, Result};
use contracts::RelaySettings;
use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub use crate::metrics::{
    record_connection_state, record_dispatch_latency_ms, record_event_dispatched,
    record_event_gated, record_queue_depth, record_queue_overflow, record_reconnect_scheduled,
    OutcomeCounts, RelayStatsAggregator, RelaySummary, RunningStats, StatsSummary,
};

/// Initialize observability with defaults (JSON logs, no exporter)
pub fn init() -> Result<()> {
    init_with_config(ObservabilityConfig::default())
}

/// 可观测性配置
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    pub log_format: LogFormat,
    /// Prometheus port (None = disabled)
    pub metrics_port: Option<u16>,
    /// Used when `RUST_LOG` is unset
    pub default_log_level: String,
    /// 任一 sink 开启 `verbose_logging` 时为真
    pub verbose_sinks: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_format: LogFormat::Json,
            metrics_port: None,
            default_log_level: "info".to_string(),
            verbose_sinks: false,
        }
    }
}

/// Crates whose connection traces a verbose sink asks for
const RELAY_TARGETS: [&str; 2] = ["dispatcher", "transport"];

impl ObservabilityConfig {
    /// 根据中继配置调整日志详细程度
    pub fn with_settings(mut self, settings: &RelaySettings) -> Self {
        self.verbose_sinks = settings.hub.verbose_logging || settings.socket.verbose_logging;
        self
    }

    /// Filter directives applied when `RUST_LOG` is unset
    ///
    /// A verbose sink raises the relay crates to debug on top of the base
    /// level; a base level of debug or trace already covers them.
    pub fn filter_directives(&self) -> String {
        let base = self.default_log_level.as_str();
        if !self.verbose_sinks || matches!(base, "debug" | "trace") {
            return base.to_string();
        }
        RELAY_TARGETS
            .iter()
            .fold(base.to_string(), |acc, target| format!("{acc},{target}=debug"))
    }
}

/// 日志格式
#[derive(Debug, Clone, Copy, Default)]
pub enum LogFormat {
    /// JSON structured logs
    #[default]
    Json,
    /// Human-readable multi-line
    Pretty,
    /// Single line
    Compact,
}

/// 使用自定义配置初始化
pub fn init_with_config(config: ObservabilityConfig) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.filter_directives()));

    match config.log_format {
        LogFormat::Json => {
            let fmt_layer = fmt::layer()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true);

            tracing_subscriber::registry()
                .with(filter)
                .with(fmt_layer)
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Pretty => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().pretty())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
        LogFormat::Compact => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().compact())
                .try_init()
                .context("Failed to initialize tracing subscriber")?;
        }
    }

    if let Some(port) = config.metrics_port {
        init_metrics_only(port)?;
    }

    tracing::info!(
        log_format = ?config.log_format,
        metrics_port = ?config.metrics_port,
        verbose_sinks = config.verbose_sinks,
        "Observability initialized"
    );

    Ok(())
}

/// Initialize the Prometheus exporter only
///
/// For hosts whose tracing subscriber is installed elsewhere.
pub fn init_metrics_only(port: u16) -> Result<()> {
    PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], port))
        .install()
        .context("Failed to install Prometheus recorder")?;

    tracing::info!(port = port, "Prometheus metrics endpoint initialized");
    Ok(())
}
