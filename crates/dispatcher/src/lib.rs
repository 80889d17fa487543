//! # Dispatcher
//!
//! 中继核心。
//!
//! 职责：
//! - 按 sink 和方向过滤捕获的事件
//! - 附加 channel 路由提示
//! - 并发分发到 hub 和 socket 两个 sink
//! - Queue, reconnect and back off inside each sink

pub mod backoff;
pub mod channel;
pub mod dispatcher;
pub mod error;
pub mod feed;
pub mod metrics;
pub mod noise;
pub mod queue;
pub mod sinks;

pub use channel::{extract_channel, resolve_channel};
pub use contracts::{CapturedEvent, DispatchReport, RelaySink};
pub use dispatcher::{AppliedSettings, Dispatcher};
pub use error::DispatcherError;
pub use feed::{decode_line, pump, FeedStats};
pub use metrics::{MetricsSnapshot, SinkMetrics};
pub use noise::NoiseFilter;
pub use queue::{BoundedQueue, QueuedMessage, DEFAULT_QUEUE_CAPACITY};
pub use sinks::{DialKind, HubSink, SocketSink};
