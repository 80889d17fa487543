//! # Contracts
//!
//! 冻结的接口契约，供所有中继 crate 共享：捕获事件、配置快照、连接状态、
//! 发布结果，以及 transport 与 sink trait。业务 crate 只依赖本 crate，
//! 禁止反向依赖。
//!
//! ## 时间模型
//! - 捕获时间戳为 UTC 墙钟时间 (`chrono::DateTime<Utc>`)
//! - 队列记录使用同一时钟，状态输出可直接比较

mod error;
mod event;
mod outcome;
mod settings;
mod sink;
mod state;
mod transport;

pub use error::*;
pub use event::*;
pub use outcome::*;
pub use settings::*;
pub use sink::*;
pub use state::*;
pub use transport::*;
