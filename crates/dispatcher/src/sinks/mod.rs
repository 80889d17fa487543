//! Sink 实现
//!
//! 包含 HubSink 与 SocketSink。

mod hub;
mod retry;
mod socket;

pub use self::hub::HubSink;
pub use self::socket::{DialKind, SocketSink};
