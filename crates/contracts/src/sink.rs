//! RelaySink trait - Dispatcher 输出接口
//!
//! 定义两个中继 sink 共用的抽象接口。

use crate::{ConfigureEffect, ContractError, Event, PublishOutcome, RelaySettings, SinkKind, SinkStatus};

/// Relay output trait
///
/// Implementations are cheap cloneable handles over shared state; every
/// method takes `&self` and is safe to call from concurrent tasks.
#[trait_variant::make(RelaySink: Send)]
pub trait LocalRelaySink {
    /// Sink kind (used for logging/metrics)
    fn kind(&self) -> SinkKind;

    /// Apply a settings snapshot
    ///
    /// Connects or disconnects in the background when enablement or the
    /// endpoint changed; the returned effect says which.
    fn configure(&self, settings: &RelaySettings) -> ConfigureEffect;

    /// Deliver an event, or queue it when not connected
    ///
    /// # Errors
    /// Returns delivery or capacity error (already logged)
    async fn publish(&self, event: Event) -> Result<PublishOutcome, ContractError>;

    /// Cancel timers and stop any live connection in the background
    fn disconnect(&self);

    /// Current status snapshot
    fn status(&self) -> SinkStatus;
}
