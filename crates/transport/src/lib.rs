//! # Transport
//!
//! 中继 sink 的连接层。
//!
//! 职责：
//! - Dial hub and raw socket endpoints
//! - Speak the hub JSON protocol (handshake, invocations, pings)
//! - Report connection lifecycle changes to the owning sink
//! - Provide scripted mock transports for tests
//!
//! ## Feature Flags
//!
//! - `real-ws`: Enable WebSocket transports (tokio-tungstenite)
//! - `native-tls`: Enable `wss://` endpoints

pub mod endpoint;
pub mod hub_protocol;
pub mod mock;

#[cfg(feature = "real-ws")]
pub mod hub_client;
#[cfg(feature = "real-ws")]
pub mod socket_client;

pub use endpoint::{hub_socket_url, socket_url};
pub use mock::{MockHubConnection, MockHubConnector, MockSocket, MockSocketConnector, RecordedInvocation};

#[cfg(feature = "real-ws")]
pub use hub_client::{HubClientOptions, WsHubClient, WsHubConnector};
#[cfg(feature = "real-ws")]
pub use socket_client::{WsSocket, WsSocketConnector};
