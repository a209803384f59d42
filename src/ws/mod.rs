//! Core WebSocket infrastructure.
//!
//! This module provides the transport seam and timing primitives that the EventSub
//! session supervisor is built on.
//!
//! # Architecture
//!
//! - [`Connector`] / [`Socket`]: dial and read a WebSocket, swappable for tests
//! - [`TungsteniteConnector`]: default transport over `tokio-tungstenite`
//! - [`HeartbeatWatchdog`]: resettable one-shot timeout for keepalive monitoring
//!
//! # Example
//!
//! ```ignore
//! let mut socket = TungsteniteConnector.connect(EVENTSUB_WS_ENDPOINT).await?;
//! while let Some(inbound) = socket.recv().await {
//!     println!("{:?}", inbound?);
//! }
//! ```

pub mod config;
pub mod connection;
pub mod error;
pub mod traits;
pub mod watchdog;

pub use connection::TungsteniteConnector;
#[expect(
    clippy::module_name_repetitions,
    reason = "WsError includes module name for clarity when used outside this module"
)]
pub use error::WsError;
pub use traits::*;
pub use watchdog::HeartbeatWatchdog;
