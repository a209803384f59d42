//! Core traits for generic WebSocket infrastructure.

use async_trait::async_trait;

/// A decoded inbound WebSocket message.
///
/// Binary and raw frames never reach callers; EventSub speaks JSON text only.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// UTF-8 text payload
    Text(String),
    /// Server ping. The transport answers it; callers may count it as liveness.
    Ping,
    /// Pong reply to a ping
    Pong,
    /// Server close frame
    Close {
        /// Close code, e.g. 4003 for an unused connection
        code: Option<u16>,
        /// Close reason
        reason: Option<String>,
    },
}

/// Dials a WebSocket URL and yields an open [`Socket`].
///
/// The default implementation is [`super::connection::TungsteniteConnector`]. Tests
/// substitute scripted connectors to drive the session lifecycle deterministically.
///
/// # Example
///
/// ```ignore
/// struct Scripted { frames: Vec<Inbound> }
///
/// #[async_trait]
/// impl Connector for Scripted {
///     type Socket = ScriptedSocket;
///
///     async fn connect(&self, url: &str) -> crate::Result<ScriptedSocket> {
///         Ok(ScriptedSocket::new(self.frames.clone()))
///     }
/// }
/// ```
#[async_trait]
pub trait Connector: Send + Sync + 'static {
    type Socket: Socket;

    /// Open a connection to `url`.
    ///
    /// A handshake refused with 401 or 403 must surface as
    /// [`crate::error::Kind::Unauthorized`] so the caller stops retrying.
    async fn connect(&self, url: &str) -> crate::Result<Self::Socket>;
}

/// An open WebSocket connection, read-only from the client's point of view.
#[async_trait]
pub trait Socket: Send + 'static {
    /// Receive the next message. `None` means the stream has ended.
    ///
    /// Must be cancel-safe: it is raced against timers and shutdown in `select!`.
    async fn recv(&mut self) -> Option<crate::Result<Inbound>>;

    /// Close the connection. Closing an already closed socket succeeds.
    async fn close(&mut self) -> crate::Result<()>;
}
