#![expect(
    clippy::module_name_repetitions,
    reason = "Error types include the module name to indicate their scope"
)]

use std::error::Error as StdError;
use std::fmt;
use std::time::Duration;

use tokio_tungstenite::tungstenite;

use crate::error::Kind;

/// WebSocket error variants.
#[non_exhaustive]
#[derive(Debug)]
pub enum WsError {
    /// Error connecting to or communicating with the WebSocket server
    Connection(tungstenite::Error),
    /// The server refused the handshake with 401 or 403
    Unauthorized {
        /// HTTP status of the refused handshake
        status: u16,
    },
    /// Error parsing a WebSocket message
    MessageParse(serde_json::Error),
    /// WebSocket connection was closed
    ConnectionClosed {
        /// Close code sent by the server, if any
        code: Option<u16>,
        /// Close reason sent by the server, if any
        reason: Option<String>,
    },
    /// No welcome message arrived in time after the socket opened
    WelcomeTimeout(Duration),
    /// No keepalive or notification arrived within the session's keepalive timeout
    KeepaliveTimeout(Duration),
    /// The first message of a connection was not `session_welcome`
    UnexpectedFirstFrame {
        /// `message_type` of the offending message
        message_type: String,
    },
    /// The server revoked a subscription and the session is being recycled
    Revoked {
        /// Subscription type that was revoked
        subscription_type: String,
        /// Revocation reason, e.g. `authorization_revoked`
        status: String,
    },
    /// Received an invalid or unexpected message
    InvalidMessage(String),
}

impl WsError {
    /// Human-readable meaning of the EventSub close codes (4000–4007).
    #[must_use]
    pub fn describe_close_code(code: u16) -> Option<&'static str> {
        match code {
            4000 => Some("internal server error"),
            4001 => Some("client sent inbound traffic"),
            4002 => Some("client failed ping-pong"),
            4003 => Some("connection unused"),
            4004 => Some("reconnect grace time expired"),
            4005 => Some("network timeout"),
            4006 => Some("network error"),
            4007 => Some("invalid reconnect"),
            _ => None,
        }
    }

    /// Whether this failure points at a broken wire contract rather than a flaky network.
    #[must_use]
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::MessageParse(_)
                | Self::UnexpectedFirstFrame { .. }
                | Self::WelcomeTimeout(_)
                | Self::InvalidMessage(_)
        )
    }
}

impl fmt::Display for WsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection(e) => write!(f, "WebSocket connection error: {e}"),
            Self::Unauthorized { status } => {
                write!(f, "WebSocket handshake rejected with status {status}")
            }
            Self::MessageParse(e) => write!(f, "Failed to parse WebSocket message: {e}"),
            Self::ConnectionClosed { code, reason } => {
                write!(f, "WebSocket connection closed")?;
                if let Some(code) = code {
                    write!(f, " with code {code}")?;
                    if let Some(meaning) = Self::describe_close_code(*code) {
                        write!(f, " ({meaning})")?;
                    }
                }
                match reason {
                    Some(reason) if !reason.is_empty() => write!(f, ": {reason}"),
                    _ => Ok(()),
                }
            }
            Self::WelcomeTimeout(after) => {
                write!(f, "No session_welcome received within {after:?}")
            }
            Self::KeepaliveTimeout(after) => write!(f, "Keepalive timeout after {after:?}"),
            Self::UnexpectedFirstFrame { message_type } => {
                write!(f, "Expected session_welcome as first message, got {message_type}")
            }
            Self::Revoked {
                subscription_type,
                status,
            } => write!(f, "Subscription {subscription_type} revoked: {status}"),
            Self::InvalidMessage(msg) => write!(f, "Invalid WebSocket message: {msg}"),
        }
    }
}

impl StdError for WsError {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        match self {
            Self::Connection(e) => Some(e),
            Self::MessageParse(e) => Some(e),
            _ => None,
        }
    }
}

// Integration with main Error type
impl From<WsError> for crate::error::Error {
    fn from(e: WsError) -> Self {
        let kind = match e {
            WsError::Unauthorized { .. } => Kind::Unauthorized,
            _ => Kind::WebSocket,
        };
        crate::error::Error::with_source(kind, e)
    }
}

impl From<tungstenite::Error> for crate::error::Error {
    fn from(e: tungstenite::Error) -> Self {
        if let tungstenite::Error::Http(response) = &e {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                return WsError::Unauthorized { status }.into();
            }
        }

        WsError::Connection(e).into()
    }
}
