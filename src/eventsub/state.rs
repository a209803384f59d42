use std::time::Duration;

use super::registration::RegistrationOutcome;
use super::types::Session;
use crate::helix::types::SubscriptionStatus;

/// Connection state tracking.
///
/// `Disconnected → Connecting → AwaitingWelcome → Registering → Live → Closing →
/// Disconnected`, until the monitor reaches the terminal `Stopped`.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Not connected
    Disconnected,
    /// Dialing `url`
    Connecting {
        url: String,
    },
    /// Socket open, waiting for `session_welcome`
    AwaitingWelcome,
    /// Session established, subscriptions being created
    Registering(Session),
    /// Registration phase finished; notifications are flowing
    Live(Session),
    /// Tearing down the current socket
    Closing,
    /// Terminal; the monitor will not reconnect
    Stopped(StopReason),
}

impl ConnectionState {
    /// The current session, if one has been negotiated.
    #[must_use]
    pub fn session(&self) -> Option<&Session> {
        match self {
            Self::Registering(session) | Self::Live(session) => Some(session),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }

    #[must_use]
    pub fn is_stopped(&self) -> bool {
        matches!(self, Self::Stopped(_))
    }
}

/// Why the monitor stopped.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum_macros::Display)]
#[strum(serialize_all = "snake_case")]
pub enum StopReason {
    /// [`super::EventMonitor::stop`] was called
    Requested,
    /// The server rejected the credentials (401/403)
    Unauthorized,
    /// `ReconnectConfig::max_attempts` consecutive connection attempts failed
    RetriesExhausted,
}

/// Diagnostic events published by a running monitor.
///
/// Delivery is best effort: slow receivers lag and miss events.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorEvent {
    /// A socket to `url` was opened
    Connected { url: String },
    SessionWelcomed {
        session_id: String,
        keepalive_timeout: Duration,
    },
    RegistrationFinished {
        session_id: String,
        outcome: RegistrationOutcome,
    },
    RegistrationFailed { session_id: String, error: String },
    /// The server sent `session_reconnect`
    Redirected { url: String },
    Revoked {
        event_type: String,
        status: SubscriptionStatus,
    },
    KeepaliveTimeout {
        session_id: String,
        timeout: Duration,
    },
    /// A notification arrived for an event type with no registered descriptor
    UnhandledNotification { event_type: String },
    SubscriberFailed { event_type: String, error: String },
    /// A message could not be decoded or broke the welcome-first rule
    ProtocolError { error: String },
    UnknownMessage { message_type: String },
    /// The connection ended; `reason` describes why
    Disconnected { reason: String },
    ReconnectScheduled {
        url: String,
        delay: Duration,
        attempt: u32,
    },
    Stopped(StopReason),
}
