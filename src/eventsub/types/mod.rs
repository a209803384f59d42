pub mod frame;

use std::time::Duration;

use chrono::{DateTime, Utc};

pub use frame::{Frame, Metadata, Notification, Revocation, decode};

/// A negotiated EventSub session.
///
/// Created from the `session_welcome` of every connection and discarded when the
/// connection ends. Subscriptions are bound to the session id.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    /// Server-assigned session id, passed as `transport.session_id` on create calls
    pub id: String,
    /// Maximum silence before the client must consider the connection dead
    pub keepalive_timeout: Duration,
    pub connected_at: DateTime<Utc>,
    /// Whether every registered descriptor was created for this session
    pub registered: bool,
}

impl Session {
    #[must_use]
    pub fn new(id: String, keepalive_timeout: Duration, connected_at: DateTime<Utc>) -> Self {
        Self {
            id,
            keepalive_timeout,
            connected_at,
            registered: false,
        }
    }
}
