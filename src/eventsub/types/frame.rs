//! EventSub WebSocket message envelope and classification.
//!
//! Every message is `{"metadata": {...}, "payload": {...}}`. The kind is carried in
//! `metadata.message_type`; the payload shape depends on it.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use serde_with::{DurationSeconds, serde_as};

use super::Session;
use crate::Result;
use crate::helix::types::{SubscriptionRecord, SubscriptionStatus};
use crate::ws::WsError;

pub const SESSION_WELCOME: &str = "session_welcome";
pub const SESSION_KEEPALIVE: &str = "session_keepalive";
pub const NOTIFICATION: &str = "notification";
pub const SESSION_RECONNECT: &str = "session_reconnect";
pub const REVOCATION: &str = "revocation";

/// Envelope metadata shared by all message kinds.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Metadata {
    /// Unique per message; redelivered messages keep their id
    pub message_id: String,
    pub message_type: String,
    pub message_timestamp: DateTime<Utc>,
    /// Present on `notification` and `revocation`
    #[serde(default)]
    pub subscription_type: Option<String>,
    #[serde(default)]
    pub subscription_version: Option<String>,
}

/// A decoded inbound message.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    /// `session_welcome`: a fresh session, not yet registered
    Welcome(Session),
    /// `session_keepalive`: proof of life, no payload
    Keepalive,
    /// `notification`: an event for one of the session's subscriptions
    Notification(Box<Notification>),
    /// `session_reconnect`: the server asks the client to move to `url`
    Reconnect {
        url: String,
    },
    /// `revocation`: the server will no longer deliver the subscription
    Revocation(Box<Revocation>),
    /// Any `message_type` this client does not understand
    Unknown {
        message_type: String,
    },
}

impl Frame {
    /// The wire `message_type` this frame was decoded from.
    #[must_use]
    pub fn message_type(&self) -> &str {
        match self {
            Self::Welcome(_) => SESSION_WELCOME,
            Self::Keepalive => SESSION_KEEPALIVE,
            Self::Notification(_) => NOTIFICATION,
            Self::Reconnect { .. } => SESSION_RECONNECT,
            Self::Revocation(_) => REVOCATION,
            Self::Unknown { message_type } => message_type,
        }
    }
}

/// An event delivered for a subscription.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub metadata: Metadata,
    pub subscription: SubscriptionRecord,
    /// Event body; its shape depends on the subscription type
    pub event: Value,
}

impl Notification {
    /// Subscription type used to route the event, e.g. `channel.follow`.
    #[must_use]
    pub fn event_type(&self) -> &str {
        &self.subscription.event_type
    }

    /// Deserialize the event body into a typed payload.
    pub fn event_as<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_value(self.event.clone())?)
    }
}

/// Notice that a subscription was revoked; `status` holds the reason.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revocation {
    pub metadata: Metadata,
    /// Revoked subscription type, falling back to `metadata.subscription_type`
    pub event_type: String,
    /// `unknown` when the payload carries no readable status
    pub status: SubscriptionStatus,
    /// The full subscription object, when the payload carries one
    pub subscription: Option<SubscriptionRecord>,
}

impl Revocation {
    fn from_payload(metadata: Metadata, subscription: &Value) -> Self {
        let record = serde_json::from_value::<SubscriptionRecord>(subscription.clone()).ok();

        let event_type = record
            .as_ref()
            .map(|record| record.event_type.clone())
            .or_else(|| {
                subscription
                    .get("type")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            })
            .or_else(|| metadata.subscription_type.clone())
            .unwrap_or_default();

        let status = record
            .as_ref()
            .map(|record| record.status.clone())
            .or_else(|| {
                subscription
                    .get("status")
                    .and_then(|status| serde_json::from_value(status.clone()).ok())
            })
            .unwrap_or_else(|| SubscriptionStatus::Unknown("unknown".to_owned()));

        Self {
            metadata,
            event_type,
            status,
            subscription: record,
        }
    }
}

#[derive(Deserialize)]
struct Envelope {
    metadata: Metadata,
    #[serde(default)]
    payload: Value,
}

#[derive(Deserialize)]
struct SessionPayload {
    session: SessionInfo,
}

#[serde_as]
#[derive(Deserialize)]
struct SessionInfo {
    id: String,
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    keepalive_timeout_seconds: Option<Duration>,
    #[serde(default)]
    reconnect_url: Option<String>,
    connected_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct NotificationPayload {
    subscription: SubscriptionRecord,
    #[serde(default)]
    event: Value,
}

fn payload<T: DeserializeOwned>(value: Value) -> Result<T> {
    serde_json::from_value(value).map_err(|e| WsError::MessageParse(e).into())
}

/// Decode and classify one text message.
///
/// Unrecognised `message_type`s decode to [`Frame::Unknown`]. A `revocation` always decodes
/// to [`Frame::Revocation`], however much of its subscription object is missing. Malformed
/// JSON, a payload that does not match its declared kind, a welcome without keepalive timeout and a
/// reconnect without URL are errors of kind [`crate::error::Kind::WebSocket`].
pub fn decode(raw: &str) -> Result<Frame> {
    let Envelope { metadata, payload: body } =
        serde_json::from_str(raw).map_err(WsError::MessageParse)?;

    let frame = match metadata.message_type.as_str() {
        SESSION_WELCOME => {
            let SessionPayload { session } = payload(body)?;
            let keepalive_timeout = session.keepalive_timeout_seconds.ok_or_else(|| {
                WsError::InvalidMessage("session_welcome without keepalive_timeout_seconds".to_owned())
            })?;

            Frame::Welcome(Session::new(
                session.id,
                keepalive_timeout,
                session.connected_at,
            ))
        }
        SESSION_KEEPALIVE => Frame::Keepalive,
        NOTIFICATION => {
            let NotificationPayload {
                subscription,
                event,
            } = payload(body)?;

            Frame::Notification(Box::new(Notification {
                metadata,
                subscription,
                event,
            }))
        }
        SESSION_RECONNECT => {
            let SessionPayload { session } = payload(body)?;
            let url = session.reconnect_url.ok_or_else(|| {
                WsError::InvalidMessage("session_reconnect without reconnect_url".to_owned())
            })?;

            Frame::Reconnect { url }
        }
        REVOCATION => {
            let subscription = body.get("subscription").cloned().unwrap_or_default();

            Frame::Revocation(Box::new(Revocation::from_payload(metadata, &subscription)))
        }
        _ => Frame::Unknown {
            message_type: metadata.message_type,
        },
    };

    Ok(frame)
}
