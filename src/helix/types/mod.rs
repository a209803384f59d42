use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod request;
pub mod response;

pub use request::{CreateSubscriptionRequest, SubscriptionsRequest, TransportRequest};
pub use response::{Pagination, SubscriptionRecord, SubscriptionsPage};

/// Filter condition of a subscription, e.g. `{"broadcaster_user_id": "1234"}`.
///
/// Ordered so that requests serialize deterministically.
pub type Condition = BTreeMap<String, String>;

/// Lifecycle status of a subscription as reported by Helix and by revocation frames.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum SubscriptionStatus {
    /// The subscription is active and delivering notifications.
    Enabled,
    /// The user revoked the authorization token the subscription relied on.
    AuthorizationRevoked,
    /// The moderator that authorized the subscription is no longer one.
    ModeratorRemoved,
    /// A user named in the condition was banned or deleted.
    UserRemoved,
    /// The subscribed version of the event type is no longer supported.
    VersionRemoved,
    /// The beta event type is undergoing maintenance.
    BetaMaintenance,
    /// The client closed the session's connection.
    WebsocketDisconnected,
    /// The client failed to respond to a ping.
    WebsocketFailedPingPong,
    /// The client sent a non-pong message on the connection.
    WebsocketReceivedInboundTraffic,
    /// No subscription was created in time after the welcome message.
    WebsocketConnectionUnused,
    /// The server hit an unexpected error.
    WebsocketInternalError,
    /// The server timed out writing to the client.
    WebsocketNetworkTimeout,
    /// The server hit a network error writing to the client.
    WebsocketNetworkError,
    /// Unknown status from the API (captures the raw value for debugging).
    #[serde(untagged)]
    #[strum(to_string = "{0}")]
    Unknown(String),
}

/// How notifications for a subscription are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum_macros::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
#[non_exhaustive]
pub enum TransportMethod {
    Websocket,
    Webhook,
    Conduit,
}

/// Transport details echoed back by Helix and in notification frames.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Transport {
    pub method: TransportMethod,
    /// Session the subscription is bound to (WebSocket transport only)
    #[serde(default)]
    pub session_id: Option<String>,
    /// Callback URL (webhook transport only)
    #[serde(default)]
    pub callback: Option<String>,
    #[serde(default)]
    pub connected_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub disconnected_at: Option<DateTime<Utc>>,
}
