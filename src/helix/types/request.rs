use bon::Builder;
use serde::Serialize;

use super::{Condition, SubscriptionStatus, TransportMethod};

/// Request body for `POST /eventsub/subscriptions`.
///
/// # Example
///
/// ```
/// use eventsub_client::helix::types::CreateSubscriptionRequest;
///
/// let request = CreateSubscriptionRequest::websocket(
///     "stream.online",
///     "1",
///     [("broadcaster_user_id".to_owned(), "1234".to_owned())].into(),
///     "AQoQexAWVYKSTIu4ec_2VAxyuhAB",
/// );
/// assert_eq!(request.event_type, "stream.online");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Builder)]
#[builder(on(String, into))]
pub struct CreateSubscriptionRequest {
    /// Subscription type name, e.g. `channel.follow`
    #[serde(rename = "type")]
    pub event_type: String,
    /// Version of the subscription type
    pub version: String,
    #[builder(default)]
    pub condition: Condition,
    pub transport: TransportRequest,
}

impl CreateSubscriptionRequest {
    /// Create a request that binds the subscription to a WebSocket session.
    #[must_use]
    pub fn websocket(
        event_type: &str,
        version: &str,
        condition: Condition,
        session_id: &str,
    ) -> Self {
        Self {
            event_type: event_type.to_owned(),
            version: version.to_owned(),
            condition,
            transport: TransportRequest::websocket(session_id),
        }
    }
}

/// Transport section of a create request.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransportRequest {
    pub method: TransportMethod,
    pub session_id: String,
}

impl TransportRequest {
    #[must_use]
    pub fn websocket(session_id: &str) -> Self {
        Self {
            method: TransportMethod::Websocket,
            session_id: session_id.to_owned(),
        }
    }
}

/// Filters for `GET /eventsub/subscriptions`. Helix accepts at most one of them per call.
///
/// # Example
///
/// ```
/// use eventsub_client::ToQueryParams as _;
/// use eventsub_client::helix::types::SubscriptionsRequest;
///
/// let request = SubscriptionsRequest::builder().event_type("channel.follow").build();
/// assert_eq!(request.query_params(None), "?type=channel.follow");
/// ```
#[non_exhaustive]
#[derive(Debug, Clone, Default, Serialize, Builder)]
pub struct SubscriptionsRequest {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<SubscriptionStatus>,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub event_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[builder(into)]
    pub subscription_id: Option<String>,
}
