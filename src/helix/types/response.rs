use bon::Builder;
use chrono::{DateTime, Utc};
use serde::Deserialize;

use super::{Condition, SubscriptionStatus, Transport};

/// A subscription as known by the server.
///
/// Returned by the create call, listed by `GET /eventsub/subscriptions` and embedded in
/// notification and revocation frames.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Builder)]
#[builder(on(String, into))]
pub struct SubscriptionRecord {
    /// Server-assigned subscription id
    pub id: String,
    pub status: SubscriptionStatus,
    #[serde(rename = "type")]
    pub event_type: String,
    pub version: String,
    #[serde(default)]
    #[builder(default)]
    pub condition: Condition,
    /// Absent in the trimmed copies carried by some frames
    #[serde(default)]
    pub transport: Option<Transport>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    #[builder(default)]
    pub cost: u32,
}

/// One page of `GET /eventsub/subscriptions`, also the envelope of the create response.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SubscriptionsPage {
    pub data: Vec<SubscriptionRecord>,
    #[serde(default)]
    pub total: u32,
    #[serde(default)]
    pub total_cost: u32,
    #[serde(default)]
    pub max_total_cost: u32,
    #[serde(default)]
    pub pagination: Pagination,
}

#[non_exhaustive]
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Pagination {
    /// Cursor to pass as `after` for the next page; absent on the last page
    #[serde(default)]
    pub cursor: Option<String>,
}
