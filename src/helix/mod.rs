//! Helix EventSub REST client and types.
//!
//! EventSub WebSocket sessions only deliver notifications for subscriptions that were
//! created over Helix with the session's id as transport. This module provides that call
//! plus the listing and deletion endpoints that are useful to inspect or clean up a
//! session's subscriptions.
//!
//! ## Available Endpoints
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/eventsub/subscriptions` | POST | Create a subscription bound to a WebSocket session |
//! | `/eventsub/subscriptions` | GET | List subscriptions, paginated with `after` |
//! | `/eventsub/subscriptions` | DELETE | Delete a subscription by id |
//!
//! # Example
//!
//! ```no_run
//! use eventsub_client::auth::Credentials;
//! use eventsub_client::helix::{Client, types::CreateSubscriptionRequest};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let credentials = Credentials::new("client-id".to_owned(), "user-token".to_owned());
//! let client = Client::with_credentials(credentials)?;
//!
//! let request = CreateSubscriptionRequest::websocket(
//!     "channel.follow",
//!     "2",
//!     [
//!         ("broadcaster_user_id".to_owned(), "1234".to_owned()),
//!         ("moderator_user_id".to_owned(), "1234".to_owned()),
//!     ]
//!     .into(),
//!     "AQoQexAWVYKSTIu4ec_2VAxyuhAB",
//! );
//! let record = client.create_subscription(&request).await?;
//! println!("{} is {}", record.id, record.status);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod types;

pub use client::Client;
