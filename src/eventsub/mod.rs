//! EventSub over WebSocket.
//!
//! [`EventMonitor`] keeps a session with the EventSub WebSocket server alive, creates a
//! subscription for every registered event type through a [`SubscriptionApi`] and hands
//! notifications to their [`Subscriber`].
//!
//! # Session lifecycle
//!
//! | Message                | Effect                                                     |
//! |------------------------|------------------------------------------------------------|
//! | `session_welcome`      | Must come first; arms the keepalive watchdog, starts registration |
//! | `session_keepalive`    | Rearms the watchdog                                        |
//! | `notification`         | Routed to the subscriber of its subscription type          |
//! | `session_reconnect`    | Close and dial the new URL immediately; the URL sticks     |
//! | `revocation`           | Close and reconnect                                        |
//! | anything else          | Logged and skipped                                         |
//!
//! A keepalive timeout, a decode failure or a non-welcome first message closes the
//! connection and reconnects with exponential backoff. A handshake or create call refused
//! with 401/403 stops the monitor for good.
//!
//! Registration runs alongside frame reading, so a rate-limit pause never starves the
//! watchdog.

pub mod client;
pub mod registration;
pub mod registry;
pub mod router;
pub mod state;
pub mod subscriber;
mod supervisor;
pub mod types;

pub use client::{EventMonitor, MonitorConfig};
pub use registration::{
    ExhaustionPolicy, RegistrationCoordinator, RegistrationOutcome, RetryBudget, RetryPolicy,
    SubscriptionApi,
};
pub use registry::{EventDescriptor, SubscriptionRegistry};
pub use router::{NotificationRouter, RouteOutcome};
pub use state::{ConnectionState, MonitorEvent, StopReason};
pub use subscriber::{Subscriber, SubscriberError};
pub use types::{Frame, Notification, Session};
