use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt as _;

use super::registry::SubscriptionRegistry;
use super::types::Notification;

/// What happened to a routed notification.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteOutcome {
    Delivered,
    /// No descriptor is registered for the notification's event type
    Unregistered,
    /// The subscriber returned an error or panicked
    Failed(String),
}

/// Hands notifications to the subscriber registered for their event type.
///
/// Subscriber errors and panics are contained here; they never reach the read loop.
#[derive(Debug, Clone)]
pub struct NotificationRouter {
    registry: Arc<SubscriptionRegistry>,
}

impl NotificationRouter {
    #[must_use]
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn route(&self, notification: &Notification) -> RouteOutcome {
        let event_type = notification.event_type();

        let Some(descriptor) = self.registry.lookup(event_type) else {
            #[cfg(feature = "tracing")]
            tracing::warn!(
                %event_type,
                message_id = %notification.metadata.message_id,
                "Notification for unregistered event type"
            );
            return RouteOutcome::Unregistered;
        };

        let result = AssertUnwindSafe(descriptor.subscriber.on_event(notification))
            .catch_unwind()
            .await;

        let error = match result {
            Ok(Ok(())) => return RouteOutcome::Delivered,
            Ok(Err(e)) => e.to_string(),
            Err(panic) => format!("subscriber panicked: {}", panic_message(panic.as_ref())),
        };

        #[cfg(feature = "tracing")]
        tracing::error!(
            %event_type,
            message_id = %notification.metadata.message_id,
            %error,
            "Subscriber failed"
        );

        RouteOutcome::Failed(error)
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("<non-string payload>")
}
