//! User callbacks invoked for notifications.

use std::future::Future;

use async_trait::async_trait;

use super::types::Notification;

/// Error returned by a [`Subscriber`]. It is logged and reported, never propagated.
pub type SubscriberError = Box<dyn std::error::Error + Send + Sync>;

/// Receives notifications for one subscription type.
///
/// A subscriber runs to completion before the next message is read, so long-running
/// work should be handed off to another task.
#[async_trait]
pub trait Subscriber: Send + Sync + 'static {
    async fn on_event(&self, notification: &Notification) -> Result<(), SubscriberError>;
}

/// Adapter turning an async closure into a [`Subscriber`]. Built by [`from_fn`].
#[derive(Clone)]
pub struct FnSubscriber<F> {
    callback: F,
}

/// Wrap an async closure that receives an owned [`Notification`].
///
/// # Example
///
/// ```
/// use eventsub_client::eventsub::subscriber;
///
/// let subscriber = subscriber::from_fn(|notification| async move {
///     println!("{} -> {}", notification.event_type(), notification.event);
///     Ok(())
/// });
/// # let _ = subscriber;
/// ```
pub fn from_fn<F, Fut>(callback: F) -> FnSubscriber<F>
where
    F: Fn(Notification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SubscriberError>> + Send,
{
    FnSubscriber { callback }
}

#[async_trait]
impl<F, Fut> Subscriber for FnSubscriber<F>
where
    F: Fn(Notification) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), SubscriberError>> + Send,
{
    async fn on_event(&self, notification: &Notification) -> Result<(), SubscriberError> {
        (self.callback)(notification.clone()).await
    }
}

impl<F> std::fmt::Debug for FnSubscriber<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSubscriber").finish_non_exhaustive()
    }
}
