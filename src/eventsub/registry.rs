#![expect(
    clippy::module_name_repetitions,
    reason = "Registry types expose their domain in the name for clarity"
)]

use std::collections::HashSet;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use super::subscriber::Subscriber;
use crate::helix::types::{Condition, CreateSubscriptionRequest};

/// What the client wants to hear about: one subscription type, its version and filter,
/// and the subscriber that receives its notifications.
///
/// Identified by `event_type`; never mutated after creation.
#[non_exhaustive]
#[derive(Clone)]
pub struct EventDescriptor {
    pub event_type: String,
    pub version: String,
    pub condition: Condition,
    pub subscriber: Arc<dyn Subscriber>,
}

impl EventDescriptor {
    pub fn new<S: Subscriber>(
        event_type: &str,
        version: &str,
        condition: Condition,
        subscriber: S,
    ) -> Self {
        Self {
            event_type: event_type.to_owned(),
            version: version.to_owned(),
            condition,
            subscriber: Arc::new(subscriber),
        }
    }

    /// Build the create call binding this descriptor to `session_id`.
    #[must_use]
    pub fn to_request(&self, session_id: &str) -> CreateSubscriptionRequest {
        CreateSubscriptionRequest::websocket(
            &self.event_type,
            &self.version,
            self.condition.clone(),
            session_id,
        )
    }
}

impl fmt::Debug for EventDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDescriptor")
            .field("event_type", &self.event_type)
            .field("version", &self.version)
            .field("condition", &self.condition)
            .finish_non_exhaustive()
    }
}

/// Ordered map of event type to descriptor, safe to share between threads.
///
/// Registering an event type that already exists replaces the descriptor but keeps
/// its original position, so registration passes stay in first-registered order.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    entries: RwLock<Vec<Arc<EventDescriptor>>>,
}

impl SubscriptionRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace the descriptor for its event type. Returns the replaced one.
    pub fn register(&self, descriptor: EventDescriptor) -> Option<Arc<EventDescriptor>> {
        let descriptor = Arc::new(descriptor);
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);

        match entries
            .iter_mut()
            .find(|entry| entry.event_type == descriptor.event_type)
        {
            Some(entry) => Some(std::mem::replace(entry, descriptor)),
            None => {
                entries.push(descriptor);
                None
            }
        }
    }

    /// Remove the descriptor for `event_type`.
    pub fn unregister(&self, event_type: &str) -> Option<Arc<EventDescriptor>> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let position = entries
            .iter()
            .position(|entry| entry.event_type == event_type)?;

        Some(entries.remove(position))
    }

    #[must_use]
    pub fn lookup(&self, event_type: &str) -> Option<Arc<EventDescriptor>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| entry.event_type == event_type)
            .cloned()
    }

    /// Snapshot of every descriptor in registration order.
    #[must_use]
    pub fn all(&self) -> Vec<Arc<EventDescriptor>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// First descriptor, in registration order, whose event type is not in `done`.
    ///
    /// Registration passes walk the registry with this instead of by position, so entries
    /// added or removed while a pass is running neither get skipped nor visited twice.
    #[must_use]
    pub fn first_pending(&self, done: &HashSet<String>) -> Option<Arc<EventDescriptor>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|entry| !done.contains(&entry.event_type))
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
