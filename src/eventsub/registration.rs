//! Creates the server-side subscriptions for a session.
//!
//! A registration pass walks the [`SubscriptionRegistry`] in order and issues one create
//! call per descriptor. A rate-limited call pauses the whole pass for the policy delay and
//! restarts it from the first descriptor, skipping descriptors already created for this
//! session. Any other error ends the pass immediately.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::sleep;

use super::registry::SubscriptionRegistry;
use crate::Result;
use crate::error::Error;
use crate::helix::types::{CreateSubscriptionRequest, SubscriptionRecord};

const DEFAULT_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_RETRY_DELAY: Duration = Duration::from_secs(600);

/// Outbound "create subscription" call.
///
/// Implementations report rate limiting as [`crate::error::Kind::RateLimited`] and
/// rejected credentials as [`crate::error::Kind::Unauthorized`].
/// [`crate::helix::Client`] is the production implementation.
#[async_trait]
pub trait SubscriptionApi: Send + Sync + 'static {
    async fn create(&self, request: &CreateSubscriptionRequest) -> Result<SubscriptionRecord>;
}

#[async_trait]
impl<T: SubscriptionApi + ?Sized> SubscriptionApi for Arc<T> {
    async fn create(&self, request: &CreateSubscriptionRequest) -> Result<SubscriptionRecord> {
        (**self).create(request).await
    }
}

/// What to do when every rate-limit retry has been spent.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum ExhaustionPolicy {
    /// Stop retrying and keep the session live with whatever was registered.
    #[default]
    Degrade,
    /// Fail the pass; the supervisor closes the connection and reconnects.
    Reconnect,
}

/// Rate-limit retry policy for registration passes.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Number of rate-limited passes tolerated per session
    pub max_attempts: u32,
    /// Fixed pause after each rate-limited pass
    pub delay: Duration,
    pub on_exhausted: ExhaustionPolicy,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            delay: DEFAULT_RETRY_DELAY,
            on_exhausted: ExhaustionPolicy::default(),
        }
    }
}

impl RetryPolicy {
    #[must_use]
    pub fn new(max_attempts: u32, delay: Duration, on_exhausted: ExhaustionPolicy) -> Self {
        Self {
            max_attempts,
            delay,
            on_exhausted,
        }
    }

    #[must_use]
    pub fn budget(&self) -> RetryBudget {
        RetryBudget {
            attempts_remaining: self.max_attempts,
            delay: self.delay,
        }
    }
}

/// Retries left for one registration phase. Fresh for every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryBudget {
    attempts_remaining: u32,
    delay: Duration,
}

impl RetryBudget {
    /// Spend one retry. Returns the delay to wait, or `None` if nothing was left.
    pub fn consume(&mut self) -> Option<Duration> {
        self.attempts_remaining = self.attempts_remaining.checked_sub(1)?;
        Some(self.delay)
    }

    #[must_use]
    pub fn attempts_remaining(&self) -> u32 {
        self.attempts_remaining
    }

    #[must_use]
    pub fn is_exhausted(&self) -> bool {
        self.attempts_remaining == 0
    }
}

/// Result of a registration phase that did not fail.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegistrationOutcome {
    /// Every descriptor has a subscription for the session.
    Registered {
        /// Number of passes it took, including rate-limited ones
        passes: u32,
    },
    /// The retry budget ran out under [`ExhaustionPolicy::Degrade`].
    Degraded {
        passes: u32,
        /// Descriptors still without a subscription
        missing: usize,
    },
}

impl RegistrationOutcome {
    #[must_use]
    pub fn is_registered(self) -> bool {
        matches!(self, Self::Registered { .. })
    }
}

/// Drives the create calls for every registered descriptor.
#[derive(Clone)]
pub struct RegistrationCoordinator {
    api: Arc<dyn SubscriptionApi>,
    registry: Arc<SubscriptionRegistry>,
    policy: RetryPolicy,
}

impl RegistrationCoordinator {
    pub fn new(
        api: Arc<dyn SubscriptionApi>,
        registry: Arc<SubscriptionRegistry>,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            api,
            registry,
            policy,
        }
    }

    #[must_use]
    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run one registration phase for `session_id`, appending created subscriptions to
    /// `records`.
    ///
    /// Each step creates the first registered descriptor that has no subscription yet, so
    /// descriptors registered or unregistered while the phase is running never cause
    /// another one to be skipped.
    ///
    /// # Errors
    ///
    /// Propagates any create error other than rate limiting. Under
    /// [`ExhaustionPolicy::Reconnect`] an exhausted budget is returned as the last
    /// rate-limit error.
    pub async fn run(
        &self,
        session_id: &str,
        records: &Mutex<Vec<SubscriptionRecord>>,
    ) -> Result<RegistrationOutcome> {
        let mut budget = self.policy.budget();
        let mut created: HashSet<String> = HashSet::new();
        let mut passes = 0_u32;

        'pass: loop {
            passes = passes.saturating_add(1);

            while let Some(descriptor) = self.registry.first_pending(&created) {
                match self.api.create(&descriptor.to_request(session_id)).await {
                    Ok(record) => {
                        #[cfg(feature = "tracing")]
                        tracing::debug!(
                            event_type = %descriptor.event_type,
                            subscription_id = %record.id,
                            cost = record.cost,
                            "Created subscription"
                        );

                        created.insert(descriptor.event_type.clone());
                        records
                            .lock()
                            .unwrap_or_else(PoisonError::into_inner)
                            .push(record);
                    }
                    Err(e) if e.is_rate_limited() => {
                        let Some(delay) = budget.consume() else {
                            return self.exhausted(passes, &created, e);
                        };

                        #[cfg(feature = "tracing")]
                        tracing::warn!(
                            event_type = %descriptor.event_type,
                            ?delay,
                            attempts_remaining = budget.attempts_remaining(),
                            "Rate limited while registering, pausing the pass"
                        );

                        sleep(delay).await;

                        if budget.is_exhausted() {
                            return self.exhausted(passes, &created, e);
                        }
                        continue 'pass;
                    }
                    Err(e) => {
                        #[cfg(feature = "tracing")]
                        tracing::error!(
                            event_type = %descriptor.event_type,
                            error = %e,
                            "Failed to create subscription"
                        );
                        return Err(e);
                    }
                }
            }

            return Ok(RegistrationOutcome::Registered { passes });
        }
    }

    fn exhausted(
        &self,
        passes: u32,
        created: &HashSet<String>,
        error: Error,
    ) -> Result<RegistrationOutcome> {
        let missing = self
            .registry
            .all()
            .iter()
            .filter(|descriptor| !created.contains(&descriptor.event_type))
            .count();

        #[cfg(feature = "tracing")]
        tracing::warn!(
            passes,
            missing,
            policy = ?self.policy.on_exhausted,
            "Registration retries exhausted"
        );

        match self.policy.on_exhausted {
            ExhaustionPolicy::Degrade => Ok(RegistrationOutcome::Degraded { passes, missing }),
            ExhaustionPolicy::Reconnect => Err(error),
        }
    }
}

impl std::fmt::Debug for RegistrationCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RegistrationCoordinator")
            .field("registry", &self.registry)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
