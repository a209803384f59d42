//! Resettable one-shot timeout used to detect silent connections.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

type Callback = Arc<dyn Fn() -> crate::Result<()> + Send + Sync>;

/// One-shot timer that invokes a callback when no proof of life arrives in time.
///
/// Every [`arm`](Self::arm) or [`rearm`](Self::rearm) supersedes the previous timer.
/// A generation counter guarded by a mutex guarantees that a superseded or cancelled
/// timer never fires, and that each arming fires at most once. Callback errors and
/// panics are logged and swallowed.
pub struct HeartbeatWatchdog {
    on_timeout: Callback,
    timeout: Option<Duration>,
    generation: Arc<Mutex<u64>>,
    pending: Option<(CancellationToken, JoinHandle<()>)>,
}

impl HeartbeatWatchdog {
    /// Create a disarmed watchdog.
    pub fn new<F>(on_timeout: F) -> Self
    where
        F: Fn() -> crate::Result<()> + Send + Sync + 'static,
    {
        Self {
            on_timeout: Arc::new(on_timeout),
            timeout: None,
            generation: Arc::new(Mutex::new(0)),
            pending: None,
        }
    }

    /// Start (or restart) the countdown with a new timeout.
    pub fn arm(&mut self, timeout: Duration) {
        self.timeout = Some(timeout);
        self.schedule(timeout);
    }

    /// Restart the countdown with the last armed timeout.
    ///
    /// Returns `false` when the watchdog was never armed.
    pub fn rearm(&mut self) -> bool {
        match self.timeout {
            Some(timeout) => {
                self.schedule(timeout);
                true
            }
            None => false,
        }
    }

    /// Cancel any pending countdown. The last timeout is remembered for [`rearm`](Self::rearm).
    pub fn disarm(&mut self) {
        self.next_generation();
        if let Some((token, _handle)) = self.pending.take() {
            token.cancel();
        }
    }

    /// Whether a countdown is pending.
    #[must_use]
    pub fn is_armed(&self) -> bool {
        self.pending
            .as_ref()
            .is_some_and(|(_, handle)| !handle.is_finished())
    }

    /// Timeout used by the last [`arm`](Self::arm).
    #[must_use]
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout
    }

    fn next_generation(&self) -> u64 {
        let mut generation = self
            .generation
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        *generation = generation.wrapping_add(1);
        *generation
    }

    fn schedule(&mut self, timeout: Duration) {
        let armed_generation = self.next_generation();
        if let Some((token, _handle)) = self.pending.take() {
            token.cancel();
        }

        let token = CancellationToken::new();
        let cancelled = token.clone();
        let generation = Arc::clone(&self.generation);
        let on_timeout = Arc::clone(&self.on_timeout);

        let handle = tokio::spawn(async move {
            tokio::select! {
                () = cancelled.cancelled() => {}
                () = sleep(timeout) => {
                    {
                        let mut current = generation.lock().unwrap_or_else(PoisonError::into_inner);
                        if *current != armed_generation {
                            return;
                        }
                        // Consume this arming so a racing rearm cannot observe it as live.
                        *current = current.wrapping_add(1);
                    }

                    #[cfg(feature = "tracing")]
                    tracing::warn!(?timeout, "Heartbeat watchdog expired");

                    match catch_unwind(AssertUnwindSafe(|| on_timeout())) {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!(error = %e, "Watchdog timeout callback failed");
                            #[cfg(not(feature = "tracing"))]
                            let _ = &e;
                        }
                        Err(_panic) => {
                            #[cfg(feature = "tracing")]
                            tracing::error!("Watchdog timeout callback panicked");
                        }
                    }
                }
            }
        });

        self.pending = Some((token, handle));
    }
}

impl Drop for HeartbeatWatchdog {
    fn drop(&mut self) {
        self.disarm();
    }
}

impl std::fmt::Debug for HeartbeatWatchdog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatWatchdog")
            .field("timeout", &self.timeout)
            .field("armed", &self.is_armed())
            .finish_non_exhaustive()
    }
}
