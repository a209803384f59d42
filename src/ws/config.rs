#![expect(
    clippy::module_name_repetitions,
    reason = "Configuration types intentionally mirror the module name for clarity"
)]

use std::time::Duration;

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};

const DEFAULT_WELCOME_TIMEOUT_DURATION: Duration = Duration::from_secs(10);
const DEFAULT_INITIAL_BACKOFF_DURATION: Duration = Duration::from_secs(1);
const DEFAULT_MAX_BACKOFF_DURATION: Duration = Duration::from_secs(60);
const DEFAULT_BACKOFF_MULTIPLIER: f64 = 2.0;

/// Configuration for WebSocket connection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct Config {
    /// Maximum time to wait for `session_welcome` after the socket opens
    pub welcome_timeout: Duration,
    /// Which inbound traffic counts as proof of life for the keepalive watchdog
    pub liveness: Liveness,
    /// Reconnection strategy configuration
    pub reconnect: ReconnectConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            welcome_timeout: DEFAULT_WELCOME_TIMEOUT_DURATION,
            liveness: Liveness::default(),
            reconnect: ReconnectConfig::default(),
        }
    }
}

/// Which inbound traffic rearms the keepalive watchdog.
#[non_exhaustive]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Liveness {
    /// Every inbound message rearms, including notifications and WebSocket pings.
    /// The server skips keepalives while it is sending notifications, so this is the default.
    #[default]
    AnyFrame,
    /// Only `session_keepalive` messages rearm.
    KeepaliveOnly,
}

/// Configuration for automatic reconnection behavior.
#[non_exhaustive]
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of consecutive failed connection attempts before giving up.
    /// `None` means infinite retries.
    pub max_attempts: Option<u32>,
    /// Initial backoff duration for first reconnection attempt
    pub initial_backoff: Duration,
    /// Maximum backoff duration
    pub max_backoff: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: None, // Infinite reconnection by default
            initial_backoff: DEFAULT_INITIAL_BACKOFF_DURATION,
            max_backoff: DEFAULT_MAX_BACKOFF_DURATION,
            backoff_multiplier: DEFAULT_BACKOFF_MULTIPLIER,
        }
    }
}

impl ReconnectConfig {
    /// Reconnect after a fixed delay, without jitter. Mostly useful in tests.
    #[must_use]
    pub fn fixed(delay: Duration) -> Self {
        Self {
            max_attempts: None,
            initial_backoff: delay,
            max_backoff: delay,
            backoff_multiplier: 1.0,
        }
    }
}

impl From<ReconnectConfig> for ExponentialBackoff {
    fn from(config: ReconnectConfig) -> Self {
        let randomization_factor = if config.initial_backoff == config.max_backoff {
            0.0
        } else {
            backoff::default::RANDOMIZATION_FACTOR
        };

        ExponentialBackoffBuilder::default()
            .with_initial_interval(config.initial_backoff)
            .with_max_interval(config.max_backoff)
            .with_multiplier(config.backoff_multiplier)
            .with_randomization_factor(randomization_factor)
            .with_max_elapsed_time(None) // We handle max attempts separately
            .build()
    }
}
