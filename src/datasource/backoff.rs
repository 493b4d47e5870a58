use serde::{Deserialize, Serialize};
use std::time::Duration;
use utoipa::ToSchema;

/// Reconnection configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReconnectConfig {
    /// First retry delay in milliseconds, restored after every successful connect
    #[serde(default = "default_initial_delay")]
    pub initial_delay_ms: u64,

    /// Ceiling for the retry delay in milliseconds
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Factor applied to the delay after every failed attempt
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay(),
            max_delay_ms: default_max_delay(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}

/// Live feed connector configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct LiveFeedConfig {
    #[serde(default)]
    pub reconnect: ReconnectConfig,

    /// Liveness poll interval while connected, in milliseconds
    #[serde(default = "default_idle_poll")]
    pub idle_poll_ms: u64,
}

impl Default for LiveFeedConfig {
    fn default() -> Self {
        Self {
            reconnect: ReconnectConfig::default(),
            idle_poll_ms: default_idle_poll(),
        }
    }
}

// Default value functions for serde
fn default_initial_delay() -> u64 {
    500
}

fn default_max_delay() -> u64 {
    10_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

fn default_idle_poll() -> u64 {
    100
}

/// Capped exponential backoff
///
/// `next_delay` hands out the current delay and then grows it by the
/// multiplier, never past the ceiling.
#[derive(Debug, Clone)]
pub struct Backoff {
    initial: Duration,
    max: Duration,
    multiplier: f64,
    current: Duration,
}

impl Backoff {
    pub fn new(initial: Duration, max: Duration, multiplier: f64) -> Self {
        // A ceiling below the start would make the delay shrink
        let max = max.max(initial);
        let multiplier = if multiplier.is_finite() && multiplier >= 1.0 {
            multiplier
        } else {
            1.0
        };

        Self {
            initial,
            max,
            multiplier,
            current: initial,
        }
    }

    pub fn from_config(config: &ReconnectConfig) -> Self {
        Self::new(
            Duration::from_millis(config.initial_delay_ms),
            Duration::from_millis(config.max_delay_ms),
            config.backoff_multiplier,
        )
    }

    /// Delay to wait now; advances to the next, larger delay
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = Duration::try_from_secs_f64(self.current.as_secs_f64() * self.multiplier)
            .map_or(self.max, |next| next.min(self.max));
        delay
    }

    /// Delay the next call to `next_delay` will return
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Back to the initial delay
    pub fn reset(&mut self) {
        self.current = self.initial;
    }
}
