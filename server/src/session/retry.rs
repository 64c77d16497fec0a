//! Reconnect and start-retry timing

use std::time::Duration;

use crate::config::SessionConfig;

/// Timing policy for reconnects and failed starts.
///
/// The default is a fixed, unbounded interval. `max_start_attempts` and
/// `backoff_factor` are opt-in.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Delay before reconnecting after a non-logout close
    pub reconnect_delay: Duration,
    /// Base delay before retrying a failed start
    pub start_retry_delay: Duration,
    pub max_start_attempts: Option<u32>,
    pub backoff_factor: f64,
    pub max_retry_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            reconnect_delay: Duration::from_secs(3),
            start_retry_delay: Duration::from_secs(5),
            max_start_attempts: None,
            backoff_factor: 1.0,
            max_retry_delay: Duration::from_secs(300),
        }
    }
}

impl From<&SessionConfig> for RetryPolicy {
    fn from(config: &SessionConfig) -> Self {
        Self {
            reconnect_delay: config.reconnect_delay,
            start_retry_delay: config.start_retry_delay,
            max_start_attempts: config.max_start_attempts,
            backoff_factor: config.backoff_factor,
            max_retry_delay: config.max_retry_delay,
        }
    }
}

impl RetryPolicy {
    /// No delays at all
    pub fn immediate() -> Self {
        Self {
            reconnect_delay: Duration::ZERO,
            start_retry_delay: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn with_max_start_attempts(mut self, attempts: u32) -> Self {
        self.max_start_attempts = Some(attempts);
        self
    }

    /// Delay before the next start after `failures` consecutive failures,
    /// or `None` once the attempt cap is reached.
    pub fn start_retry_delay(&self, failures: u32) -> Option<Duration> {
        if let Some(max) = self.max_start_attempts
            && failures >= max
        {
            return None;
        }
        if self.backoff_factor <= 1.0 {
            return Some(self.start_retry_delay);
        }
        let exponent = failures.saturating_sub(1).min(32) as i32;
        let secs = self.start_retry_delay.as_secs_f64() * self.backoff_factor.powi(exponent);
        Some(Duration::from_secs_f64(secs.min(self.max_retry_delay.as_secs_f64())))
    }
}
