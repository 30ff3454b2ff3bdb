//! Retry and backoff parameters

use crate::config::CaptureConfig;

/// Multiplier cap used when the configured one is unusable
pub const DEFAULT_BACKOFF_MAX: f64 = 4.0;

/// Wait/backoff parameters, fixed for the lifetime of a worker
///
/// Backoff is linear and capped, not exponential: the n-th step waits
/// `n * wait`, up to `backoff_max * wait`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Extra fetch attempts within one cycle
    pub attempts: u32,
    /// Base wait between attempts, in seconds
    pub wait_seconds: f64,
    /// Cap on the backoff multiplier (≥ 1)
    pub backoff_max: f64,
}

impl RetryPolicy {
    pub fn from_config(cfg: &CaptureConfig) -> Self {
        let attempts = cfg.retry_attempts.clamp(0, u32::MAX as i64) as u32;

        let wait_seconds = if cfg.retry_wait_seconds > 0.0 {
            cfg.retry_wait_seconds
        } else {
            cfg.post_nav_wait_seconds.max(0.0)
        };

        let configured = if cfg.retry_backoff_max.is_finite() {
            cfg.retry_backoff_max
        } else {
            DEFAULT_BACKOFF_MAX
        };

        Self {
            attempts,
            wait_seconds,
            backoff_max: configured.max(1.0),
        }
    }

    /// Wait before retry `attempt` (1-based): `wait * min(max(1, attempt), backoff_max)`
    pub fn attempt_wait(&self, attempt: u32) -> f64 {
        let multiplier = (attempt.max(1) as f64).min(self.backoff_max);
        self.wait_seconds * multiplier
    }

    /// Stretch `base` after `failures` consecutive failed cycles
    pub fn interval_with_backoff(&self, base: f64, failures: u32) -> f64 {
        if failures == 0 {
            return base;
        }
        base * (1.0 + failures as f64).min(self.backoff_max)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&CaptureConfig::default())
    }
}
