//! Host callback surface and cooperative cancellation
//!
//! The worker never talks to a UI directly. Everything user-facing goes
//! through [`CaptureHost`], which the embedding application implements and
//! marshals onto its own dispatch mechanism.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::models::AuthCache;
use crate::sync::{CapturePayload, CaptureState};

/// Longest single sleep between cancellation checks
pub const WAIT_SLICE: Duration = Duration::from_millis(200);

/// Shared stop flag checked at every blocking point of a capture cycle
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Clear a previous cancellation so the token can gate a new run
    pub fn reset(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    /// Sleep for `duration` in short slices, returning `true` as soon as
    /// cancellation is observed
    ///
    /// A duration too long to express as a deadline sleeps until cancelled.
    pub fn sleep(&self, duration: Duration) -> bool {
        let deadline = Instant::now().checked_add(duration);
        loop {
            if self.is_cancelled() {
                return true;
            }
            let slice = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    WAIT_SLICE.min(deadline - now)
                }
                None => WAIT_SLICE,
            };
            std::thread::sleep(slice);
        }
    }
}

/// Callbacks the capture worker uses to reach its host application
pub trait CaptureHost: Send + Sync {
    /// Append a human-readable line to the host's capture log
    fn capture_log(&self, message: &str);

    /// Deliver a completed capture (items and diff) for display/notification
    fn apply_payload(&self, payload: &CapturePayload);

    /// Report a state machine transition
    fn on_status(&self, state: CaptureState, message: Option<&str>);

    /// Token that gates the capture loop
    fn cancellation_token(&self) -> CancellationToken;

    /// Wait up to `seconds`, returning `true` if cancellation was requested
    ///
    /// `label` names the wait ("next capture", "retry", ...) for hosts that
    /// show a countdown.
    fn responsive_wait(&self, seconds: f64, label: &str) -> bool {
        log::debug!("Waiting {:.1}s ({})", seconds, label);
        let token = self.cancellation_token();
        if !seconds.is_finite() || seconds <= 0.0 {
            return token.is_cancelled();
        }
        let duration = Duration::try_from_secs_f64(seconds).unwrap_or(Duration::MAX);
        token.sleep(duration)
    }

    /// Run the interactive login flow, returning captured credentials
    ///
    /// `None` means the login was abandoned, failed, or is not supported.
    fn prompt_manual_login(&self) -> Option<AuthCache>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sleep_completes_without_cancel() {
        let token = CancellationToken::new();
        assert!(!token.sleep(Duration::from_millis(10)));
    }

    #[test]
    fn test_sleep_returns_immediately_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_cancel_from_other_thread_interrupts_sleep() {
        let token = CancellationToken::new();
        let remote = token.clone();
        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(50));
            remote.cancel();
        });
        let start = Instant::now();
        assert!(token.sleep(Duration::from_secs(30)));
        assert!(start.elapsed() < Duration::from_secs(2));
        handle.join().unwrap();
    }

    #[test]
    fn test_huge_sleep_returns_when_cancelled() {
        let token = CancellationToken::new();
        token.cancel();
        assert!(token.sleep(Duration::MAX));
    }

    struct IdleHost {
        token: CancellationToken,
    }

    impl CaptureHost for IdleHost {
        fn capture_log(&self, _message: &str) {}
        fn apply_payload(&self, _payload: &CapturePayload) {}
        fn on_status(&self, _state: CaptureState, _message: Option<&str>) {}
        fn cancellation_token(&self) -> CancellationToken {
            self.token.clone()
        }
        fn prompt_manual_login(&self) -> Option<AuthCache> {
            None
        }
    }

    #[test]
    fn test_responsive_wait_accepts_out_of_range_seconds() {
        let host = IdleHost {
            token: CancellationToken::new(),
        };
        host.token.cancel();
        assert!(host.responsive_wait(1e20, "next capture"));
        assert!(host.responsive_wait(f64::MAX, "next capture"));
        assert!(host.responsive_wait(f64::INFINITY, "next capture"));
    }

    #[test]
    fn test_responsive_wait_short_completes() {
        let host = IdleHost {
            token: CancellationToken::new(),
        };
        assert!(!host.responsive_wait(0.01, "retry"));
    }

    #[test]
    fn test_reset() {
        let token = CancellationToken::new();
        token.cancel();
        token.reset();
        assert!(!token.is_cancelled());
    }
}
