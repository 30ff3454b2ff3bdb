//! Capture worker
//!
//! Runs the periodic capture loop: authenticate, fetch every page, parse,
//! diff against the last good snapshot, persist and hand the result to the
//! host. Cycles run strictly one at a time on the calling thread; the host
//! stops the loop through the shared [`CancellationToken`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use super::fetch::{FetchOutcome, Paginator};
use super::retry::RetryPolicy;
use super::schedule::IntervalScheduler;
use super::state::{CaptureState, CaptureStateMachine};
use crate::catalog::{
    AuthStatus, Authenticator, FetchClient, FetchError, ItemParser, JsonItemParser, ParseError,
};
use crate::config::{CaptureConfig, ConfigSource};
use crate::diff::{DiffResult, compute_diffs};
use crate::host::{CancellationToken, CaptureHost};
use crate::models::{AuthCache, Item};
use crate::storage::SnapshotStore;

/// Upper bound on the wait between cycles (one week)
pub const MAX_WAIT_SECONDS: f64 = 7.0 * 24.0 * 3600.0;

/// A completed capture, delivered to the host
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CapturePayload {
    pub items: Vec<Item>,
    pub diff: DiffResult,
    /// Records fetched from the listing
    pub fetched: usize,
    /// Total the listing reported
    pub total: usize,
    pub captured_at: DateTime<Utc>,
}

/// Errors that end a cycle abnormally
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The fetch client cannot run at all
    #[error("capture setup failed: {0}")]
    Setup(String),
    #[error("could not parse fetched records: {0}")]
    Parse(#[from] ParseError),
    #[error("snapshot storage failed: {0:#}")]
    Storage(anyhow::Error),
    /// A panic or other bug inside the cycle
    #[error("unexpected capture failure: {0}")]
    Internal(String),
}

impl CaptureError {
    /// Whether the worker must fault and stop
    ///
    /// Parse failures are collaborator trouble and only back off.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CaptureError::Parse(_))
    }
}

/// How a cycle that didn't error ended
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Snapshot saved and delivered
    Captured { items: usize, changed: bool },
    /// The parser produced nothing; the previous snapshot was kept
    Empty,
    /// Cancellation arrived mid-fetch; nothing was kept
    Interrupted { fetched: usize, total: usize },
    /// The listing came up short; nothing was kept
    Incomplete { fetched: usize, total: usize },
    /// Every fetch attempt failed
    FetchFailed { attempts: u32, error: String },
    /// No credentials this cycle
    AuthUnavailable { retry_after: Option<f64> },
    /// The token was already cancelled
    Cancelled,
}

impl CycleOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, CycleOutcome::Captured { .. })
    }

    /// Whether the loop should exit after this outcome
    fn ends_loop(&self) -> bool {
        matches!(
            self,
            CycleOutcome::Interrupted { .. } | CycleOutcome::Cancelled
        )
    }
}

/// Result of the in-cycle fetch/retry loop
enum Attempt {
    Done(FetchOutcome),
    Failed { error: FetchError, attempts: u32 },
    Cancelled,
}

/// Periodic capture loop with injected collaborators
pub struct CaptureWorker {
    host: Arc<dyn CaptureHost>,
    client: Arc<dyn FetchClient>,
    parser: Arc<dyn ItemParser>,
    store: Arc<dyn SnapshotStore>,
    config: Arc<dyn ConfigSource>,
    auth: Authenticator,
    policy: RetryPolicy,
    scheduler: IntervalScheduler,
    state: CaptureStateMachine,
    token: CancellationToken,
    /// Last good snapshot, loaded from the store on first use
    previous: Option<Vec<Item>>,
    consecutive_failures: u32,
}

impl CaptureWorker {
    /// Create a worker
    ///
    /// The retry policy is derived from the config as it stands now and is
    /// fixed for the worker's lifetime; everything else is re-read per cycle.
    pub fn new(
        host: Arc<dyn CaptureHost>,
        client: Arc<dyn FetchClient>,
        store: Arc<dyn SnapshotStore>,
        auth: Authenticator,
        config: Arc<dyn ConfigSource>,
    ) -> Self {
        let policy = RetryPolicy::from_config(&config.current());
        let token = host.cancellation_token();

        let mut state = CaptureStateMachine::new();
        let observer = host.clone();
        state.subscribe(move |next, message| observer.on_status(next, message));

        Self {
            scheduler: IntervalScheduler::new(host.clone()),
            host,
            client,
            parser: Arc::new(JsonItemParser),
            store,
            config,
            auth,
            policy,
            state,
            token,
            previous: None,
            consecutive_failures: 0,
        }
    }

    /// Replace the default JSON record parser
    pub fn with_parser(mut self, parser: Arc<dyn ItemParser>) -> Self {
        self.parser = parser;
        self
    }

    pub fn state(&self) -> CaptureState {
        self.state.state()
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Failed cycles since the last successful capture
    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Register an extra observer for state transitions
    pub fn subscribe<F>(&mut self, observer: F)
    where
        F: Fn(CaptureState, Option<&str>) + Send + Sync + 'static,
    {
        self.state.subscribe(observer);
    }

    /// Run cycles until cancelled or faulted
    ///
    /// Always ends in `stopped`. Errors never escape: fatal ones fault the
    /// worker and cancel the token first.
    pub fn run(&mut self) {
        info!("Capture worker started");

        while !self.token.is_cancelled() {
            let outcome = match self.run_cycle() {
                Ok(outcome) => Some(outcome),
                Err(e) if e.is_fatal() => break,
                Err(_) => None,
            };
            if outcome.as_ref().is_some_and(CycleOutcome::ends_loop) {
                break;
            }

            let config = self.config.current();
            let wait = self.next_wait(&config, outcome.as_ref());
            self.log(&format!("Next capture in {}", format_wait(wait)));
            if self.scheduler.wait(wait, "next capture") {
                break;
            }
        }

        self.state
            .transition(CaptureState::Stopped, Some("Capture stopped"));
        info!("Capture worker stopped");
    }

    /// Run a single cycle with the current config
    ///
    /// Failure bookkeeping (counter, state, cancellation) is done here, so
    /// the caller only decides whether to continue.
    pub fn run_cycle(&mut self) -> Result<CycleOutcome, CaptureError> {
        let config = self.config.current();
        let result = match panic::catch_unwind(AssertUnwindSafe(|| self.cycle(&config))) {
            Ok(result) => result,
            Err(payload) => Err(CaptureError::Internal(panic_message(payload))),
        };

        if let Err(e) = &result {
            if e.is_fatal() {
                self.fault(e);
            } else {
                self.fail(&format!("Capture failed: {}", e));
            }
        }
        result
    }

    fn cycle(&mut self, config: &CaptureConfig) -> Result<CycleOutcome, CaptureError> {
        if self.token.is_cancelled() {
            return Ok(CycleOutcome::Cancelled);
        }

        // Faults are only reachable from an active cycle
        self.state
            .transition(CaptureState::Running, Some("Capture started"));

        self.client
            .ensure_ready()
            .map_err(|e| CaptureError::Setup(e.to_string()))?;

        let auth = match self.auth.ensure(self.host.as_ref()) {
            AuthStatus::Ready(auth) => auth,
            AuthStatus::Unavailable {
                reason,
                retry_after,
            } => {
                if self.token.is_cancelled() {
                    return Ok(CycleOutcome::Cancelled);
                }
                self.fail(&reason);
                return Ok(CycleOutcome::AuthUnavailable { retry_after });
            }
        };

        let (records, fetched, total) = match self.fetch_with_retry(config, auth)? {
            Attempt::Cancelled => return Ok(CycleOutcome::Cancelled),
            Attempt::Failed { error, attempts } => {
                self.fail(&format!(
                    "Fetch failed after {} attempt(s): {}",
                    attempts, error
                ));
                return Ok(CycleOutcome::FetchFailed {
                    attempts,
                    error: error.to_string(),
                });
            }
            Attempt::Done(FetchOutcome::Interrupted { fetched, total }) => {
                self.log(&format!(
                    "Capture interrupted ({}/{}); discarding partial results",
                    fetched, total
                ));
                return Ok(CycleOutcome::Interrupted { fetched, total });
            }
            Attempt::Done(FetchOutcome::Incomplete { fetched, total }) => {
                self.fail(&format!(
                    "Capture incomplete ({}/{}); discarding partial results",
                    fetched, total
                ));
                return Ok(CycleOutcome::Incomplete { fetched, total });
            }
            Attempt::Done(FetchOutcome::Complete { records, total }) => {
                let fetched = records.len();
                (records, fetched, total)
            }
        };

        let items = self.parser.parse(&records)?;
        if items.is_empty() {
            self.fail("Capture returned no items; keeping previous snapshot");
            return Ok(CycleOutcome::Empty);
        }

        let previous = self.previous_snapshot()?;
        let diff = compute_diffs(&items, previous);

        self.store
            .save_last_parse(&items)
            .map_err(CaptureError::Storage)?;
        if diff.has_changes() {
            self.store
                .append_change_log(&diff.to_change_record(items.len()), config.change_log_limit)
                .map_err(CaptureError::Storage)?;
        }

        let changed = diff.has_changes();
        let summary = diff.summary();
        let payload = CapturePayload {
            items,
            diff,
            fetched,
            total,
            captured_at: Utc::now(),
        };
        self.host.apply_payload(&payload);
        let count = payload.items.len();
        self.previous = Some(payload.items);
        self.consecutive_failures = 0;

        self.state
            .transition(CaptureState::Running, Some("Capture succeeded"));
        self.log(&format!("Captured {} items: {}", count, summary));

        Ok(CycleOutcome::Captured {
            items: count,
            changed,
        })
    }

    /// Paginate, retrying retryable failures with linear-capped pauses
    fn fetch_with_retry(
        &mut self,
        config: &CaptureConfig,
        mut auth: AuthCache,
    ) -> Result<Attempt, CaptureError> {
        let max_attempts = self.policy.attempts.saturating_add(1);
        let mut needs_auth = false;
        let mut attempt = 0;

        loop {
            attempt += 1;

            if needs_auth {
                match self.auth.ensure(self.host.as_ref()) {
                    AuthStatus::Ready(fresh) => auth = fresh,
                    AuthStatus::Unavailable { reason, .. } => {
                        warn!("Re-authentication failed: {}", reason);
                        return Ok(Attempt::Failed {
                            error: FetchError::Unauthorized(401),
                            attempts: attempt - 1,
                        });
                    }
                }
                needs_auth = false;
            }

            let paginator = Paginator {
                client: self.client.as_ref(),
                scheduler: &self.scheduler,
                token: &self.token,
                page_size: config.effective_page_size(),
                page_wait_seconds: config.page_wait_seconds,
            };
            let result = paginator.fetch_all(&auth, &config.filter, |fetched, total| {
                debug!("Fetched {}/{} records", fetched, total)
            });

            let error = match result {
                Ok(outcome) => return Ok(Attempt::Done(outcome)),
                Err(e) if !e.is_retryable() => return Err(CaptureError::Setup(e.to_string())),
                Err(e) => e,
            };

            if let FetchError::Unauthorized(_) = error {
                self.auth.invalidate();
                needs_auth = true;
            }

            if attempt >= max_attempts {
                return Ok(Attempt::Failed {
                    error,
                    attempts: attempt,
                });
            }

            let wait = self.policy.attempt_wait(attempt);
            self.log(&format!(
                "Fetch attempt {}/{} failed: {}; retrying in {}",
                attempt,
                max_attempts,
                error,
                format_wait(wait)
            ));
            if self.scheduler.wait(wait, "retry") {
                return Ok(Attempt::Cancelled);
            }
        }
    }

    fn previous_snapshot(&mut self) -> Result<&[Item], CaptureError> {
        if self.previous.is_none() {
            let loaded = self
                .store
                .load_last_parse()
                .map_err(CaptureError::Storage)?;
            debug!("Loaded previous snapshot with {} items", loaded.len());
            self.previous = Some(loaded);
        }
        Ok(self.previous.as_deref().unwrap_or_default())
    }

    fn next_wait(&self, config: &CaptureConfig, outcome: Option<&CycleOutcome>) -> f64 {
        if let Some(CycleOutcome::AuthUnavailable {
            retry_after: Some(seconds),
        }) = outcome
        {
            return seconds.min(MAX_WAIT_SECONDS);
        }
        let base = self
            .scheduler
            .next_interval(config.interval_seconds, config);
        self.policy
            .interval_with_backoff(base, self.consecutive_failures)
            .min(MAX_WAIT_SECONDS)
    }

    /// Record a non-fatal failed cycle
    fn fail(&mut self, message: &str) {
        self.consecutive_failures += 1;
        warn!("{}", message);
        self.host.capture_log(message);
        self.state
            .transition(CaptureState::Retrying, Some(message));
    }

    fn fault(&mut self, err: &CaptureError) {
        let message = format!("Capture stopped: {}", err);
        error!("{}", message);
        self.host.capture_log(&message);
        self.state
            .transition(CaptureState::Faulted, Some(&message));
        self.token.cancel();
    }

    fn log(&self, message: &str) {
        info!("{}", message);
        self.host.capture_log(message);
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

/// Render a wait like "45s" or "10m 5s"
fn format_wait(seconds: f64) -> String {
    let total = seconds.max(0.0).round() as u64;
    match (total / 60, total % 60) {
        (0, s) => format!("{}s", s),
        (m, 0) => format!("{}m", m),
        (m, s) => format!("{}m {}s", m, s),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_wait() {
        assert_eq!(format_wait(0.4), "0s");
        assert_eq!(format_wait(45.0), "45s");
        assert_eq!(format_wait(600.0), "10m");
        assert_eq!(format_wait(605.2), "10m 5s");
        assert_eq!(format_wait(-3.0), "0s");
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new("bang".to_string())), "bang");
        assert_eq!(panic_message(Box::new(7u8)), "panic with non-string payload");
    }

    #[test]
    fn test_only_parse_errors_are_recoverable() {
        assert!(!CaptureError::Parse(ParseError::NoUsableRecords { total: 3 }).is_fatal());
        assert!(CaptureError::Setup("x".into()).is_fatal());
        assert!(CaptureError::Storage(anyhow::anyhow!("disk")).is_fatal());
        assert!(CaptureError::Internal("x".into()).is_fatal());
    }

    #[test]
    fn test_outcome_flags() {
        assert!(
            CycleOutcome::Captured {
                items: 1,
                changed: false
            }
            .is_success()
        );
        assert!(!CycleOutcome::Empty.is_success());
        assert!(
            CycleOutcome::Interrupted {
                fetched: 1,
                total: 2
            }
            .ends_loop()
        );
        assert!(
            !CycleOutcome::Incomplete {
                fetched: 1,
                total: 2
            }
            .ends_loop()
        );
    }
}
