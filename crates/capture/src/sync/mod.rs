//! Capture engine
//!
//! Scheduling, retry/backoff, the worker lifecycle state machine and the
//! capture loop itself. A cycle either completes fully (every reported
//! record fetched and parsed) or leaves the stored snapshot untouched.

mod fetch;
mod retry;
mod schedule;
mod state;
mod worker;

pub use fetch::{FetchOutcome, Paginator};
pub use retry::{DEFAULT_BACKOFF_MAX, RetryPolicy};
pub use schedule::{IntervalScheduler, in_window, next_interval_at, parse_hhmm};
pub use state::{CaptureState, CaptureStateMachine};
pub use worker::{CaptureError, CapturePayload, CaptureWorker, CycleOutcome, MAX_WAIT_SECONDS};
