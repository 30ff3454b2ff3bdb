//! Capture interval scheduling
//!
//! Pure interval math (quiet-hours override) plus the cancellable wait the
//! worker uses between cycles, pages and retries.

use std::sync::Arc;

use chrono::{Local, NaiveTime};
use log::warn;

use crate::config::CaptureConfig;
use crate::host::CaptureHost;

/// Computes capture intervals and performs cancellable waits
pub struct IntervalScheduler {
    host: Arc<dyn CaptureHost>,
}

impl IntervalScheduler {
    pub fn new(host: Arc<dyn CaptureHost>) -> Self {
        Self { host }
    }

    /// Interval until the next capture, using the local wall clock
    pub fn next_interval(&self, base: f64, config: &CaptureConfig) -> f64 {
        next_interval_at(base, config, Local::now().time())
    }

    /// Wait `seconds` through the host, returning `true` if cancelled
    ///
    /// `true` means "stop now", not an error.
    pub fn wait(&self, seconds: f64, label: &str) -> bool {
        self.host.responsive_wait(seconds, label)
    }
}

/// Interval until the next capture at wall-clock time `now`
///
/// Returns `base` unless quiet hours are enabled and `now` falls inside the
/// window, in which case the quiet interval applies (falling back to `base`
/// when it isn't positive).
pub fn next_interval_at(base: f64, config: &CaptureConfig, now: NaiveTime) -> f64 {
    if !config.quiet_hours_enabled {
        return base;
    }

    let (Some(start), Some(end)) = (
        parse_hhmm(&config.quiet_hours_start),
        parse_hhmm(&config.quiet_hours_end),
    ) else {
        warn!(
            "Ignoring quiet hours with invalid window {:?}-{:?}",
            config.quiet_hours_start, config.quiet_hours_end
        );
        return base;
    };

    if !in_window(now, start, end) {
        return base;
    }

    let quiet = config.quiet_hours_interval_seconds;
    if quiet > 0.0 { quiet } else { base }
}

/// Whether `now` lies in `[start, end)`
///
/// `start > end` is an overnight window that wraps past midnight.
pub fn in_window(now: NaiveTime, start: NaiveTime, end: NaiveTime) -> bool {
    if start <= end {
        start <= now && now < end
    } else {
        now >= start || now < end
    }
}

/// Parse an "HH:MM" local time
pub fn parse_hhmm(value: &str) -> Option<NaiveTime> {
    NaiveTime::parse_from_str(value.trim(), "%H:%M").ok()
}
