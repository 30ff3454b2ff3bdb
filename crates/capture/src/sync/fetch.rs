//! Paginated catalogue fetch
//!
//! Pulls every page the listing reports, checking the cancellation token
//! between pages. Partial results never leave this module as a success:
//! the caller only gets records back from [`FetchOutcome::Complete`].

use log::debug;
use serde_json::Value;

use super::schedule::IntervalScheduler;
use crate::catalog::{FetchClient, FetchError};
use crate::config::CaptureFilter;
use crate::host::CancellationToken;
use crate::models::AuthCache;

/// Result of one pagination pass
#[derive(Debug)]
pub enum FetchOutcome {
    /// Every reported record was fetched
    Complete { records: Vec<Value>, total: usize },
    /// Cancellation was observed mid-fetch
    Interrupted { fetched: usize, total: usize },
    /// The listing ran dry before reaching the reported total
    Incomplete { fetched: usize, total: usize },
}

/// Walks the listing endpoint page by page
pub struct Paginator<'a> {
    pub client: &'a dyn FetchClient,
    pub scheduler: &'a IntervalScheduler,
    pub token: &'a CancellationToken,
    pub page_size: usize,
    pub page_wait_seconds: f64,
}

impl Paginator<'_> {
    /// Fetch all records, calling `progress(fetched, total)` after each page
    ///
    /// Client errors are returned as-is for the caller's retry logic.
    pub fn fetch_all<F>(
        &self,
        auth: &AuthCache,
        filter: &CaptureFilter,
        mut progress: F,
    ) -> Result<FetchOutcome, FetchError>
    where
        F: FnMut(usize, usize),
    {
        if self.token.is_cancelled() {
            return Ok(FetchOutcome::Interrupted {
                fetched: 0,
                total: 0,
            });
        }

        let total = self.client.count(auth, filter)?;
        let take = self.page_size.max(1);
        let mut records: Vec<Value> = Vec::with_capacity(total.min(10_000));

        debug!("Fetching {} catalogue records in pages of {}", total, take);

        while records.len() < total {
            if self.token.is_cancelled() {
                return Ok(FetchOutcome::Interrupted {
                    fetched: records.len(),
                    total,
                });
            }

            let page = self.client.page(auth, filter, records.len(), take)?;
            let received = page.len();
            records.extend(page);
            progress(records.len(), total);

            // Short page: the listing has nothing more to give
            if received < take {
                break;
            }

            if records.len() < total && self.scheduler.wait(self.page_wait_seconds, "next page") {
                return Ok(FetchOutcome::Interrupted {
                    fetched: records.len(),
                    total,
                });
            }
        }

        if self.token.is_cancelled() {
            return Ok(FetchOutcome::Interrupted {
                fetched: records.len(),
                total,
            });
        }

        if records.len() < total {
            return Ok(FetchOutcome::Incomplete {
                fetched: records.len(),
                total,
            });
        }

        Ok(FetchOutcome::Complete { records, total })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    use serde_json::json;

    use crate::host::CaptureHost;
    use crate::sync::{CapturePayload, CaptureState};

    struct QuietHost {
        token: CancellationToken,
        cancel_on_wait: bool,
    }

    impl CaptureHost for QuietHost {
        fn capture_log(&self, _message: &str) {}
        fn apply_payload(&self, _payload: &CapturePayload) {}
        fn on_status(&self, _state: CaptureState, _message: Option<&str>) {}
        fn cancellation_token(&self) -> CancellationToken {
            self.token.clone()
        }
        fn responsive_wait(&self, _seconds: f64, _label: &str) -> bool {
            if self.cancel_on_wait {
                self.token.cancel();
            }
            self.token.is_cancelled()
        }
        fn prompt_manual_login(&self) -> Option<AuthCache> {
            None
        }
    }

    /// Serves `available` records while claiming `reported` exist
    struct Listing {
        reported: usize,
        available: usize,
        calls: Mutex<Vec<(usize, usize)>>,
    }

    impl Listing {
        fn new(reported: usize, available: usize) -> Self {
            Self {
                reported,
                available,
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    impl FetchClient for Listing {
        fn count(&self, _: &AuthCache, _: &CaptureFilter) -> Result<usize, FetchError> {
            Ok(self.reported)
        }

        fn page(
            &self,
            _: &AuthCache,
            _: &CaptureFilter,
            skip: usize,
            take: usize,
        ) -> Result<Vec<Value>, FetchError> {
            self.calls.lock().unwrap().push((skip, take));
            let end = (skip + take).min(self.available);
            Ok((skip..end).map(|i| json!({"name": format!("item {}", i)})).collect())
        }
    }

    fn run(listing: &Listing, cancel_on_wait: bool) -> FetchOutcome {
        let token = CancellationToken::new();
        let host = Arc::new(QuietHost {
            token: token.clone(),
            cancel_on_wait,
        });
        let scheduler = IntervalScheduler::new(host);
        let paginator = Paginator {
            client: listing,
            scheduler: &scheduler,
            token: &token,
            page_size: 50,
            page_wait_seconds: 0.0,
        };
        paginator
            .fetch_all(&AuthCache::new("tok", "https://rpc"), &CaptureFilter::default(), |_, _| {})
            .unwrap()
    }

    #[test]
    fn test_fetches_every_page() {
        let listing = Listing::new(120, 120);
        match run(&listing, false) {
            FetchOutcome::Complete { records, total } => {
                assert_eq!(total, 120);
                assert_eq!(records.len(), 120);
            }
            other => panic!("expected complete, got {:?}", other),
        }
        assert_eq!(*listing.calls.lock().unwrap(), vec![(0, 50), (50, 50), (100, 50)]);
    }

    #[test]
    fn test_short_listing_is_incomplete() {
        let listing = Listing::new(150, 100);
        assert!(matches!(
            run(&listing, false),
            FetchOutcome::Incomplete {
                fetched: 100,
                total: 150
            }
        ));
    }

    #[test]
    fn test_cancel_between_pages_interrupts() {
        let listing = Listing::new(150, 150);
        assert!(matches!(
            run(&listing, true),
            FetchOutcome::Interrupted {
                fetched: 50,
                total: 150
            }
        ));
        assert_eq!(listing.calls.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_empty_listing_is_complete() {
        let listing = Listing::new(0, 0);
        match run(&listing, false) {
            FetchOutcome::Complete { records, total } => {
                assert!(records.is_empty());
                assert_eq!(total, 0);
            }
            other => panic!("expected complete, got {:?}", other),
        }
    }

    #[test]
    fn test_progress_reports_running_count() {
        let listing = Listing::new(120, 120);
        let token = CancellationToken::new();
        let host = Arc::new(QuietHost {
            token: token.clone(),
            cancel_on_wait: false,
        });
        let scheduler = IntervalScheduler::new(host);
        let paginator = Paginator {
            client: &listing,
            scheduler: &scheduler,
            token: &token,
            page_size: 50,
            page_wait_seconds: 0.0,
        };
        let mut seen = Vec::new();
        paginator
            .fetch_all(
                &AuthCache::new("tok", "https://rpc"),
                &CaptureFilter::default(),
                |fetched, total| seen.push((fetched, total)),
            )
            .unwrap();
        assert_eq!(seen, vec![(50, 120), (100, 120), (120, 120)]);
    }
}
