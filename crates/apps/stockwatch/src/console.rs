//! Terminal host for the capture worker
//!
//! Prints the capture log and change notifications to stdout and runs the
//! interactive login by opening the login page and reading a token from
//! stdin.

use std::io::{self, BufRead, Write};

use capture::diff::DiffResult;
use capture::{AnnotatedItem, AuthCache, CancellationToken, CaptureHost, CapturePayload, CaptureState};
use chrono::Local;
use log::{info, warn};

pub struct ConsoleHost {
    token: CancellationToken,
    login_url: Option<String>,
}

impl ConsoleHost {
    pub fn new(token: CancellationToken, login_url: Option<String>) -> Self {
        Self { token, login_url }
    }

    fn print(&self, line: &str) {
        println!("[{}] {}", Local::now().format("%H:%M:%S"), line);
    }

    fn print_changes(&self, diff: &DiffResult) {
        for a in &diff.new_items {
            self.print(&format!("  NEW       {}{}", a.item.display_label(), price_suffix(a)));
        }
        for a in &diff.removed_items {
            self.print(&format!("  REMOVED   {}", a.item.display_label()));
        }
        for a in &diff.restock_changes {
            self.print(&format!("  RESTOCK   {}{}", a.item.display_label(), stock_suffix(a)));
        }
        for a in &diff.out_of_stock_changes {
            self.print(&format!("  SOLD OUT  {}", a.item.display_label()));
        }
        for a in &diff.price_changes {
            let delta = a.price_delta.unwrap_or_default();
            let arrow = if delta > 0.0 { "UP" } else { "DOWN" };
            self.print(&format!(
                "  PRICE {:<4}{}{} ({:+.2})",
                arrow,
                a.item.display_label(),
                price_suffix(a),
                delta
            ));
        }
        for a in &diff.stock_changes {
            self.print(&format!("  STOCK     {}{}", a.item.display_label(), stock_suffix(a)));
        }
    }
}

fn price_suffix(a: &AnnotatedItem) -> String {
    a.item
        .price
        .map(|p| format!(" @ ${:.2}", p))
        .unwrap_or_default()
}

fn stock_suffix(a: &AnnotatedItem) -> String {
    match (&a.stock_before, &a.stock_after) {
        (Some(before), Some(after)) => format!(" ({} -> {})", before, after),
        (None, Some(after)) => format!(" ({})", after),
        _ => String::new(),
    }
}

impl CaptureHost for ConsoleHost {
    fn capture_log(&self, message: &str) {
        self.print(message);
    }

    fn apply_payload(&self, payload: &CapturePayload) {
        if payload.diff.has_changes() {
            self.print(&format!(
                "{} items in catalogue; changes since last capture:",
                payload.items.len()
            ));
            self.print_changes(&payload.diff);
        }
    }

    fn on_status(&self, state: CaptureState, message: Option<&str>) {
        match message {
            Some(msg) => info!("Capture {}: {}", state, msg),
            None => info!("Capture {}", state),
        }
    }

    fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    fn prompt_manual_login(&self) -> Option<AuthCache> {
        let Some(url) = self.login_url.as_deref() else {
            warn!("No login_url configured; set STOCKWATCH_TOKEN or add login_url to capture.json");
            return None;
        };

        println!("\n=== Sign-in Required ===");
        println!("Opening browser for sign-in...");
        println!("If the browser doesn't open, visit: {}", url);
        if let Err(e) = open::that(url) {
            eprintln!("Failed to open browser: {}. Please open the URL manually.", e);
        }

        print!("Paste the access token (empty to skip): ");
        if io::stdout().flush().is_err() {
            return None;
        }

        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) | Err(_) => return None,
            Ok(_) => {}
        }
        let token = line.trim();
        if token.is_empty() || self.token.is_cancelled() {
            return None;
        }

        // Missing identity fields are filled from the existing cache
        Some(AuthCache {
            token: Some(token.to_string()),
            rpc_host: std::env::var("STOCKWATCH_RPC_HOST").ok(),
            ..AuthCache::default()
        })
    }
}
