//! Stockwatch - Periodic pharmacy catalogue capture
//!
//! This is the main entry point for the stockwatch command-line host.
//!
//! Usage:
//!   stockwatch            run the capture loop until Ctrl-C
//!   stockwatch --once     run a single capture cycle
//!   stockwatch --changes  print the most recent change-log records

use std::sync::Arc;

use anyhow::{Context, Result};
use capture::{
    AuthStore, Authenticator, CaptureWorker, ConfigSource, FileAuthStore, FileConfigSource,
    HttpFetchClient, HttpTokenRefresher, SnapshotStore, SqliteSnapshotStore, TokenRefresher,
    auth_from_env,
};
use log::{error, info};

mod console;

use console::ConsoleHost;

/// Snapshot database file in the config directory
const SNAPSHOT_DB: &str = "snapshots.db";

/// Records printed by `--changes`
const RECENT_CHANGES: usize = 20;

enum Mode {
    Loop,
    Once,
    Changes,
}

fn parse_mode() -> Result<Mode> {
    let mut mode = Mode::Loop;
    for arg in std::env::args().skip(1) {
        mode = match arg.as_str() {
            "--once" => Mode::Once,
            "--changes" => Mode::Changes,
            other => anyhow::bail!("Unknown argument: {} (expected --once or --changes)", other),
        };
    }
    Ok(mode)
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mode = parse_mode()?;

    // Bootstrap config directory
    let config_dir = config::init().context("Failed to initialize config directory")?;

    let store = Arc::new(
        SqliteSnapshotStore::new(config_dir.join(SNAPSHOT_DB))
            .context("Failed to open snapshot database")?,
    );

    if let Mode::Changes = mode {
        match store.last_saved_at()? {
            Some(at) => println!(
                "Last snapshot saved {}",
                at.with_timezone(&chrono::Local).format("%Y-%m-%d %H:%M")
            ),
            None => println!("No snapshot saved yet."),
        }
        return print_recent_changes(store.as_ref());
    }

    let config_source = Arc::new(FileConfigSource::default_location()?);
    let initial = config_source.current();

    let auth_store = Arc::new(FileAuthStore::default_location()?);
    if let Some(seed) = auth_from_env() {
        auth_store
            .save(&seed)
            .context("Failed to seed auth cache from environment")?;
        info!(
            "Seeded auth cache from environment ({})",
            auth_store.path().display()
        );
    }

    let refresher: Arc<dyn TokenRefresher> =
        Arc::new(HttpTokenRefresher::new(initial.refresh_path.clone()));
    let authenticator = Authenticator::new(auth_store, Some(refresher));

    let token = capture::CancellationToken::new();
    let host = Arc::new(ConsoleHost::new(token.clone(), initial.login_url.clone()));

    let mut worker = CaptureWorker::new(
        host,
        Arc::new(HttpFetchClient::new()),
        store,
        authenticator,
        config_source.clone(),
    );

    info!(
        "Capturing every {}s (config: {})",
        initial.interval_seconds,
        config_source.path().display()
    );

    // The worker blocks on HTTP and sleeps, so it gets its own thread
    let mut handle = tokio::task::spawn_blocking(move || match mode {
        Mode::Once => {
            if let Err(e) = worker.run_cycle() {
                error!("Capture failed: {}", e);
            }
        }
        _ => worker.run(),
    });

    tokio::select! {
        result = &mut handle => {
            result.context("Capture worker panicked")?;
            return Ok(());
        }
        signal = tokio::signal::ctrl_c() => {
            signal.context("Failed to listen for Ctrl-C")?;
            info!("Interrupt received; stopping capture");
            token.cancel();
        }
    }

    handle.await.context("Capture worker panicked")?;
    Ok(())
}

fn print_recent_changes(store: &dyn SnapshotStore) -> Result<()> {
    let records = store.recent_changes(RECENT_CHANGES)?;
    if records.is_empty() {
        println!("No changes recorded yet.");
        return Ok(());
    }

    for record in records {
        println!(
            "{}  {} items: {} new, {} removed, {}↑ {}↓ price, {} stock",
            record
                .recorded_at
                .with_timezone(&chrono::Local)
                .format("%Y-%m-%d %H:%M"),
            record.item_count,
            record.new_count,
            record.removed_count,
            record.price_up,
            record.price_down,
            record.stock_change_count,
        );
        for entry in &record.entries {
            println!("    {:<12} {}", entry.kind.as_str(), entry.label);
        }
    }
    Ok(())
}
