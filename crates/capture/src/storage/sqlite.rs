//! SQLite-backed snapshot and change-log storage

use std::path::Path;
use std::sync::Mutex;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use rusqlite_migration::{M, Migrations};

use super::traits::SnapshotStore;
use crate::models::{ChangeRecord, Item};

/// Database migrations
///
/// Each migration is applied in order. The user_version pragma tracks which
/// migrations have been applied.
fn migrations() -> Migrations<'static> {
    Migrations::new(vec![
        // Migration 1: Initial schema
        M::up(
            r#"
            -- Items of the last successful capture, in fetch order
            CREATE TABLE snapshot_items (
                position INTEGER PRIMARY KEY,
                identity_key TEXT NOT NULL,
                data TEXT NOT NULL
            );

            -- Append-only change log, trimmed to the most recent N rows
            CREATE TABLE change_log (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                recorded_at TEXT NOT NULL,
                data TEXT NOT NULL
            );
            "#,
        ),
        // Migration 2: Snapshot bookkeeping
        M::up(
            r#"
            CREATE TABLE snapshot_meta (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                saved_at TEXT NOT NULL,
                item_count INTEGER NOT NULL
            );
            "#,
        ),
    ])
}

/// SQLite-based snapshot storage
pub struct SqliteSnapshotStore {
    conn: Mutex<Connection>,
}

impl SqliteSnapshotStore {
    /// Open (or create) a store at `db_path`
    pub fn new(db_path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(db_path.as_ref())
            .with_context(|| format!("Failed to open database at {:?}", db_path.as_ref()))?;
        Self::from_connection(conn)
    }

    /// Open a throwaway in-memory database
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("Failed to open in-memory database")?;
        Self::from_connection(conn)
    }

    fn from_connection(mut conn: Connection) -> Result<Self> {
        // WAL keeps readers (e.g. an export running in the host) unblocked
        // while the worker replaces the snapshot.
        conn.execute_batch(
            r#"
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
            "#,
        )?;

        migrations()
            .to_latest(&mut conn)
            .context("Failed to run database migrations")?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// When the current snapshot was written, if ever
    pub fn last_saved_at(&self) -> Result<Option<DateTime<Utc>>> {
        let conn = self.conn.lock().unwrap();
        let saved: Option<String> = conn
            .query_row("SELECT saved_at FROM snapshot_meta WHERE id = 1", [], |row| {
                row.get(0)
            })
            .optional()?;
        saved
            .map(|s| {
                DateTime::parse_from_rfc3339(&s)
                    .map(|dt| dt.with_timezone(&Utc))
                    .context("Invalid snapshot timestamp")
            })
            .transpose()
    }
}

impl SnapshotStore for SqliteSnapshotStore {
    fn load_last_parse(&self) -> Result<Vec<Item>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM snapshot_items ORDER BY position ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

        let mut items = Vec::new();
        for row in rows {
            let data = row?;
            let item: Item =
                serde_json::from_str(&data).context("Failed to decode stored snapshot item")?;
            items.push(item);
        }
        Ok(items)
    }

    fn save_last_parse(&self, items: &[Item]) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute("DELETE FROM snapshot_items", [])?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO snapshot_items (position, identity_key, data) VALUES (?1, ?2, ?3)",
            )?;
            for (position, item) in items.iter().enumerate() {
                let data = serde_json::to_string(item)?;
                stmt.execute(params![
                    position as i64,
                    item.identity_key().as_str(),
                    data
                ])?;
            }
        }
        tx.execute(
            r#"
            INSERT INTO snapshot_meta (id, saved_at, item_count) VALUES (1, ?1, ?2)
            ON CONFLICT(id) DO UPDATE SET saved_at = excluded.saved_at, item_count = excluded.item_count
            "#,
            params![Utc::now().to_rfc3339(), items.len() as i64],
        )?;
        tx.commit().context("Failed to commit snapshot")?;
        Ok(())
    }

    fn append_change_log(&self, record: &ChangeRecord, limit: usize) -> Result<()> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        tx.execute(
            "INSERT INTO change_log (recorded_at, data) VALUES (?1, ?2)",
            params![record.recorded_at.to_rfc3339(), serde_json::to_string(record)?],
        )?;
        tx.execute(
            r#"
            DELETE FROM change_log
            WHERE id NOT IN (SELECT id FROM change_log ORDER BY id DESC LIMIT ?1)
            "#,
            params![limit as i64],
        )?;
        tx.commit().context("Failed to commit change log entry")?;
        Ok(())
    }

    fn recent_changes(&self, limit: usize) -> Result<Vec<ChangeRecord>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare("SELECT data FROM change_log ORDER BY id DESC LIMIT ?1")?;
        let rows = stmt.query_map(params![limit as i64], |row| row.get::<_, String>(0))?;

        let mut records = Vec::new();
        for row in rows {
            let data = row?;
            records.push(serde_json::from_str(&data).context("Failed to decode change record")?);
        }
        Ok(records)
    }

    fn clear(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(
            r#"
            DELETE FROM snapshot_items;
            DELETE FROM snapshot_meta;
            DELETE FROM change_log;
            "#,
        )?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ChangeEntry, ChangeKind, IdentityKey};
    use tempfile::TempDir;

    fn record(new_count: usize) -> ChangeRecord {
        ChangeRecord {
            recorded_at: Utc::now(),
            item_count: 10,
            new_count,
            removed_count: 0,
            price_up: 0,
            price_down: 0,
            stock_change_count: 0,
            entries: vec![ChangeEntry {
                kind: ChangeKind::New,
                key: IdentityKey::new("k"),
                label: "Item".to_string(),
                price: Some(10.0),
                price_delta: None,
                stock_delta: None,
                stock_before: None,
                stock_after: None,
            }],
        }
    }

    #[test]
    fn test_migrations_valid() {
        assert!(migrations().validate().is_ok());
    }

    #[test]
    fn test_snapshot_roundtrip_preserves_order() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        assert!(store.last_saved_at().unwrap().is_none());

        let items = vec![
            Item::builder("Zeta").price(10.0).build(),
            Item::builder("Alpha").brand("B").stock_remaining(3.0).build(),
        ];
        store.save_last_parse(&items).unwrap();

        assert_eq!(store.load_last_parse().unwrap(), items);
        assert!(store.last_saved_at().unwrap().is_some());
    }

    #[test]
    fn test_snapshot_is_replaced_not_merged() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store
            .save_last_parse(&[Item::builder("a").build(), Item::builder("b").build()])
            .unwrap();
        store.save_last_parse(&[Item::builder("c").build()]).unwrap();

        let items = store.load_last_parse().unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].name, "c");
    }

    #[test]
    fn test_change_log_capped() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        for i in 0..6 {
            store.append_change_log(&record(i), 4).unwrap();
        }
        let recent = store.recent_changes(100).unwrap();
        assert_eq!(recent.len(), 4);
        assert_eq!(recent[0].new_count, 5);
        assert_eq!(recent[3].new_count, 2);
        assert_eq!(recent[0].entries[0].kind, ChangeKind::New);
    }

    #[test]
    fn test_persists_across_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("capture.db");

        {
            let store = SqliteSnapshotStore::new(&path).unwrap();
            store.save_last_parse(&[Item::builder("kept").build()]).unwrap();
            store.append_change_log(&record(1), 10).unwrap();
        }

        let store = SqliteSnapshotStore::new(&path).unwrap();
        assert_eq!(store.load_last_parse().unwrap()[0].name, "kept");
        assert_eq!(store.recent_changes(10).unwrap().len(), 1);
    }

    #[test]
    fn test_clear() {
        let store = SqliteSnapshotStore::in_memory().unwrap();
        store.save_last_parse(&[Item::builder("a").build()]).unwrap();
        store.append_change_log(&record(1), 10).unwrap();
        store.clear().unwrap();
        assert!(store.load_last_parse().unwrap().is_empty());
        assert!(store.recent_changes(10).unwrap().is_empty());
    }
}
