//! Sync cursor storage with retry/backoff for SQLITE_BUSY
//!
//! The cursor is a single row (`id = 1`) holding the persisted sync height
//! and the cached derived statistics. The height and the statistics are
//! written by different owners and never in the same statement.

use crate::{Database, DerivedStats, Error, Result, SyncCursor};
use rusqlite::{params, OptionalExtension, Row};
use std::thread;
use std::time::Duration;

/// Fixed id of the cursor row
pub const CURSOR_ID: i64 = 1;

/// Maximum retry attempts for SQLITE_BUSY
pub const MAX_BUSY_RETRIES: u32 = 5;

/// Base backoff duration in milliseconds
pub const BASE_BACKOFF_MS: u64 = 50;

/// Maximum backoff duration in milliseconds
pub const MAX_BACKOFF_MS: u64 = 1000;

const SELECT_CURSOR_SQL: &str = r#"
    SELECT db_height, alias_count, assets_count, matrix_alias_count, premium_alias_count,
           staked_coins, staked_percentage, apy, burned_total, updated_at, stats_updated_at
    FROM sync_cursor
    WHERE id = 1
"#;

/// Cursor storage operations with retry logic
pub struct CursorStorage<'a> {
    db: &'a Database,
}

impl<'a> CursorStorage<'a> {
    /// Create new cursor storage
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Load the cursor, `None` before first boot
    pub fn get_cursor(&self) -> Result<Option<SyncCursor>> {
        self.query_with_retry(|| {
            let cursor = self
                .db
                .conn()
                .query_row(SELECT_CURSOR_SQL, [], cursor_from_row)
                .optional()?;
            Ok(cursor)
        })
    }

    /// Create the cursor row at height 0 unless it already exists
    pub fn create_cursor_if_absent(&self) -> Result<SyncCursor> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.execute_with_retry(|| {
            let created = self.db.conn().execute(
                "INSERT OR IGNORE INTO sync_cursor (id, db_height, updated_at) VALUES (?1, 0, ?2)",
                params![CURSOR_ID, updated_at],
            )?;
            if created > 0 {
                tracing::info!("Created sync cursor at height 0");
            }
            Ok(())
        })?;

        self.get_cursor()?
            .ok_or_else(|| Error::NotFound("sync cursor".to_string()))
    }

    /// Current persisted height
    pub fn height(&self) -> Result<u64> {
        self.get_cursor()?
            .map(|c| c.db_height)
            .ok_or_else(|| Error::NotFound("sync cursor".to_string()))
    }

    /// Advance the persisted height. Moving backwards is refused.
    pub fn set_height(&self, height: u64) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        let updated = self.query_with_retry(|| {
            let rows = self.db.conn().execute(
                "UPDATE sync_cursor SET db_height = ?1, updated_at = ?2
                 WHERE id = 1 AND db_height <= ?1",
                params![height, updated_at],
            )?;
            Ok(rows)
        })?;

        if updated == 0 {
            return match self.get_cursor()? {
                Some(cursor) => Err(Error::Validation(format!(
                    "refusing to move db_height backwards from {} to {}",
                    cursor.db_height, height
                ))),
                None => Err(Error::NotFound("sync cursor".to_string())),
            };
        }
        Ok(())
    }

    /// Set the height unconditionally (deliberate resync only)
    pub fn reset_height(&self, height: u64) -> Result<()> {
        let updated_at = chrono::Utc::now().to_rfc3339();

        self.execute_with_retry(|| {
            self.db.conn().execute(
                "UPDATE sync_cursor SET db_height = ?1, updated_at = ?2 WHERE id = 1",
                params![height, updated_at],
            )?;
            Ok(())
        })
    }

    /// Write whichever derived counters resolved, in one statement
    pub fn set_derived_stats(&self, stats: &DerivedStats) -> Result<()> {
        if stats.is_empty() {
            return Ok(());
        }
        let stats_updated_at = chrono::Utc::now().to_rfc3339();

        self.execute_with_retry(|| {
            self.db.conn().execute(
                r#"
                UPDATE sync_cursor SET
                    alias_count = COALESCE(?1, alias_count),
                    assets_count = COALESCE(?2, assets_count),
                    matrix_alias_count = COALESCE(?3, matrix_alias_count),
                    premium_alias_count = COALESCE(?4, premium_alias_count),
                    staked_coins = COALESCE(?5, staked_coins),
                    staked_percentage = COALESCE(?6, staked_percentage),
                    apy = COALESCE(?7, apy),
                    burned_total = COALESCE(?8, burned_total),
                    stats_updated_at = ?9
                WHERE id = 1
                "#,
                params![
                    stats.alias_count,
                    stats.assets_count,
                    stats.matrix_alias_count,
                    stats.premium_alias_count,
                    stats.staked_coins,
                    stats.staked_percentage,
                    stats.apy,
                    stats.burned_total,
                    stats_updated_at
                ],
            )?;
            Ok(())
        })
    }

    /// Execute with retry logic for SQLITE_BUSY
    fn execute_with_retry<F>(&self, f: F) -> Result<()>
    where
        F: FnMut() -> Result<()>,
    {
        self.query_with_retry(f)
    }

    /// Query with retry logic for SQLITE_BUSY
    fn query_with_retry<F, T>(&self, mut f: F) -> Result<T>
    where
        F: FnMut() -> Result<T>,
    {
        let mut attempts = 0;

        loop {
            match f() {
                Ok(result) => return Ok(result),
                Err(e) if e.is_busy() && attempts < MAX_BUSY_RETRIES => {
                    attempts += 1;
                    let backoff = calculate_backoff(attempts);
                    tracing::debug!(
                        "SQLITE_BUSY (attempt {}/{}), retrying in {}ms",
                        attempts,
                        MAX_BUSY_RETRIES,
                        backoff
                    );
                    thread::sleep(Duration::from_millis(backoff));
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn cursor_from_row(row: &Row<'_>) -> rusqlite::Result<SyncCursor> {
    Ok(SyncCursor {
        db_height: row.get(0)?,
        alias_count: row.get(1)?,
        assets_count: row.get(2)?,
        matrix_alias_count: row.get(3)?,
        premium_alias_count: row.get(4)?,
        staked_coins: row.get(5)?,
        staked_percentage: row.get(6)?,
        apy: row.get(7)?,
        burned_total: row.get(8)?,
        updated_at: row.get(9)?,
        stats_updated_at: row.get(10)?,
    })
}

/// Calculate exponential backoff with jitter
fn calculate_backoff(attempt: u32) -> u64 {
    let base = BASE_BACKOFF_MS * (1 << attempt.min(6));
    let jitter = rand::random::<u64>() % (base / 4 + 1);
    (base + jitter).min(MAX_BACKOFF_MS)
}

/// Drop every block and transaction at or above `height` and rewind the
/// cursor to it (deliberate resync).
pub fn truncate_above_height(db: &Database, height: u64) -> Result<()> {
    let updated_at = chrono::Utc::now().to_rfc3339();

    db.with_transaction(|tx| {
        let blocks = tx.execute("DELETE FROM blocks WHERE height >= ?1", params![height])?;
        let txs = tx.execute(
            "DELETE FROM transactions WHERE keeper_block >= ?1",
            params![height],
        )?;
        tx.execute(
            "UPDATE sync_cursor SET db_height = MIN(db_height, ?1), updated_at = ?2 WHERE id = 1",
            params![height, updated_at],
        )?;
        tracing::info!(
            "Truncated chain data at and above height {} ({} blocks, {} transactions)",
            height,
            blocks,
            txs
        );
        Ok(())
    })
}
