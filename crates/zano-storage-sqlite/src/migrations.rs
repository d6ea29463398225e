//! Database schema migrations

use crate::{Error, Result};
use rusqlite::Connection;

/// Latest schema version
pub const SCHEMA_VERSION: i32 = 3;

/// Run all migrations
pub fn run_migrations(conn: &Connection) -> Result<()> {
    let current_version = get_schema_version(conn)?;

    tracing::debug!(
        "Running migrations: current_version={}, target_version={}",
        current_version,
        SCHEMA_VERSION
    );

    if current_version < 1 {
        migrate_v1(conn)?;
        set_schema_version(conn, 1)?;
    }

    if current_version < 2 {
        migrate_v2(conn)?;
        set_schema_version(conn, 2)?;
    }

    if current_version < 3 {
        migrate_v3(conn)?;
        set_schema_version(conn, 3)?;
    }

    Ok(())
}

/// Current schema version (0 for a fresh database)
pub fn get_schema_version(conn: &Connection) -> Result<i32> {
    let result = conn.query_row(
        "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
        [],
        |row| row.get(0),
    );

    match result {
        Ok(v) => Ok(v),
        Err(_) => Ok(0),
    }
}

fn set_schema_version(conn: &Connection, version: i32) -> Result<()> {
    conn.execute(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER PRIMARY KEY)",
        [],
    )?;

    let rows_affected = conn.execute(
        "INSERT OR IGNORE INTO schema_version (version) VALUES (?1)",
        [version],
    )?;
    if rows_affected > 0 {
        tracing::debug!("Inserted schema version {}", version);
    } else {
        tracing::debug!("Schema version {} already exists, skipped insert", version);
    }
    Ok(())
}

fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS blocks (
            id INTEGER PRIMARY KEY,
            block_id TEXT NOT NULL UNIQUE,
            height INTEGER NOT NULL UNIQUE,
            cumulative_size TEXT,
            txs_count INTEGER NOT NULL,
            total_fee TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            actual_timestamp INTEGER,
            base_reward TEXT,
            difficulty TEXT,
            cumulative_diff_adjusted TEXT,
            cumulative_diff_precise TEXT,
            effective_fee_median TEXT,
            is_orphan BOOLEAN,
            penalty TEXT,
            prev_id TEXT,
            summary_reward TEXT,
            this_block_fee_median TEXT,
            total_txs_size TEXT,
            block_type TEXT,
            miner_text_info TEXT,
            pow_seed TEXT,
            already_generated_coins TEXT,
            object_in_json TEXT
        );

        CREATE TABLE IF NOT EXISTS transactions (
            id INTEGER PRIMARY KEY,
            tx_id TEXT NOT NULL UNIQUE,
            keeper_block INTEGER NOT NULL,
            timestamp INTEGER NOT NULL,
            amount TEXT,
            blob_size TEXT,
            fee TEXT,
            pub_key TEXT,
            ins TEXT,
            outs TEXT,
            extra TEXT,
            attachments TEXT
        );

        -- Singleton sync cursor; the row itself is created on first boot
        CREATE TABLE IF NOT EXISTS sync_cursor (
            id INTEGER PRIMARY KEY CHECK (id = 1),
            db_height INTEGER NOT NULL DEFAULT 0,
            alias_count INTEGER NOT NULL DEFAULT 0,
            assets_count INTEGER NOT NULL DEFAULT 0,
            matrix_alias_count INTEGER NOT NULL DEFAULT 0,
            premium_alias_count INTEGER NOT NULL DEFAULT 0,
            updated_at TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_transactions_keeper_block ON transactions(keeper_block);
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}

fn migrate_v2(conn: &Connection) -> Result<()> {
    // Reporting queries filter by time window
    conn.execute_batch(
        r#"
        CREATE INDEX IF NOT EXISTS idx_transactions_timestamp ON transactions(timestamp);
        CREATE INDEX IF NOT EXISTS idx_blocks_timestamp ON blocks(timestamp);
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}

fn migrate_v3(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        r#"
        ALTER TABLE sync_cursor ADD COLUMN staked_coins REAL NOT NULL DEFAULT 0;
        ALTER TABLE sync_cursor ADD COLUMN staked_percentage REAL NOT NULL DEFAULT 0;
        ALTER TABLE sync_cursor ADD COLUMN apy REAL NOT NULL DEFAULT 0;
        ALTER TABLE sync_cursor ADD COLUMN burned_total REAL NOT NULL DEFAULT 0;
        ALTER TABLE sync_cursor ADD COLUMN stats_updated_at TEXT;
        "#,
    )
    .map_err(|e| Error::Migration(e.to_string()))?;

    Ok(())
}
