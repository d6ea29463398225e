//! Migration snapshot tests
//!
//! Tests database schema migrations and the resulting table shapes the
//! reporting layer depends on.

use rusqlite::Connection;
use tempfile::NamedTempFile;
use zano_storage_sqlite::migrations::{self, SCHEMA_VERSION};
use zano_storage_sqlite::{CursorStorage, Database};

fn column_names(conn: &Connection, table: &str) -> Vec<String> {
    let mut stmt = conn
        .prepare(&format!("PRAGMA table_info({})", table))
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(1))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
}

fn index_names(conn: &Connection) -> Vec<String> {
    let mut stmt = conn
        .prepare("SELECT name FROM sqlite_master WHERE type = 'index' AND sql NOT NULL ORDER BY name")
        .unwrap();
    stmt.query_map([], |row| row.get::<_, String>(0))
        .unwrap()
        .collect::<rusqlite::Result<Vec<_>>>()
        .unwrap()
}

#[test]
fn test_fresh_migration() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();

    let version: i32 = conn
        .query_row(
            "SELECT version FROM schema_version ORDER BY version DESC LIMIT 1",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(version, SCHEMA_VERSION);
}

#[test]
fn test_migration_idempotency() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();

    migrations::run_migrations(&conn).unwrap();
    let before = column_names(&conn, "sync_cursor");
    migrations::run_migrations(&conn).unwrap();

    assert_eq!(column_names(&conn, "sync_cursor"), before);
}

#[test]
fn test_blocks_table_structure() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    migrations::run_migrations(&conn).unwrap();

    let columns = column_names(&conn, "blocks");
    for expected in [
        "block_id",
        "height",
        "cumulative_size",
        "txs_count",
        "total_fee",
        "timestamp",
        "object_in_json",
    ] {
        assert!(columns.iter().any(|c| c == expected), "missing {}", expected);
    }

    conn.execute(
        "INSERT INTO blocks (block_id, height, txs_count, total_fee, timestamp) VALUES ('a', 1, 0, '0', 0)",
        [],
    )
    .unwrap();
    let duplicate = conn.execute(
        "INSERT INTO blocks (block_id, height, txs_count, total_fee, timestamp) VALUES ('b', 1, 0, '0', 0)",
        [],
    );
    assert!(duplicate.is_err(), "height must be unique");
}

#[test]
fn test_transactions_table_structure() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    migrations::run_migrations(&conn).unwrap();

    let columns = column_names(&conn, "transactions");
    for expected in ["tx_id", "keeper_block", "timestamp", "ins", "outs", "extra", "attachments"] {
        assert!(columns.iter().any(|c| c == expected), "missing {}", expected);
    }
}

#[test]
fn test_cursor_has_staking_columns() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    migrations::run_migrations(&conn).unwrap();

    let columns = column_names(&conn, "sync_cursor");
    for expected in [
        "db_height",
        "alias_count",
        "assets_count",
        "matrix_alias_count",
        "premium_alias_count",
        "staked_coins",
        "staked_percentage",
        "apy",
        "burned_total",
    ] {
        assert!(columns.iter().any(|c| c == expected), "missing {}", expected);
    }
}

#[test]
fn test_timestamp_indexes_exist() {
    let file = NamedTempFile::new().unwrap();
    let conn = Connection::open(file.path()).unwrap();
    migrations::run_migrations(&conn).unwrap();

    let indexes = index_names(&conn);
    assert!(indexes.contains(&"idx_blocks_timestamp".to_string()));
    assert!(indexes.contains(&"idx_transactions_timestamp".to_string()));
}

#[test]
fn test_upgrade_from_v1_keeps_cursor() {
    let file = NamedTempFile::new().unwrap();
    {
        // A database left at schema v1 by an older build
        let conn = Connection::open(file.path()).unwrap();
        conn.execute_batch(
            r#"
            CREATE TABLE schema_version (version INTEGER PRIMARY KEY);
            INSERT INTO schema_version (version) VALUES (1);
            CREATE TABLE blocks (
                id INTEGER PRIMARY KEY, block_id TEXT NOT NULL UNIQUE,
                height INTEGER NOT NULL UNIQUE, cumulative_size TEXT,
                txs_count INTEGER NOT NULL, total_fee TEXT NOT NULL,
                timestamp INTEGER NOT NULL
            );
            CREATE TABLE transactions (
                id INTEGER PRIMARY KEY, tx_id TEXT NOT NULL UNIQUE,
                keeper_block INTEGER NOT NULL, timestamp INTEGER NOT NULL
            );
            CREATE TABLE sync_cursor (
                id INTEGER PRIMARY KEY CHECK (id = 1),
                db_height INTEGER NOT NULL DEFAULT 0,
                alias_count INTEGER NOT NULL DEFAULT 0,
                assets_count INTEGER NOT NULL DEFAULT 0,
                matrix_alias_count INTEGER NOT NULL DEFAULT 0,
                premium_alias_count INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            );
            INSERT INTO sync_cursor (id, db_height, alias_count, updated_at)
            VALUES (1, 777, 12, '2025-01-01T00:00:00Z');
            "#,
        )
        .unwrap();
    }

    let db = Database::open(file.path()).unwrap();
    let cursor = CursorStorage::new(&db).get_cursor().unwrap().unwrap();
    assert_eq!(cursor.db_height, 777);
    assert_eq!(cursor.alias_count, 12);
    assert_eq!(cursor.apy, 0.0);
    assert_eq!(
        migrations::get_schema_version(&db.conn()).unwrap(),
        SCHEMA_VERSION
    );
}
