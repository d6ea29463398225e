//! Data access layer for blocks and transactions

use crate::{models::*, Database, Result};
use rusqlite::{params, OptionalExtension, Row, Transaction};

/// Rows actually inserted by a batch write (conflicting rows are skipped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchWriteResult {
    /// Newly inserted block rows
    pub blocks_inserted: usize,
    /// Newly inserted transaction rows
    pub txs_inserted: usize,
}

const INSERT_BLOCK_SQL: &str = r#"
    INSERT OR IGNORE INTO blocks (
        block_id, height, cumulative_size, txs_count, total_fee, timestamp,
        actual_timestamp, base_reward, difficulty, cumulative_diff_adjusted,
        cumulative_diff_precise, effective_fee_median, is_orphan, penalty, prev_id,
        summary_reward, this_block_fee_median, total_txs_size, block_type,
        miner_text_info, pow_seed, already_generated_coins, object_in_json
    ) VALUES (
        ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16,
        ?17, ?18, ?19, ?20, ?21, ?22, ?23
    )
"#;

const INSERT_TX_SQL: &str = r#"
    INSERT OR IGNORE INTO transactions (
        tx_id, keeper_block, timestamp, amount, blob_size, fee, pub_key,
        ins, outs, extra, attachments
    ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
"#;

const SELECT_BLOCK_SQL: &str = r#"
    SELECT block_id, height, cumulative_size, txs_count, total_fee, timestamp,
           actual_timestamp, base_reward, difficulty, cumulative_diff_adjusted,
           cumulative_diff_precise, effective_fee_median, is_orphan, penalty, prev_id,
           summary_reward, this_block_fee_median, total_txs_size, block_type,
           miner_text_info, pow_seed, already_generated_coins, object_in_json
    FROM blocks
"#;

const SELECT_TX_SQL: &str = r#"
    SELECT tx_id, keeper_block, timestamp, amount, blob_size, fee, pub_key,
           ins, outs, extra, attachments
    FROM transactions
"#;

/// Repository for chain data
pub struct Repository<'a> {
    db: &'a Database,
}

impl<'a> Repository<'a> {
    /// Create repository
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Insert-ignore blocks; existing rows (by height or hash) are left as is.
    pub fn upsert_blocks(&self, records: &[BlockRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.db.with_transaction(|tx| insert_blocks_tx(tx, records))
    }

    /// Insert-ignore transactions keyed on `tx_id`.
    pub fn upsert_transactions(&self, records: &[TransactionRecord]) -> Result<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        self.db.with_transaction(|tx| insert_transactions_tx(tx, records))
    }

    /// Write a batch of blocks and their transactions as one unit.
    ///
    /// Re-running the same batch is a no-op.
    pub fn persist_batch(
        &self,
        blocks: &[BlockRecord],
        txs: &[TransactionRecord],
    ) -> Result<BatchWriteResult> {
        if blocks.is_empty() && txs.is_empty() {
            return Ok(BatchWriteResult::default());
        }
        self.db.with_transaction(|tx| {
            let blocks_inserted = insert_blocks_tx(tx, blocks)?;
            let txs_inserted = insert_transactions_tx(tx, txs)?;
            Ok(BatchWriteResult {
                blocks_inserted,
                txs_inserted,
            })
        })
    }

    /// First height in `[start, end)` with no stored block, or `end` if the
    /// whole range is present.
    pub fn contiguous_height_from(&self, start: u64, end: u64) -> Result<u64> {
        if start >= end {
            return Ok(start);
        }
        let conn = self.db.conn();
        let mut stmt = conn.prepare_cached(
            "SELECT height FROM blocks WHERE height >= ?1 AND height < ?2 ORDER BY height ASC",
        )?;
        let heights = stmt.query_map(params![start, end], |row| row.get::<_, u64>(0))?;

        let mut expected = start;
        for height in heights {
            if height? != expected {
                break;
            }
            expected += 1;
        }
        Ok(expected)
    }

    /// Block at `height`, if stored
    pub fn block_by_height(&self, height: u64) -> Result<Option<BlockRecord>> {
        let conn = self.db.conn();
        let sql = format!("{} WHERE height = ?1", SELECT_BLOCK_SQL);
        let block = conn
            .query_row(&sql, params![height], block_from_row)
            .optional()?;
        Ok(block)
    }

    /// Transaction by hash, if stored
    pub fn transaction_by_id(&self, tx_id: &str) -> Result<Option<TransactionRecord>> {
        let conn = self.db.conn();
        let sql = format!("{} WHERE tx_id = ?1", SELECT_TX_SQL);
        let tx = conn
            .query_row(&sql, params![tx_id], tx_from_row)
            .optional()?;
        Ok(tx)
    }

    /// Number of stored blocks
    pub fn count_blocks(&self) -> Result<u64> {
        let count: u64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM blocks", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Number of stored transactions
    pub fn count_transactions(&self) -> Result<u64> {
        let count: u64 = self
            .db
            .conn()
            .query_row("SELECT COUNT(*) FROM transactions", [], |row| row.get(0))?;
        Ok(count)
    }

    /// Sum of `total_fee` (atomic units) for blocks at or above `height`.
    pub fn sum_fees_from_height(&self, height: u64) -> Result<u128> {
        // Summed in Rust: SQLite clamps CAST above i64::MAX without error
        let conn = self.db.conn();
        let mut stmt = conn.prepare("SELECT total_fee FROM blocks WHERE height >= ?1")?;
        let fees = stmt.query_map(params![height], |row| row.get::<_, String>(0))?;
        let mut total: u128 = 0;
        for fee in fees {
            let fee = fee?;
            let value = fee.trim().parse::<u128>().unwrap_or_else(|_| {
                tracing::warn!("Unparseable total_fee {:?}, counted as 0", fee);
                0
            });
            total = total.saturating_add(value);
        }
        Ok(total)
    }

    /// Ids of transactions stored without any structured payload.
    pub fn transactions_missing_payload(&self, limit: usize) -> Result<Vec<String>> {
        let conn = self.db.conn();
        let mut stmt = conn.prepare(
            "SELECT tx_id FROM transactions
             WHERE ins IS NULL AND outs IS NULL AND extra IS NULL
             ORDER BY keeper_block ASC
             LIMIT ?1",
        )?;
        let ids = stmt
            .query_map(params![limit as i64], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(ids)
    }

    /// Fill payload columns that are still NULL; populated columns win.
    pub fn update_transaction_payload(
        &self,
        tx_id: &str,
        payload: &TransactionPayload,
    ) -> Result<bool> {
        let updated = self.db.conn().execute(
            r#"
            UPDATE transactions SET
                ins = COALESCE(ins, ?2),
                outs = COALESCE(outs, ?3),
                extra = COALESCE(extra, ?4),
                attachments = COALESCE(attachments, ?5)
            WHERE tx_id = ?1
            "#,
            params![
                tx_id,
                payload.ins,
                payload.outs,
                payload.extra,
                payload.attachments
            ],
        )?;
        Ok(updated > 0)
    }
}

fn insert_blocks_tx(tx: &Transaction<'_>, records: &[BlockRecord]) -> Result<usize> {
    let mut stmt = tx.prepare_cached(INSERT_BLOCK_SQL)?;
    let mut inserted = 0;
    for b in records {
        inserted += stmt.execute(params![
            b.block_id,
            b.height,
            b.cumulative_size,
            b.txs_count,
            b.total_fee,
            b.timestamp,
            b.actual_timestamp,
            b.base_reward,
            b.difficulty,
            b.cumulative_diff_adjusted,
            b.cumulative_diff_precise,
            b.effective_fee_median,
            b.is_orphan,
            b.penalty,
            b.prev_id,
            b.summary_reward,
            b.this_block_fee_median,
            b.total_txs_size,
            b.block_type,
            b.miner_text_info,
            b.pow_seed,
            b.already_generated_coins,
            b.object_in_json,
        ])?;
    }
    Ok(inserted)
}

fn insert_transactions_tx(tx: &Transaction<'_>, records: &[TransactionRecord]) -> Result<usize> {
    let mut stmt = tx.prepare_cached(INSERT_TX_SQL)?;
    let mut inserted = 0;
    for t in records {
        inserted += stmt.execute(params![
            t.tx_id,
            t.keeper_block,
            t.timestamp,
            t.amount,
            t.blob_size,
            t.fee,
            t.pub_key,
            t.ins,
            t.outs,
            t.extra,
            t.attachments,
        ])?;
    }
    Ok(inserted)
}

fn block_from_row(row: &Row<'_>) -> rusqlite::Result<BlockRecord> {
    Ok(BlockRecord {
        block_id: row.get(0)?,
        height: row.get(1)?,
        cumulative_size: row.get(2)?,
        txs_count: row.get(3)?,
        total_fee: row.get(4)?,
        timestamp: row.get(5)?,
        actual_timestamp: row.get(6)?,
        base_reward: row.get(7)?,
        difficulty: row.get(8)?,
        cumulative_diff_adjusted: row.get(9)?,
        cumulative_diff_precise: row.get(10)?,
        effective_fee_median: row.get(11)?,
        is_orphan: row.get(12)?,
        penalty: row.get(13)?,
        prev_id: row.get(14)?,
        summary_reward: row.get(15)?,
        this_block_fee_median: row.get(16)?,
        total_txs_size: row.get(17)?,
        block_type: row.get(18)?,
        miner_text_info: row.get(19)?,
        pow_seed: row.get(20)?,
        already_generated_coins: row.get(21)?,
        object_in_json: row.get(22)?,
    })
}

fn tx_from_row(row: &Row<'_>) -> rusqlite::Result<TransactionRecord> {
    Ok(TransactionRecord {
        tx_id: row.get(0)?,
        keeper_block: row.get(1)?,
        timestamp: row.get(2)?,
        amount: row.get(3)?,
        blob_size: row.get(4)?,
        fee: row.get(5)?,
        pub_key: row.get(6)?,
        ins: row.get(7)?,
        outs: row.get(8)?,
        extra: row.get(9)?,
        attachments: row.get(10)?,
    })
}
