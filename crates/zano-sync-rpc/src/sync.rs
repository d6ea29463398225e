//! Block sync engine
//!
//! A pass reads the chain height, then walks the gap between the persisted
//! height and the tip in waves of parallel block-window fetches. A wave is
//! committed only if every fetch in it succeeded; the persisted height then
//! moves to the end of the contiguous run actually present in the store.
//! Whatever is left after the last full wave (at most one batch) is fetched
//! in a single tail request.

use crate::client::ChainSource;
use crate::progress::{SyncProgress, SyncStage};
use crate::transform::{to_block_record, to_tx_record, txs_from_blocks};
use crate::types::{RawBlock, RawTransaction};
use crate::{Error, Result};
use futures::future::join_all;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use zano_storage_sqlite::{
    truncate_above_height, BatchWriteResult, CursorStorage, Database, Repository, SyncCursor,
    TransactionPayload,
};

/// Blocks requested per window
pub const DEFAULT_BATCH_SIZE: u64 = 100;

/// Windows fetched concurrently per wave
pub const DEFAULT_PARALLELISM: usize = 10;

/// Sync configuration
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Blocks requested per window
    pub batch_size: u64,
    /// Windows fetched concurrently per wave; also bounds payload lookups
    pub parallelism: usize,
    /// Look up transactions the node delivered without payload
    pub enrich_missing_payloads: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            parallelism: DEFAULT_PARALLELISM,
            enrich_missing_payloads: true,
        }
    }
}

impl SyncConfig {
    /// Check values before starting an engine
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.parallelism == 0 {
            return Err(Error::Config("parallelism must be at least 1".to_string()));
        }
        Ok(())
    }
}

/// Half-open block range `[start, start + count)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FetchWindow {
    /// First height
    pub start: u64,
    /// Number of blocks
    pub count: u64,
}

impl FetchWindow {
    /// One past the last height
    pub fn end(&self) -> u64 {
        self.start.saturating_add(self.count)
    }

    fn contains(&self, height: u64) -> bool {
        height >= self.start && height < self.end()
    }
}

/// Plan the next wave of full windows starting at `db_height`.
///
/// Windows are contiguous and non-overlapping. A window is planned only
/// while more than `batch` blocks remain past its start, so the final
/// partial stretch is left for the tail fetch.
pub fn plan_wave(
    db_height: u64,
    chain_height: u64,
    batch: u64,
    parallelism: usize,
) -> Vec<FetchWindow> {
    let mut windows = Vec::new();
    if batch == 0 {
        return windows;
    }
    let mut cursor = db_height;
    while windows.len() < parallelism && chain_height.saturating_sub(cursor) > batch {
        windows.push(FetchWindow {
            start: cursor,
            count: batch,
        });
        cursor += batch;
    }
    windows
}

/// Result of one sync pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PassOutcome {
    /// Persisted height when the pass started
    pub start_height: u64,
    /// Persisted height when the pass ended
    pub end_height: u64,
    /// Chain height read at the start of the pass
    pub chain_height: u64,
    /// Block rows inserted
    pub blocks_written: usize,
    /// Transaction rows inserted
    pub txs_written: usize,
    /// Waves committed, the tail included
    pub waves: usize,
}

impl PassOutcome {
    /// True when the pass left the store at the chain tip it observed
    pub fn reached_tip(&self) -> bool {
        self.end_height >= self.chain_height
    }
}

/// Sync engine
pub struct SyncEngine<S: ChainSource> {
    source: Arc<S>,
    db: Arc<Database>,
    config: SyncConfig,
    progress: SyncProgress,
}

impl<S: ChainSource> SyncEngine<S> {
    /// Engine with default configuration
    pub fn new(source: Arc<S>, db: Arc<Database>) -> Self {
        Self {
            source,
            db,
            config: SyncConfig::default(),
            progress: SyncProgress::new(),
        }
    }

    /// Engine with custom configuration
    pub fn with_config(source: Arc<S>, db: Arc<Database>, config: SyncConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            source,
            db,
            config,
            progress: SyncProgress::new(),
        })
    }

    /// Progress handle (shares state with the engine)
    pub fn progress(&self) -> SyncProgress {
        self.progress.clone()
    }

    /// Active configuration
    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Create the cursor row on first boot. Safe to call every start.
    pub fn bootstrap(&self) -> Result<SyncCursor> {
        let cursor = CursorStorage::new(&self.db).create_cursor_if_absent()?;
        self.progress.reset_height(cursor.db_height);
        tracing::info!("Sync cursor at height {}", cursor.db_height);
        Ok(cursor)
    }

    /// Run one pass from the persisted height toward the chain tip.
    pub async fn run_pass(&self) -> Result<PassOutcome> {
        let result = self.run_pass_inner().await;
        match &result {
            Ok(outcome) => {
                self.progress.complete_pass();
                if outcome.blocks_written > 0 {
                    tracing::info!(
                        "Sync pass done: {} -> {} of {} ({} blocks, {} txs, {} waves)",
                        outcome.start_height,
                        outcome.end_height,
                        outcome.chain_height,
                        outcome.blocks_written,
                        outcome.txs_written,
                        outcome.waves
                    );
                }
            }
            Err(e @ Error::RpcUnavailable(_)) => {
                self.progress.fail_pass(&e.to_string());
                tracing::warn!("Sync pass aborted, retrying next tick: {}", e);
            }
            Err(e) => {
                self.progress.fail_pass(&e.to_string());
                tracing::error!("Sync pass aborted: {}", e);
            }
        }
        result
    }

    async fn run_pass_inner(&self) -> Result<PassOutcome> {
        let start_height = CursorStorage::new(&self.db).height()?;
        self.progress.begin_pass(start_height);

        let chain_height = self.source.current_height().await?;
        self.progress.set_chain_height(chain_height);

        let mut outcome = PassOutcome {
            start_height,
            end_height: start_height,
            chain_height,
            ..Default::default()
        };

        if chain_height < start_height {
            tracing::warn!(
                "Skipping sync: local height {} is ahead of chain height {}",
                start_height,
                chain_height
            );
            return Ok(outcome);
        }
        if chain_height == start_height {
            tracing::debug!("Already at chain height {}", chain_height);
            return Ok(outcome);
        }

        tracing::info!(
            "Starting sync: {} -> {} ({} blocks)",
            start_height,
            chain_height,
            chain_height - start_height
        );

        let batch = self.config.batch_size;
        let mut db_height = start_height;

        while chain_height.saturating_sub(db_height) > batch {
            let windows = plan_wave(db_height, chain_height, batch, self.config.parallelism);
            let wave_end = windows.last().map(FetchWindow::end).unwrap_or(db_height);

            let new_height = self.sync_windows(&windows, db_height, wave_end, &mut outcome).await?;
            tracing::info!("DB height {}/{}", new_height, chain_height);

            if new_height == db_height {
                tracing::warn!(
                    "Wave at {} made no progress; stopping pass until next tick",
                    db_height
                );
                return Ok(outcome);
            }
            db_height = new_height;
        }

        let remaining = chain_height.saturating_sub(db_height);
        if remaining > 0 {
            let tail = [FetchWindow {
                start: db_height,
                count: remaining,
            }];
            let new_height = self
                .sync_windows(&tail, db_height, chain_height, &mut outcome)
                .await?;
            tracing::info!("DB height {}/{}", new_height, chain_height);
            if new_height < chain_height {
                tracing::info!(
                    "Node returned {} of {} tail blocks",
                    new_height - db_height,
                    remaining
                );
            }
        }

        Ok(outcome)
    }

    /// Fetch `windows`, persist them, and advance the cursor. Returns the new
    /// persisted height.
    async fn sync_windows(
        &self,
        windows: &[FetchWindow],
        db_height: u64,
        end: u64,
        outcome: &mut PassOutcome,
    ) -> Result<u64> {
        self.progress.set_stage(SyncStage::Fetching);
        let blocks = self.fetch_wave(windows).await?;

        let mut txs = txs_from_blocks(&blocks);
        if self.config.enrich_missing_payloads {
            self.enrich_payloads(&mut txs).await;
        }

        self.progress.set_stage(SyncStage::Persisting);
        let (new_height, written) = self.commit(&blocks, &txs, db_height, end)?;

        outcome.end_height = new_height;
        outcome.blocks_written += written.blocks_inserted;
        outcome.txs_written += written.txs_inserted;
        outcome.waves += 1;
        self.progress
            .record_wave(new_height, written.blocks_inserted, written.txs_inserted);
        Ok(new_height)
    }

    /// Fetch every window concurrently. Any failure fails the whole wave.
    async fn fetch_wave(&self, windows: &[FetchWindow]) -> Result<Vec<RawBlock>> {
        let results = join_all(
            windows
                .iter()
                .map(|w| self.source.block_range(w.start, w.count)),
        )
        .await;

        let mut blocks = Vec::new();
        let mut first_error = None;
        for (window, result) in windows.iter().zip(results) {
            match result {
                Ok(fetched) => {
                    let returned = fetched.len();
                    let before = blocks.len();
                    blocks.extend(fetched.into_iter().filter(|b| window.contains(b.height)));
                    if blocks.len() - before < returned {
                        tracing::debug!(
                            "Dropped blocks outside window [{}, {})",
                            window.start,
                            window.end()
                        );
                    }
                }
                Err(e) => {
                    tracing::warn!(
                        "Fetch of [{}, {}) failed: {}",
                        window.start,
                        window.end(),
                        e
                    );
                    first_error.get_or_insert(e);
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(blocks),
        }
    }

    /// Write one wave and move the cursor to the end of the contiguous run.
    fn commit(
        &self,
        blocks: &[RawBlock],
        txs: &[RawTransaction],
        db_height: u64,
        end: u64,
    ) -> Result<(u64, BatchWriteResult)> {
        let block_records: Vec<_> = blocks.iter().map(to_block_record).collect();
        let tx_records: Vec<_> = txs.iter().map(to_tx_record).collect();

        let repo = Repository::new(&self.db);
        let written = match repo.persist_batch(&block_records, &tx_records) {
            Ok(written) => written,
            Err(e) if e.is_constraint_violation() => {
                tracing::debug!("Batch at {} already stored: {}", db_height, e);
                BatchWriteResult::default()
            }
            Err(e) => return Err(e.into()),
        };

        let new_height = repo.contiguous_height_from(db_height, end)?;
        if new_height > db_height {
            CursorStorage::new(&self.db).set_height(new_height)?;
        }
        Ok((new_height, written))
    }

    /// Fill in payload for transactions the node delivered without it.
    /// Lookups that fail leave the transaction as delivered.
    async fn enrich_payloads(&self, txs: &mut [RawTransaction]) {
        let missing: Vec<(usize, String)> = txs
            .iter()
            .enumerate()
            .filter(|(_, tx)| tx.is_missing_payload() && !tx.id.is_empty())
            .map(|(i, tx)| (i, tx.id.clone()))
            .collect();
        if missing.is_empty() {
            return;
        }

        let fetched: Vec<(usize, Result<RawTransaction>)> = stream::iter(missing)
            .map(|(i, id)| async move { (i, self.source.tx_details(&id).await) })
            .buffer_unordered(self.config.parallelism)
            .collect()
            .await;

        let mut enriched = 0usize;
        for (i, result) in fetched {
            match result {
                Ok(detailed) => {
                    txs[i].merge_payload(detailed);
                    enriched += 1;
                }
                Err(e) => tracing::warn!("Payload lookup for {} failed: {}", txs[i].id, e),
            }
        }
        tracing::debug!("Enriched {} transactions with payload", enriched);
    }

    /// Repair stored transactions that were written without payload.
    /// Returns how many rows were updated.
    pub async fn backfill_payloads(&self, limit: usize) -> Result<usize> {
        let ids = Repository::new(&self.db).transactions_missing_payload(limit)?;
        if ids.is_empty() {
            return Ok(0);
        }
        tracing::info!("Backfilling payload for {} transactions", ids.len());

        let fetched: Vec<(String, Result<RawTransaction>)> = stream::iter(ids)
            .map(|id| async move {
                let result = self.source.tx_details(&id).await;
                (id, result)
            })
            .buffer_unordered(self.config.parallelism)
            .collect()
            .await;

        let repo = Repository::new(&self.db);
        let mut repaired = 0;
        for (id, result) in fetched {
            let detailed = match result {
                Ok(detailed) => detailed,
                Err(e) => {
                    tracing::warn!("Payload lookup for {} failed: {}", id, e);
                    continue;
                }
            };
            if detailed.is_missing_payload() {
                continue;
            }
            let record = to_tx_record(&detailed);
            let payload = TransactionPayload {
                ins: record.ins,
                outs: record.outs,
                extra: record.extra,
                attachments: record.attachments,
            };
            if repo.update_transaction_payload(&id, &payload)? {
                repaired += 1;
            }
        }
        Ok(repaired)
    }

    /// Drop everything at or above `from_height` and rewind the cursor so the
    /// next pass refetches it. Must not run concurrently with a pass.
    pub fn resync(&self, from_height: u64) -> Result<()> {
        truncate_above_height(&self.db, from_height)?;
        let height = CursorStorage::new(&self.db).height()?;
        self.progress.reset_height(height);
        tracing::warn!("Resync requested: cursor rewound to {}", height);
        Ok(())
    }
}

// Ensure SyncEngine is Send + Sync for use across threads
fn _assert_send_sync() {
    fn assert<T: Send + Sync>() {}
    assert::<SyncEngine<crate::client::RpcClient>>();
}
