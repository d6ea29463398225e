//! In-memory chain with failure injection shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::json;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use zano_storage_sqlite::{CursorStorage, Database, Repository};
use zano_sync_rpc::{
    ChainSource, Error, RawBlock, RawTransaction, Result, StakingSnapshot, StatsRefresher,
    SyncConfig, SyncEngine,
};

/// Fee carried by every generated block, two whole coins
pub const BLOCK_FEE: u64 = 2_000_000_000_000;

/// Deterministic chain: block `h` carries one transaction `tx-h`.
pub struct FakeChain {
    reported_height: AtomicU64,
    served_height: AtomicU64,
    fail_height: AtomicBool,
    fail_starts: Mutex<HashSet<u64>>,
    calls: Mutex<Vec<(u64, u64)>>,
    strip_payload: AtomicBool,
    fail_tx_details: AtomicBool,
    tx_detail_calls: AtomicU64,
    delay: Mutex<Option<Duration>>,
    aliases: Mutex<Vec<String>>,
    alias_count: AtomicU64,
    fail_aliases: AtomicBool,
    assets: AtomicU64,
    fail_assets: AtomicBool,
    staking: Mutex<StakingSnapshot>,
    fail_staking: AtomicBool,
}

impl FakeChain {
    pub fn new(height: u64) -> Self {
        Self {
            reported_height: AtomicU64::new(height),
            served_height: AtomicU64::new(height),
            fail_height: AtomicBool::new(false),
            fail_starts: Mutex::new(HashSet::new()),
            calls: Mutex::new(Vec::new()),
            strip_payload: AtomicBool::new(false),
            fail_tx_details: AtomicBool::new(false),
            tx_detail_calls: AtomicU64::new(0),
            delay: Mutex::new(None),
            aliases: Mutex::new(vec!["zano".to_string(), "exchange".to_string()]),
            alias_count: AtomicU64::new(2),
            fail_aliases: AtomicBool::new(false),
            assets: AtomicU64::new(0),
            fail_assets: AtomicBool::new(false),
            staking: Mutex::new(StakingSnapshot {
                pos_difficulty: 176.363e12,
                total_coins: 1.0e12,
            }),
            fail_staking: AtomicBool::new(false),
        }
    }

    /// Height reported by `current_height` and served by `block_range`
    pub fn set_height(&self, height: u64) {
        self.reported_height.store(height, Ordering::SeqCst);
        self.served_height.store(height, Ordering::SeqCst);
    }

    /// Report one height but only serve blocks below another
    pub fn set_heights(&self, reported: u64, served: u64) {
        self.reported_height.store(reported, Ordering::SeqCst);
        self.served_height.store(served, Ordering::SeqCst);
    }

    pub fn fail_height(&self, fail: bool) {
        self.fail_height.store(fail, Ordering::SeqCst);
    }

    pub fn fail_window_at(&self, start: u64) {
        self.fail_starts.lock().insert(start);
    }

    pub fn clear_window_failures(&self) {
        self.fail_starts.lock().clear();
    }

    pub fn strip_payload(&self, strip: bool) {
        self.strip_payload.store(strip, Ordering::SeqCst);
    }

    pub fn fail_tx_details(&self, fail: bool) {
        self.fail_tx_details.store(fail, Ordering::SeqCst);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn set_aliases(&self, names: &[&str]) {
        *self.aliases.lock() = names.iter().map(|s| s.to_string()).collect();
        self.alias_count.store(names.len() as u64, Ordering::SeqCst);
    }

    pub fn fail_aliases(&self, fail: bool) {
        self.fail_aliases.store(fail, Ordering::SeqCst);
    }

    pub fn set_assets(&self, count: u64) {
        self.assets.store(count, Ordering::SeqCst);
    }

    pub fn fail_assets(&self, fail: bool) {
        self.fail_assets.store(fail, Ordering::SeqCst);
    }

    pub fn set_staking(&self, pos_difficulty: f64, total_coins: f64) {
        *self.staking.lock() = StakingSnapshot {
            pos_difficulty,
            total_coins,
        };
    }

    pub fn fail_staking(&self, fail: bool) {
        self.fail_staking.store(fail, Ordering::SeqCst);
    }

    /// Every `block_range` call as `(from, count)`
    pub fn calls(&self) -> Vec<(u64, u64)> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn tx_detail_calls(&self) -> u64 {
        self.tx_detail_calls.load(Ordering::SeqCst)
    }

    fn transaction(height: u64, with_payload: bool) -> RawTransaction {
        let mut tx = RawTransaction {
            id: format!("tx-{}", height),
            keeper_block: Some(height),
            timestamp: 1_600_000_000 + height as i64 * 60,
            fee: Some(BLOCK_FEE.to_string()),
            ..Default::default()
        };
        if with_payload {
            tx.ins = Some(json!([{ "amount": height }]));
            tx.outs = Some(json!([]));
            tx.extra = Some(json!([{ "comment": "block's tx" }]));
        }
        tx
    }

    fn block(height: u64, with_payload: bool) -> RawBlock {
        RawBlock {
            id: format!("{:064x}", height),
            height,
            timestamp: 1_600_000_000 + height as i64 * 60,
            total_fee: Some(BLOCK_FEE.to_string()),
            miner_text_info: Some("pool's block".to_string()),
            transactions_details: vec![Self::transaction(height, with_payload)],
            ..Default::default()
        }
    }

    fn injected(what: &str) -> Error {
        Error::RpcUnavailable(format!("injected {} failure", what))
    }
}

#[async_trait]
impl ChainSource for FakeChain {
    async fn current_height(&self) -> Result<u64> {
        if self.fail_height.load(Ordering::SeqCst) {
            return Err(Self::injected("height"));
        }
        Ok(self.reported_height.load(Ordering::SeqCst))
    }

    async fn block_range(&self, from_height: u64, count: u64) -> Result<Vec<RawBlock>> {
        self.calls.lock().push((from_height, count));
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_starts.lock().contains(&from_height) {
            return Err(Self::injected("block range"));
        }

        let served = self.served_height.load(Ordering::SeqCst);
        let with_payload = !self.strip_payload.load(Ordering::SeqCst);
        let end = from_height.saturating_add(count).min(served);
        Ok((from_height..end)
            .map(|h| Self::block(h, with_payload))
            .collect())
    }

    async fn tx_details(&self, tx_id: &str) -> Result<RawTransaction> {
        self.tx_detail_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_tx_details.load(Ordering::SeqCst) {
            return Err(Self::injected("tx details"));
        }
        let height = tx_id
            .strip_prefix("tx-")
            .and_then(|h| h.parse::<u64>().ok())
            .ok_or_else(|| Error::RpcUnavailable(format!("unknown tx {}", tx_id)))?;
        Ok(Self::transaction(height, true))
    }

    async fn alias_count(&self) -> Result<u64> {
        if self.fail_aliases.load(Ordering::SeqCst) {
            return Err(Self::injected("alias"));
        }
        Ok(self.alias_count.load(Ordering::SeqCst))
    }

    async fn alias_names(&self) -> Result<Vec<String>> {
        if self.fail_aliases.load(Ordering::SeqCst) {
            return Err(Self::injected("alias"));
        }
        Ok(self.aliases.lock().clone())
    }

    async fn asset_count(&self) -> Result<u64> {
        if self.fail_assets.load(Ordering::SeqCst) {
            return Err(Self::injected("asset"));
        }
        Ok(self.assets.load(Ordering::SeqCst))
    }

    async fn staking_snapshot(&self) -> Result<StakingSnapshot> {
        if self.fail_staking.load(Ordering::SeqCst) {
            return Err(Self::injected("getinfo"));
        }
        Ok(*self.staking.lock())
    }
}

/// Fresh store with the cursor created
pub fn test_db() -> Arc<Database> {
    let db = Arc::new(Database::open_in_memory().unwrap());
    CursorStorage::new(&db).create_cursor_if_absent().unwrap();
    db
}

/// File-backed store; keep the directory alive for the database's lifetime.
pub fn file_db() -> (TempDir, PathBuf, Arc<Database>) {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("zano-stats.db");
    let db = Arc::new(Database::open(&path).unwrap());
    CursorStorage::new(&db).create_cursor_if_absent().unwrap();
    (dir, path, db)
}

pub fn engine(chain: &Arc<FakeChain>, db: &Arc<Database>) -> SyncEngine<FakeChain> {
    engine_with(chain, db, SyncConfig::default())
}

pub fn engine_with(
    chain: &Arc<FakeChain>,
    db: &Arc<Database>,
    config: SyncConfig,
) -> SyncEngine<FakeChain> {
    SyncEngine::with_config(Arc::clone(chain), Arc::clone(db), config).unwrap()
}

pub fn refresher(chain: &Arc<FakeChain>, db: &Arc<Database>) -> StatsRefresher<FakeChain> {
    StatsRefresher::new(Arc::clone(chain), Arc::clone(db))
}

pub fn db_height(db: &Database) -> u64 {
    CursorStorage::new(db).height().unwrap()
}

/// Rows `[0, height)` are all present
pub fn assert_no_height_without_data(db: &Database) {
    let height = db_height(db);
    let repo = Repository::new(db);
    assert_eq!(repo.contiguous_height_from(0, height).unwrap(), height);
}
