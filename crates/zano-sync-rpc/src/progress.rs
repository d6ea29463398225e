//! Sync progress tracking with pass counters and throughput

use parking_lot::RwLock;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Sync stage
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncStage {
    /// No pass running
    Idle,
    /// Fetching block windows from the node
    Fetching,
    /// Writing a wave to the store
    Persisting,
    /// Last pass reached the chain tip
    Complete,
    /// Last pass aborted
    Failed,
}

impl SyncStage {
    /// Get display name
    pub fn name(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Fetching => "Fetching Blocks",
            Self::Persisting => "Persisting",
            Self::Complete => "Synced",
            Self::Failed => "Failed",
        }
    }
}

/// Point-in-time copy of the progress state
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Persisted height
    pub db_height: u64,
    /// Chain height seen by the current or last pass
    pub chain_height: u64,
    /// Current stage
    pub stage: SyncStage,
    /// Passes that finished without error
    pub passes_completed: u64,
    /// Passes that aborted
    pub passes_failed: u64,
    /// Blocks inserted since start
    pub blocks_written: u64,
    /// Transactions inserted since start
    pub txs_written: u64,
    /// Duration of the last finished pass
    pub last_pass_duration: Option<Duration>,
    /// Message of the last failure
    pub last_error: Option<String>,
    /// Throughput of the current or last pass
    pub blocks_per_second: f64,
}

/// Sync progress
#[derive(Debug, Clone)]
pub struct SyncProgress {
    inner: Arc<RwLock<ProgressInner>>,
}

#[derive(Debug, Clone)]
struct ProgressInner {
    db_height: u64,
    chain_height: u64,
    start_height: u64,
    stage: SyncStage,
    start_time: Option<Instant>,
    last_pass_duration: Option<Duration>,
    blocks_per_second: f64,
    passes_completed: u64,
    passes_failed: u64,
    blocks_written: u64,
    txs_written: u64,
    last_error: Option<String>,
}

impl Default for SyncProgress {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncProgress {
    /// Create new progress tracker
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(ProgressInner {
                db_height: 0,
                chain_height: 0,
                start_height: 0,
                stage: SyncStage::Idle,
                start_time: None,
                last_pass_duration: None,
                blocks_per_second: 0.0,
                passes_completed: 0,
                passes_failed: 0,
                blocks_written: 0,
                txs_written: 0,
                last_error: None,
            })),
        }
    }

    /// Mark the start of a pass from `db_height`
    pub fn begin_pass(&self, db_height: u64) {
        let mut inner = self.inner.write();
        inner.start_time = Some(Instant::now());
        inner.db_height = db_height;
        inner.start_height = db_height;
        inner.blocks_per_second = 0.0;
        inner.stage = SyncStage::Fetching;
    }

    /// Set chain height
    pub fn set_chain_height(&self, height: u64) {
        self.inner.write().chain_height = height;
    }

    /// Set stage
    pub fn set_stage(&self, stage: SyncStage) {
        self.inner.write().stage = stage;
    }

    /// Record a committed wave
    pub fn record_wave(&self, db_height: u64, blocks: usize, txs: usize) {
        let mut inner = self.inner.write();
        inner.db_height = db_height;
        inner.blocks_written += blocks as u64;
        inner.txs_written += txs as u64;

        if let Some(start_time) = inner.start_time {
            let elapsed = start_time.elapsed().as_secs_f64();
            let synced = inner.db_height.saturating_sub(inner.start_height);
            if synced > 0 && elapsed > 0.0 {
                inner.blocks_per_second = synced as f64 / elapsed;
            }
        }
    }

    /// Mark the pass finished
    pub fn complete_pass(&self) {
        let mut inner = self.inner.write();
        inner.passes_completed += 1;
        inner.last_pass_duration = inner.start_time.map(|t| t.elapsed());
        inner.stage = if inner.db_height >= inner.chain_height {
            SyncStage::Complete
        } else {
            SyncStage::Idle
        };
    }

    /// Mark the pass aborted
    pub fn fail_pass(&self, error: &str) {
        let mut inner = self.inner.write();
        inner.passes_failed += 1;
        inner.last_pass_duration = inner.start_time.map(|t| t.elapsed());
        inner.last_error = Some(error.to_string());
        inner.stage = SyncStage::Failed;
    }

    /// Forget the height after a deliberate rewind
    pub fn reset_height(&self, db_height: u64) {
        let mut inner = self.inner.write();
        inner.db_height = db_height;
        inner.start_height = db_height;
        inner.stage = SyncStage::Idle;
    }

    /// Get progress percentage
    pub fn percentage(&self) -> f64 {
        let inner = self.inner.read();
        if inner.chain_height == 0 {
            return 0.0;
        }
        if inner.db_height >= inner.chain_height {
            return 100.0;
        }
        (inner.db_height as f64 / inner.chain_height as f64) * 100.0
    }

    /// Get persisted height
    pub fn db_height(&self) -> u64 {
        self.inner.read().db_height
    }

    /// Get chain height
    pub fn chain_height(&self) -> u64 {
        self.inner.read().chain_height
    }

    /// Get current stage
    pub fn stage(&self) -> SyncStage {
        self.inner.read().stage
    }

    /// Get a consistent copy of every counter
    pub fn snapshot(&self) -> ProgressSnapshot {
        let inner = self.inner.read();
        ProgressSnapshot {
            db_height: inner.db_height,
            chain_height: inner.chain_height,
            stage: inner.stage,
            passes_completed: inner.passes_completed,
            passes_failed: inner.passes_failed,
            blocks_written: inner.blocks_written,
            txs_written: inner.txs_written,
            last_pass_duration: inner.last_pass_duration,
            last_error: inner.last_error.clone(),
            blocks_per_second: inner.blocks_per_second,
        }
    }
}
