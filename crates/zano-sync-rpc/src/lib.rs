//! Zano chain sync
//!
//! Mirrors the Zano chain into the local store: a JSON-RPC client for the
//! node, the record transform, the wave-based block sync engine, the derived
//! stats refresher, and the single-flight scheduler that drives both.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod client;
pub mod error;
pub mod progress;
pub mod scheduler;
pub mod shutdown;
pub mod stats;
pub mod sync;
pub mod transform;
pub mod types;

pub use client::{
    normalize_endpoint, ChainSource, RetryConfig, RpcClient, RpcClientConfig, DEFAULT_NODE_URL,
};
pub use error::{Error, Result};
pub use progress::{ProgressSnapshot, SyncProgress, SyncStage};
pub use scheduler::{
    BusyGuard, Scheduler, SchedulerConfig, SchedulerCounters, TickOutcome, TickReport,
};
pub use shutdown::ShutdownSignal;
pub use stats::{
    estimate_staking, RefreshReport, StakingEstimate, StatsConfig, StatsRefresher, StatsSnapshot,
};
pub use sync::{
    plan_wave, FetchWindow, PassOutcome, SyncConfig, SyncEngine, DEFAULT_BATCH_SIZE,
    DEFAULT_PARALLELISM,
};
pub use transform::{sanitize_text, to_block_record, to_tx_record, txs_from_blocks};
pub use types::{RawBlock, RawTransaction, StakingSnapshot};
