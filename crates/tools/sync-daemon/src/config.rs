//! Command line and environment configuration

use clap::Args;
use std::path::PathBuf;
use std::time::Duration;
use zano_sync_rpc::{
    RetryConfig, RpcClientConfig, SchedulerConfig, SyncConfig, DEFAULT_BATCH_SIZE,
    DEFAULT_NODE_URL, DEFAULT_PARALLELISM,
};

/// Node connection
#[derive(Args, Debug, Clone)]
pub struct NodeArgs {
    /// Zano daemon base URL (a trailing /json_rpc is accepted)
    #[arg(long = "node-url", env = "ZANOD_URL", default_value = DEFAULT_NODE_URL)]
    pub url: String,

    /// Per-request timeout in seconds
    #[arg(long = "rpc-timeout", env = "RPC_TIMEOUT_SECS", default_value_t = 30)]
    pub timeout_secs: u64,

    /// Attempts per RPC call (1 disables retries)
    #[arg(long = "rpc-max-attempts", env = "RPC_MAX_ATTEMPTS", default_value_t = 1)]
    pub max_attempts: u32,
}

impl NodeArgs {
    pub fn client_config(&self) -> RpcClientConfig {
        RpcClientConfig {
            endpoint: self.url.clone(),
            request_timeout: Duration::from_secs(self.timeout_secs),
            retry: RetryConfig {
                max_attempts: self.max_attempts,
                ..RetryConfig::default()
            },
            ..RpcClientConfig::default()
        }
    }
}

/// Local store
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// SQLite database path
    #[arg(long = "db", env = "ZANO_STATS_DB", default_value = "zano-stats.db")]
    pub path: PathBuf,
}

/// Sync tuning
#[derive(Args, Debug, Clone)]
pub struct SyncArgs {
    /// Blocks per request
    #[arg(long = "batch-size", env = "SYNC_BATCH_SIZE", default_value_t = DEFAULT_BATCH_SIZE)]
    pub batch_size: u64,

    /// Concurrent requests per wave
    #[arg(long, env = "SYNC_PARALLELISM", default_value_t = DEFAULT_PARALLELISM)]
    pub parallelism: usize,

    /// Store transactions as delivered, without payload lookups
    #[arg(long = "no-enrich")]
    pub no_enrich: bool,
}

impl SyncArgs {
    pub fn sync_config(&self) -> SyncConfig {
        SyncConfig {
            batch_size: self.batch_size,
            parallelism: self.parallelism,
            enrich_missing_payloads: !self.no_enrich,
        }
    }
}

/// Scheduler tuning
#[derive(Args, Debug, Clone)]
pub struct ScheduleArgs {
    /// Seconds between ticks
    #[arg(long = "interval", env = "SYNC_INTERVAL_SECS", default_value_t = 5)]
    pub interval_secs: u64,

    /// Skip block sync, refresh stats only
    #[arg(long = "no-sync")]
    pub no_sync: bool,

    /// Skip stats, sync blocks only
    #[arg(long = "no-stats")]
    pub no_stats: bool,
}

impl ScheduleArgs {
    pub fn scheduler_config(&self) -> SchedulerConfig {
        SchedulerConfig {
            interval: Duration::from_secs(self.interval_secs),
            run_sync: !self.no_sync,
            run_stats: !self.no_stats,
        }
    }
}
