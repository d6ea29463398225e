//! Derived chain statistics
//!
//! Alias, asset, staking, and burn figures are refreshed independently of
//! block sync. Each input is fetched on its own; whatever resolves is written
//! to the cursor in one update and the rest keep their last known value.

use crate::client::ChainSource;
use crate::types::StakingSnapshot;
use crate::Result;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use std::sync::Arc;
use zano_storage_sqlite::{CursorStorage, Database, DerivedStats, Repository, SyncCursor};

/// Height at which fee burning began
pub const DEFAULT_BURN_START_HEIGHT: u64 = 2_555_000;

/// Longest alias name counted as premium
pub const DEFAULT_PREMIUM_ALIAS_MAX_LEN: usize = 5;

/// Atomic units per coin
pub const ATOMIC_UNITS_PER_COIN: f64 = 1e12;

/// Blocks per day times days per year, the APY numerator
const YEARLY_REWARD_UNITS: f64 = 720.0 * 365.0;

/// Stats configuration
#[derive(Debug, Clone)]
pub struct StatsConfig {
    /// First height whose fees count as burned
    pub burn_start_height: u64,
    /// Aliases at most this long are premium
    pub premium_alias_max_len: usize,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            burn_start_height: DEFAULT_BURN_START_HEIGHT,
            premium_alias_max_len: DEFAULT_PREMIUM_ALIAS_MAX_LEN,
        }
    }
}

/// Staking figures derived from one `getinfo` snapshot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StakingEstimate {
    /// Staked share of supply, percent, two decimals
    pub staked_percentage: f64,
    /// Staked coins
    pub staked_coins: f64,
    /// Yearly staking yield, percent
    pub apy: f64,
}

/// Round to two decimals
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Estimate staking figures. `None` when the supply is zero or unusable.
pub fn estimate_staking(snapshot: &StakingSnapshot) -> Option<StakingEstimate> {
    let StakingSnapshot {
        pos_difficulty,
        total_coins,
    } = *snapshot;
    if !(total_coins.is_finite() && pos_difficulty.is_finite()) || total_coins <= 0.0 {
        return None;
    }

    let staked_percentage = round2(0.55 * (pos_difficulty / total_coins) / 176.363 * 100.0);
    let staked_coins = total_coins / 100.0 * staked_percentage / ATOMIC_UNITS_PER_COIN;
    let divisor = if staked_coins == 0.0 { 1.0 } else { staked_coins };
    let apy = YEARLY_REWARD_UNITS / divisor * 100.0;

    Some(StakingEstimate {
        staked_percentage,
        staked_coins,
        apy,
    })
}

/// Aliases whose name is at most `max_len` characters
pub fn count_premium_aliases(names: &[String], max_len: usize) -> u64 {
    names
        .iter()
        .filter(|name| !name.is_empty() && name.chars().count() <= max_len)
        .count() as u64
}

/// Latest published statistics
#[derive(Debug, Clone, Default)]
pub struct StatsSnapshot {
    /// Cursor row as of the last refresh
    pub cursor: SyncCursor,
    /// When the snapshot was taken
    pub refreshed_at: Option<DateTime<Utc>>,
    /// Inputs that failed during the last refresh
    pub failures: Vec<String>,
}

/// What one refresh resolved
#[derive(Debug, Clone, Default)]
pub struct RefreshReport {
    /// Values written to the cursor
    pub written: DerivedStats,
    /// Inputs that failed, with their error
    pub failures: Vec<(&'static str, String)>,
}

/// Stats refresher
pub struct StatsRefresher<S: ChainSource> {
    source: Arc<S>,
    db: Arc<Database>,
    config: StatsConfig,
    latest: RwLock<Arc<StatsSnapshot>>,
}

impl<S: ChainSource> StatsRefresher<S> {
    /// Refresher with default configuration
    pub fn new(source: Arc<S>, db: Arc<Database>) -> Self {
        Self::with_config(source, db, StatsConfig::default())
    }

    /// Refresher with custom configuration
    pub fn with_config(source: Arc<S>, db: Arc<Database>, config: StatsConfig) -> Self {
        Self {
            source,
            db,
            config,
            latest: RwLock::new(Arc::new(StatsSnapshot::default())),
        }
    }

    /// Latest published snapshot
    pub fn latest(&self) -> Arc<StatsSnapshot> {
        Arc::clone(&self.latest.read())
    }

    /// Fetch every input, write what resolved, publish a new snapshot.
    ///
    /// Fails only when the store itself cannot be written.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let (aliases, names, assets, staking) = tokio::join!(
            self.source.alias_count(),
            self.source.alias_names(),
            self.source.asset_count(),
            self.source.staking_snapshot(),
        );

        let mut report = RefreshReport::default();
        let stats = &mut report.written;

        match aliases {
            Ok(count) => stats.alias_count = Some(count),
            Err(e) => report.failures.push(("alias_count", e.to_string())),
        }
        match names {
            Ok(names) => {
                stats.premium_alias_count = Some(count_premium_aliases(
                    &names,
                    self.config.premium_alias_max_len,
                ))
            }
            Err(e) => report.failures.push(("premium_alias_count", e.to_string())),
        }
        match assets {
            Ok(count) => stats.assets_count = Some(count),
            Err(e) => report.failures.push(("assets_count", e.to_string())),
        }
        match staking.map(|snapshot| estimate_staking(&snapshot)) {
            Ok(Some(estimate)) => {
                stats.staked_percentage = Some(estimate.staked_percentage);
                stats.staked_coins = Some(estimate.staked_coins);
                stats.apy = Some(estimate.apy);
            }
            Ok(None) => report
                .failures
                .push(("staking", "total coin supply is zero".to_string())),
            Err(e) => report.failures.push(("staking", e.to_string())),
        }
        match Repository::new(&self.db).sum_fees_from_height(self.config.burn_start_height) {
            Ok(fees) => stats.burned_total = Some(fees as f64 / ATOMIC_UNITS_PER_COIN),
            Err(e) => report.failures.push(("burned_total", e.to_string())),
        }

        for (field, error) in &report.failures {
            tracing::warn!("Stats input {} unavailable: {}", field, error);
        }

        let storage = CursorStorage::new(&self.db);
        storage.set_derived_stats(&report.written)?;

        if let Some(cursor) = storage.get_cursor()? {
            let snapshot = StatsSnapshot {
                cursor,
                refreshed_at: Some(Utc::now()),
                failures: report
                    .failures
                    .iter()
                    .map(|(field, _)| field.to_string())
                    .collect(),
            };
            *self.latest.write() = Arc::new(snapshot);
        }

        tracing::debug!(
            "Stats refreshed ({} inputs failed)",
            report.failures.len()
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round2() {
        assert_eq!(round2(1.234), 1.23);
        assert_eq!(round2(1.235_1), 1.24);
        assert_eq!(round2(0.0), 0.0);
    }

    #[test]
    fn test_estimate_staking_formula() {
        let snapshot = StakingSnapshot {
            pos_difficulty: 176.363e12,
            total_coins: 1.0e12,
        };
        let estimate = estimate_staking(&snapshot).unwrap();

        // 0.55 * (176.363 / 1) / 176.363 * 100 = 55
        assert_eq!(estimate.staked_percentage, 55.0);
        // 1e12 / 100 * 55 / 1e12 = 0.55
        assert!((estimate.staked_coins - 0.55).abs() < 1e-9);
        assert!((estimate.apy - 720.0 * 365.0 / 0.55 * 100.0).abs() < 1e-3);
    }

    #[test]
    fn test_zero_staked_coins_uses_unit_divisor() {
        let snapshot = StakingSnapshot {
            pos_difficulty: 0.0,
            total_coins: 1.0e18,
        };
        let estimate = estimate_staking(&snapshot).unwrap();
        assert_eq!(estimate.staked_coins, 0.0);
        assert_eq!(estimate.apy, 720.0 * 365.0 * 100.0);
        assert!(estimate.apy.is_finite());
    }

    #[test]
    fn test_zero_supply_skips_staking() {
        let snapshot = StakingSnapshot {
            pos_difficulty: 5.0,
            total_coins: 0.0,
        };
        assert!(estimate_staking(&snapshot).is_none());
    }

    #[test]
    fn test_count_premium_aliases() {
        let names: Vec<String> = ["zano", "alice", "bobbyx", "a", "", "ñañañ"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert_eq!(count_premium_aliases(&names, 5), 4);
    }
}
