//! Periodic single-flight scheduler
//!
//! Every tick starts a sync pass and a stats refresh as independent tasks.
//! Each job has its own busy flag; a tick that finds its job still running
//! is skipped, never queued.

use crate::client::ChainSource;
use crate::shutdown::ShutdownSignal;
use crate::stats::StatsRefresher;
use crate::sync::SyncEngine;
use crate::{Error, Result};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info};

/// Default tick interval
pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(5);

/// Scheduler configuration
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Time between ticks
    pub interval: Duration,
    /// Start a sync pass on each tick
    pub run_sync: bool,
    /// Start a stats refresh on each tick
    pub run_stats: bool,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            run_sync: true,
            run_stats: true,
        }
    }
}

impl SchedulerConfig {
    /// Check values before starting a scheduler
    pub fn validate(&self) -> Result<()> {
        if self.interval.is_zero() {
            return Err(Error::Config("scheduler interval must be positive".to_string()));
        }
        Ok(())
    }
}

/// What a tick did for one job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// A new run was spawned
    Started,
    /// The previous run was still in flight
    Skipped,
    /// The job is turned off
    Disabled,
}

/// Holds a job's busy flag; clears it on drop, including on panic unwind.
#[derive(Debug)]
pub struct BusyGuard {
    flag: Arc<AtomicBool>,
}

impl BusyGuard {
    /// Take the flag if it is free
    pub fn try_acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self {
                flag: Arc::clone(flag),
            })
    }
}

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

#[derive(Debug, Default)]
struct Counters {
    sync_started: AtomicU64,
    sync_skipped: AtomicU64,
    sync_failed: AtomicU64,
    stats_started: AtomicU64,
    stats_skipped: AtomicU64,
    stats_failed: AtomicU64,
}

/// Counter values at one point in time
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SchedulerCounters {
    /// Sync passes spawned
    pub sync_started: u64,
    /// Sync ticks skipped because a pass was running
    pub sync_skipped: u64,
    /// Sync passes that returned an error
    pub sync_failed: u64,
    /// Stats refreshes spawned
    pub stats_started: u64,
    /// Stats ticks skipped because a refresh was running
    pub stats_skipped: u64,
    /// Stats refreshes that returned an error
    pub stats_failed: u64,
}

/// Outcome of one tick plus the spawned task handles
#[derive(Debug)]
pub struct TickReport {
    /// Sync job
    pub sync: TickOutcome,
    /// Stats job
    pub stats: TickOutcome,
    /// Tasks spawned by this tick
    pub handles: Vec<JoinHandle<()>>,
}

/// Scheduler
pub struct Scheduler<S: ChainSource + 'static> {
    engine: Arc<SyncEngine<S>>,
    stats: Arc<StatsRefresher<S>>,
    config: SchedulerConfig,
    sync_busy: Arc<AtomicBool>,
    stats_busy: Arc<AtomicBool>,
    counters: Arc<Counters>,
}

impl<S: ChainSource + 'static> Scheduler<S> {
    /// Create a scheduler over an engine and a refresher
    pub fn new(
        engine: Arc<SyncEngine<S>>,
        stats: Arc<StatsRefresher<S>>,
        config: SchedulerConfig,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            engine,
            stats,
            config,
            sync_busy: Arc::new(AtomicBool::new(false)),
            stats_busy: Arc::new(AtomicBool::new(false)),
            counters: Arc::new(Counters::default()),
        })
    }

    /// True while a sync pass is in flight
    pub fn is_sync_busy(&self) -> bool {
        self.sync_busy.load(Ordering::Acquire)
    }

    /// True while a stats refresh is in flight
    pub fn is_stats_busy(&self) -> bool {
        self.stats_busy.load(Ordering::Acquire)
    }

    /// Current counter values
    pub fn counters(&self) -> SchedulerCounters {
        let c = &self.counters;
        SchedulerCounters {
            sync_started: c.sync_started.load(Ordering::Relaxed),
            sync_skipped: c.sync_skipped.load(Ordering::Relaxed),
            sync_failed: c.sync_failed.load(Ordering::Relaxed),
            stats_started: c.stats_started.load(Ordering::Relaxed),
            stats_skipped: c.stats_skipped.load(Ordering::Relaxed),
            stats_failed: c.stats_failed.load(Ordering::Relaxed),
        }
    }

    /// Spawn a sync pass unless one is already running
    pub fn trigger_sync(&self) -> (TickOutcome, Option<JoinHandle<()>>) {
        let Some(guard) = BusyGuard::try_acquire(&self.sync_busy) else {
            self.counters.sync_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous sync pass still running, skipping tick");
            return (TickOutcome::Skipped, None);
        };
        self.counters.sync_started.fetch_add(1, Ordering::Relaxed);

        let engine = Arc::clone(&self.engine);
        let counters = Arc::clone(&self.counters);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if engine.run_pass().await.is_err() {
                counters.sync_failed.fetch_add(1, Ordering::Relaxed);
            }
        });
        (TickOutcome::Started, Some(handle))
    }

    /// Spawn a stats refresh unless one is already running
    pub fn trigger_stats(&self) -> (TickOutcome, Option<JoinHandle<()>>) {
        let Some(guard) = BusyGuard::try_acquire(&self.stats_busy) else {
            self.counters.stats_skipped.fetch_add(1, Ordering::Relaxed);
            debug!("Previous stats refresh still running, skipping tick");
            return (TickOutcome::Skipped, None);
        };
        self.counters.stats_started.fetch_add(1, Ordering::Relaxed);

        let stats = Arc::clone(&self.stats);
        let counters = Arc::clone(&self.counters);
        let handle = tokio::spawn(async move {
            let _guard = guard;
            if let Err(e) = stats.refresh().await {
                counters.stats_failed.fetch_add(1, Ordering::Relaxed);
                error!("Stats refresh failed: {}", e);
            }
        });
        (TickOutcome::Started, Some(handle))
    }

    /// Run both jobs once, honoring their busy flags
    pub fn tick(&self) -> TickReport {
        let mut handles = Vec::new();

        let sync = if self.config.run_sync {
            let (outcome, handle) = self.trigger_sync();
            handles.extend(handle);
            outcome
        } else {
            TickOutcome::Disabled
        };

        let stats = if self.config.run_stats {
            let (outcome, handle) = self.trigger_stats();
            handles.extend(handle);
            outcome
        } else {
            TickOutcome::Disabled
        };

        TickReport {
            sync,
            stats,
            handles,
        }
    }

    /// Tick until `shutdown` fires, then wait for in-flight jobs.
    pub async fn run(&self, shutdown: ShutdownSignal) {
        let mut interval = tokio::time::interval(self.config.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();

        info!(
            "Scheduler started: interval={:?}, sync={}, stats={}",
            self.config.interval, self.config.run_sync, self.config.run_stats
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {
                    let report = self.tick();
                    in_flight.retain(|handle| !handle.is_finished());
                    in_flight.extend(report.handles);
                }
            }
        }

        info!(
            "Scheduler stopping, waiting for {} in-flight jobs",
            in_flight.len()
        );
        for handle in in_flight {
            if let Err(e) = handle.await {
                error!("Scheduled job panicked: {}", e);
            }
        }
        info!("Scheduler stopped");
    }
}
