//! Zano explorer sync daemon
//!
//! Keeps a local SQLite copy of the chain in step with a Zano node and
//! refreshes the derived statistics next to it.

mod config;

use anyhow::Context;
use clap::{Parser, Subcommand};
use config::{NodeArgs, ScheduleArgs, StoreArgs, SyncArgs};
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use zano_storage_sqlite::{migrations, CursorStorage, Database, Repository, SyncCursor};
use zano_sync_rpc::{
    ChainSource, RpcClient, Scheduler, ShutdownSignal, StatsRefresher, SyncEngine,
};

#[derive(Parser)]
#[command(name = "zano-sync")]
#[command(about = "Zano chain sync and stats daemon", long_about = None)]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Sync and refresh stats on a fixed interval until Ctrl-C
    Run {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        sync: SyncArgs,
        #[command(flatten)]
        schedule: ScheduleArgs,
    },

    /// Run a single sync pass and exit
    SyncOnce {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        sync: SyncArgs,

        /// Show a progress bar
        #[arg(long)]
        progress: bool,
    },

    /// Refresh derived stats once and exit
    RefreshStats {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
    },

    /// Print the cursor and row counts
    Status {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Drop stored blocks from a height on and rewind the cursor
    Resync {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,

        /// First height to drop
        #[arg(long)]
        from_height: u64,
    },

    /// Fetch payload for stored transactions that lack it
    BackfillPayloads {
        #[command(flatten)]
        node: NodeArgs,
        #[command(flatten)]
        store: StoreArgs,
        #[command(flatten)]
        sync: SyncArgs,

        /// Maximum transactions to repair
        #[arg(long, default_value_t = 1000)]
        limit: usize,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            node,
            store,
            sync,
            schedule,
        } => run_daemon(node, store, sync, schedule).await,
        Commands::SyncOnce {
            node,
            store,
            sync,
            progress,
        } => run_sync_once(node, store, sync, progress).await,
        Commands::RefreshStats { node, store } => run_refresh_stats(node, store).await,
        Commands::Status { node, store, json } => run_status(node, store, json).await,
        Commands::Resync {
            node,
            store,
            from_height,
        } => run_resync(node, store, from_height),
        Commands::BackfillPayloads {
            node,
            store,
            sync,
            limit,
        } => run_backfill(node, store, sync, limit).await,
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn open_store(store: &StoreArgs) -> anyhow::Result<Arc<Database>> {
    let db = Database::open(&store.path)
        .with_context(|| format!("opening database {}", store.path.display()))?;
    Ok(Arc::new(db))
}

fn connect(node: &NodeArgs) -> anyhow::Result<Arc<RpcClient>> {
    let client = RpcClient::with_config(node.client_config()).context("building node client")?;
    info!("Node endpoint: {}", client.endpoint());
    Ok(Arc::new(client))
}

fn build_engine(
    node: &NodeArgs,
    store: &StoreArgs,
    sync: &SyncArgs,
) -> anyhow::Result<(Arc<RpcClient>, Arc<Database>, SyncEngine<RpcClient>)> {
    let client = connect(node)?;
    let db = open_store(store)?;
    let engine = SyncEngine::with_config(Arc::clone(&client), Arc::clone(&db), sync.sync_config())?;
    engine.bootstrap()?;
    Ok((client, db, engine))
}

async fn run_daemon(
    node: NodeArgs,
    store: StoreArgs,
    sync: SyncArgs,
    schedule: ScheduleArgs,
) -> anyhow::Result<()> {
    let (client, db, engine) = build_engine(&node, &store, &sync)?;
    let stats = StatsRefresher::new(client, db);
    let scheduler = Scheduler::new(
        Arc::new(engine),
        Arc::new(stats),
        schedule.scheduler_config(),
    )?;

    let shutdown = ShutdownSignal::new();
    let on_ctrl_c = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Interrupt received, shutting down"),
            Err(e) => warn!("Cannot listen for Ctrl-C: {}", e),
        }
        on_ctrl_c.trigger();
    });

    scheduler.run(shutdown).await;

    let counters = scheduler.counters();
    info!(
        "Sync passes: {} started, {} skipped, {} failed; stats refreshes: {} started, {} skipped, {} failed",
        counters.sync_started,
        counters.sync_skipped,
        counters.sync_failed,
        counters.stats_started,
        counters.stats_skipped,
        counters.stats_failed
    );
    Ok(())
}

async fn run_sync_once(
    node: NodeArgs,
    store: StoreArgs,
    sync: SyncArgs,
    show_progress: bool,
) -> anyhow::Result<()> {
    let (_, _, engine) = build_engine(&node, &store, &sync)?;

    let bar = if show_progress {
        let progress = engine.progress();
        let pb = ProgressBar::new(100);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] {bar:40.cyan/blue} {percent}% {msg}")?
                .progress_chars("=>-"),
        );
        let ticker = pb.clone();
        let poller = tokio::spawn(async move {
            loop {
                let snap = progress.snapshot();
                ticker.set_position(progress.percentage() as u64);
                ticker.set_message(format!(
                    "{}/{} {:.0} blocks/s",
                    snap.db_height, snap.chain_height, snap.blocks_per_second
                ));
                tokio::time::sleep(Duration::from_millis(200)).await;
            }
        });
        Some((pb, poller))
    } else {
        None
    };

    let result = engine.run_pass().await;

    if let Some((pb, poller)) = bar {
        poller.abort();
        pb.finish_and_clear();
    }

    let outcome = result?;
    println!(
        "Synced {} -> {} of {} ({} blocks, {} txs in {} waves)",
        outcome.start_height,
        outcome.end_height,
        outcome.chain_height,
        outcome.blocks_written,
        outcome.txs_written,
        outcome.waves
    );
    if !outcome.reached_tip() {
        warn!("Pass stopped short of the chain tip; run again to continue");
    }
    Ok(())
}

async fn run_refresh_stats(node: NodeArgs, store: StoreArgs) -> anyhow::Result<()> {
    let client = connect(&node)?;
    let db = open_store(&store)?;
    CursorStorage::new(&db).create_cursor_if_absent()?;

    let report = StatsRefresher::new(client, db).refresh().await?;
    let w = &report.written;
    println!("alias_count:         {:?}", w.alias_count);
    println!("premium_alias_count: {:?}", w.premium_alias_count);
    println!("assets_count:        {:?}", w.assets_count);
    println!("staked_percentage:   {:?}", w.staked_percentage);
    println!("staked_coins:        {:?}", w.staked_coins);
    println!("apy:                 {:?}", w.apy);
    println!("burned_total:        {:?}", w.burned_total);
    for (field, error) in &report.failures {
        println!("failed {}: {}", field, error);
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct StatusReport {
    database: String,
    schema_version: i32,
    blocks_stored: u64,
    txs_stored: u64,
    cursor: Option<SyncCursor>,
    node_height: Option<u64>,
}

impl StatusReport {
    fn print(&self) {
        println!("database:       {}", self.database);
        println!("schema version: {}", self.schema_version);
        println!("blocks stored:  {}", self.blocks_stored);
        println!("txs stored:     {}", self.txs_stored);
        match &self.cursor {
            Some(cursor) => {
                println!("db height:      {}", cursor.db_height);
                println!("alias count:    {}", cursor.alias_count);
                println!("premium:        {}", cursor.premium_alias_count);
                println!("assets:         {}", cursor.assets_count);
                println!("staked %:       {}", cursor.staked_percentage);
                println!("staked coins:   {}", cursor.staked_coins);
                println!("apy:            {}", cursor.apy);
                println!("burned total:   {}", cursor.burned_total);
                println!("updated at:     {}", cursor.updated_at);
                if let Some(at) = &cursor.stats_updated_at {
                    println!("stats at:       {}", at);
                }
            }
            None => println!("cursor:         not created"),
        }
        match self.node_height {
            Some(height) => println!("node height:    {}", height),
            None => println!("node height:    unreachable"),
        }
    }
}

async fn run_status(node: NodeArgs, store: StoreArgs, json: bool) -> anyhow::Result<()> {
    let db = open_store(&store)?;
    let schema_version = migrations::get_schema_version(&db.conn())?;
    let repo = Repository::new(&db);

    let client = connect(&node)?;
    let node_height = match client.current_height().await {
        Ok(height) => Some(height),
        Err(e) => {
            warn!("Node height unavailable: {}", e);
            None
        }
    };

    let report = StatusReport {
        database: store.path.display().to_string(),
        schema_version,
        blocks_stored: repo.count_blocks()?,
        txs_stored: repo.count_transactions()?,
        cursor: CursorStorage::new(&db).get_cursor()?,
        node_height,
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        report.print();
    }
    Ok(())
}

fn run_resync(node: NodeArgs, store: StoreArgs, from_height: u64) -> anyhow::Result<()> {
    let client = connect(&node)?;
    let db = open_store(&store)?;
    let engine = SyncEngine::new(client, db);
    engine.bootstrap()?;
    engine.resync(from_height)?;
    println!("Cursor rewound to {}", engine.progress().db_height());
    Ok(())
}

async fn run_backfill(
    node: NodeArgs,
    store: StoreArgs,
    sync: SyncArgs,
    limit: usize,
) -> anyhow::Result<()> {
    let (_, _, engine) = build_engine(&node, &store, &sync)?;
    let repaired = engine.backfill_payloads(limit).await?;
    println!("Repaired payload for {} transactions", repaired);
    Ok(())
}
