//! Keno Round Server
//!
//! Runs the round loop and the player-facing API in one process.

use clap::Parser;
use keno::api::{shutdown_signal, ApiServer, AppState, WebSocketManager};
use keno::config::{ConfigLoader, KenoConfig, StorageBackend};
use keno::stats::StatsLedger;
use keno::store::{KenoStore, MemoryStore, RocksStore};
use keno::{BetService, BroadcastHub, Clock, KenoMetrics, RoundEngine, Supervisor, SystemClock};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "keno")]
#[command(about = "Multiplayer Keno Round Server", long_about = None)]
struct Args {
    /// TOML configuration file
    #[arg(long)]
    config: Option<String>,

    /// API server host
    #[arg(long)]
    host: Option<String>,

    /// API server port
    #[arg(long)]
    port: Option<u16>,

    /// Database directory
    #[arg(long)]
    data_dir: Option<String>,

    /// Keep all state in memory (lost on exit)
    #[arg(long)]
    memory: bool,

    /// Wipe the database before starting
    #[arg(long)]
    clear: bool,

    /// Fixed RNG seed for reproducible draws
    #[arg(long)]
    seed: Option<u64>,

    /// Log filter used when RUST_LOG is unset
    #[arg(long)]
    log_level: Option<String>,
}

fn load_config(args: &Args) -> Result<KenoConfig, Box<dyn std::error::Error>> {
    let loader = match &args.config {
        Some(path) => ConfigLoader::new().with_path(path),
        None => ConfigLoader::new(),
    };
    let mut config = loader.load()?;

    if let Some(host) = &args.host {
        config.api.host = host.clone();
    }
    if let Some(port) = args.port {
        config.api.port = port;
    }
    if let Some(dir) = &args.data_dir {
        config.storage.data_directory = dir.clone();
    }
    if args.memory {
        config.storage.backend = StorageBackend::Memory;
    }
    if args.clear {
        config.storage.clear_on_start = true;
    }
    if let Some(level) = &args.log_level {
        config.monitoring.log_level = level.clone();
    }

    config.validate()?;
    Ok(config)
}

fn open_store(config: &KenoConfig) -> Result<Arc<dyn KenoStore>, Box<dyn std::error::Error>> {
    match config.storage.backend {
        StorageBackend::Rocksdb => {
            info!(
                path = %config.storage.data_directory,
                clear = config.storage.clear_on_start,
                "Opening round database"
            );
            let store = RocksStore::open(&config.storage.data_directory, config.storage.clear_on_start)?;
            Ok(Arc::new(store))
        }
        StorageBackend::Memory => {
            warn!("Using in-memory store; rounds and balances are lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let config = load_config(&args)?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.monitoring.log_level)),
        )
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        pool_size = config.game.pool_size,
        draw_size = config.game.draw_size,
        strategy = ?config.rtp.strategy,
        rtp_floor = config.rtp.floor,
        rtp_ceiling = config.rtp.ceiling,
        "Starting keno server"
    );

    let store = open_store(&config)?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let metrics = Arc::new(KenoMetrics::new()?);
    let hub = BroadcastHub::default();
    let heartbeat = hub.start_heartbeat(Duration::from_secs(config.timing.heartbeat_secs.max(1)), clock.clone());

    let mut engine = RoundEngine::new(
        &config,
        store.clone(),
        Arc::new(hub.clone()),
        clock.clone(),
        metrics.clone(),
    );
    if let Some(seed) = args.seed {
        warn!(seed, "Draws are seeded and therefore predictable");
        engine = engine.with_seed(seed);
    }

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let supervisor = Supervisor::new(Arc::new(engine), config.timing.clone(), metrics.clone()).spawn(shutdown_rx);

    let state = Arc::new(AppState {
        store: store.clone(),
        bets: BetService::new(store.clone(), clock.clone(), config.game.clone(), metrics.clone()),
        ledger: StatsLedger::new(store.clone(), config.jackpot.clone()),
        clock,
        websocket: Arc::new(WebSocketManager::new(hub)),
        metrics,
        history_len: config.game.history_len,
        version: env!("CARGO_PKG_VERSION").to_string(),
    });

    let server = ApiServer::new(config.api.clone(), state);
    let served = server.run(shutdown_signal()).await;

    // The round loop only stops between steps, so a round in flight is resumed
    // from the store on the next start.
    let _ = shutdown_tx.send(true);
    if let Err(e) = supervisor.await {
        warn!(error = %e, "Round supervisor task ended abnormally");
    }
    heartbeat.abort();

    served.map_err(|e| -> Box<dyn std::error::Error> { e })?;
    info!("Keno server stopped");
    Ok(())
}
