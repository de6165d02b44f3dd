//! Stockroom Server
//!
//! HTTP front end for the stockroom inventory store.
//!
//! ## Features
//!
//! - **Accounts**: email/password signup and bearer-token sessions
//! - **Inventory API**: practices, locations, items, kits, shopping lists,
//!   transfers and movement history, each scoped to the signed-in user
//! - **Barcode lookup**: stocked items first, then external product databases

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use stockroom::{Config, Inventory};
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use stockroom_server::{api, db::Database, AppState};

/// How often expired sessions are swept
const SESSION_PURGE_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Stockroom Server - inventory API for dental practices
#[derive(Parser, Debug)]
#[command(name = "stockroom-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Data directory for persistence
    #[arg(long, default_value = "/data", env = "STOCKROOM_DATA_DIR")]
    data_dir: PathBuf,

    /// HTTP API port
    #[arg(long, default_value = "8080", env = "STOCKROOM_API_PORT")]
    api_port: u16,

    /// Log level
    #[arg(long, default_value = "info", env = "STOCKROOM_LOG_LEVEL")]
    log_level: Level,

    /// Inventory config file (defaults to {data_dir}/config.toml if present)
    #[arg(long, env = "STOCKROOM_CONFIG")]
    config: Option<PathBuf>,

    /// Hours a session may sit idle before it expires
    #[arg(long, default_value = "720", env = "STOCKROOM_SESSION_TTL_HOURS")]
    session_ttl_hours: u32,

    /// Disable external barcode lookups
    #[arg(long)]
    offline: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let subscriber = FmtSubscriber::builder()
        .with_max_level(args.log_level)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to set tracing subscriber")?;

    info!("Starting Stockroom Server");
    info!(data_dir = %args.data_dir.display(), "Data directory");
    info!(api_port = args.api_port, "HTTP API port");

    tokio::fs::create_dir_all(&args.data_dir)
        .await
        .context("Failed to create data directory")?;

    // Inventory configuration: explicit file, else {data_dir}/config.toml
    let mut config = match &args.config {
        Some(path) => {
            let mut config = Config::load(path).context("Failed to load config file")?;
            config.storage_path.clone_from(&args.data_dir);
            config
        }
        None => Config::new(&args.data_dir)
            .merge_file()
            .context("Failed to load config file")?,
    };
    if args.offline {
        config = config.with_barcode_lookup(false);
    }
    info!(
        barcode_lookup = config.barcode_lookup_enabled,
        "Barcode lookup"
    );

    // Initialize database
    let session_ttl = chrono::Duration::hours(i64::from(args.session_ttl_hours));
    let db_path = args.data_dir.join("accounts.db");
    let db = Arc::new(Database::open(&db_path).context("Failed to open database")?);
    info!(path = %db_path.display(), "Database initialized");

    // First tick runs immediately, so startup also sweeps
    tokio::spawn(purge_sessions_periodically(Arc::clone(&db), session_ttl));

    let inventory = Inventory::open(config)
        .await
        .context("Failed to open inventory")?;
    info!("Inventory store opened");

    let state = Arc::new(AppState {
        db,
        inventory,
        session_ttl,
    });

    // Start HTTP API server
    let api_addr: SocketAddr = ([0, 0, 0, 0], args.api_port).into();
    let app = api::router(state);

    info!(addr = %api_addr, "Starting HTTP API server");

    let listener = tokio::net::TcpListener::bind(api_addr)
        .await
        .context("Failed to bind API server")?;

    // Run with graceful shutdown on ctrl-c
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("API server error")?;

    info!("Stockroom Server shutting down");
    Ok(())
}

/// Delete sessions idle for longer than `ttl`, once per interval
async fn purge_sessions_periodically(db: Arc<Database>, ttl: chrono::Duration) {
    let mut interval = tokio::time::interval(SESSION_PURGE_INTERVAL);
    loop {
        interval.tick().await;
        match db.purge_expired_sessions(ttl) {
            Ok(0) => {}
            Ok(purged) => info!(purged, "Removed expired sessions"),
            Err(e) => warn!("Failed to purge expired sessions: {e:#}"),
        }
    }
}

/// Wait for a ctrl-c signal for graceful shutdown
async fn shutdown_signal() {
    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("Received ctrl-c, initiating graceful shutdown"),
        Err(e) => warn!(error = %e, "Failed to listen for ctrl-c, shutting down"),
    }
}
