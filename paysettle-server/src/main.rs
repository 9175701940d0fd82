//! paysettle server
//!
//! Hosted-gateway settlement for a marketplace storefront: records orders,
//! signs the gateway redirect and reconciles Instant Transaction
//! Notifications against the order ledger.

mod api;
mod config;
mod server;
mod shutdown;
mod state;

use clap::{Parser, ValueEnum};
use config::{ConfigLoader, get_database_url};
use paysettle_core::ledger::{MemoryLedger, OrderLedger, PgOrderLedger};
use server::{build_router, run_server};
use sqlx::PgPool;
use sqlx::postgres::PgPoolOptions;
use state::AppState;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Debug, Clone, Copy, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

/// paysettle - hosted payment gateway settlement server
#[derive(Parser, Debug)]
#[command(name = "paysettle-server")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to the configuration file
    #[arg(short, long, default_value = "./paysettle-config.toml")]
    config: PathBuf,

    /// Override the listen address (e.g., 0.0.0.0:3000)
    #[arg(short, long)]
    listen: Option<SocketAddr>,

    /// Run database migrations on startup
    #[arg(long, default_value = "false")]
    migrate: bool,

    /// Keep orders in memory instead of PostgreSQL (sandbox testing only)
    #[arg(long, default_value = "false", conflicts_with = "migrate")]
    ephemeral: bool,

    /// Log output format
    #[arg(long, value_enum, default_value = "pretty", env = "PAYSETTLE_LOG_FORMAT")]
    log_format: LogFormat,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    init_tracing(args.log_format);

    tracing::info!("Starting paysettle-server v{}", env!("CARGO_PKG_VERSION"));

    // Load configuration
    let config_loader = ConfigLoader::new(&args.config, args.listen);
    let loaded_config = config_loader.load().map_err(|e| {
        tracing::error!("Failed to load configuration: {}", e);
        e
    })?;
    let listen_addr = loaded_config.server.listen;
    tracing::info!(
        merchant = ?loaded_config.settlement.merchant,
        "Configuration loaded from {:?}",
        args.config
    );

    let (ledger, db_pool): (Arc<dyn OrderLedger>, Option<PgPool>) = if args.ephemeral {
        tracing::warn!("Running with an in-memory ledger; orders are lost on exit");
        let ledger: Arc<dyn OrderLedger> = Arc::new(MemoryLedger::new(
            loaded_config.settlement.merchant.reference_prefix.clone(),
        ));
        (ledger, None)
    } else {
        let database_url = get_database_url().map_err(|e| {
            tracing::error!("DATABASE_URL environment variable not set");
            e
        })?;

        tracing::info!("Connecting to database...");
        let db_pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(&database_url)
            .await
            .map_err(|e| {
                tracing::error!("Failed to connect to database: {}", e);
                e
            })?;
        tracing::info!("Database connection established");

        if args.migrate {
            tracing::info!("Running database migrations...");
            sqlx::migrate!("../migrations")
                .run(&db_pool)
                .await
                .map_err(|e| {
                    tracing::error!("Failed to run migrations: {}", e);
                    e
                })?;
            tracing::info!("Migrations completed successfully");
        }

        let ledger: Arc<dyn OrderLedger> = Arc::new(PgOrderLedger::new(
            db_pool.clone(),
            loaded_config.settlement.merchant.reference_prefix.clone(),
        ));
        (ledger, Some(db_pool))
    };

    let state = AppState::new(ledger, loaded_config.settlement, loaded_config.server);
    let router = build_router(state);

    tracing::info!("Starting HTTP server on {}", listen_addr);
    let result = run_server(router, listen_addr).await;

    if let Some(db_pool) = db_pool {
        tracing::info!("Closing database connections...");
        db_pool.close().await;
    }
    tracing::info!("Server shutdown complete");

    result.map_err(Into::into)
}

/// Initialize the tracing subscriber with environment-based filtering.
fn init_tracing(format: LogFormat) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,sqlx=warn"));

    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry.with(tracing_subscriber::fmt::layer()).init(),
        LogFormat::Json => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}
