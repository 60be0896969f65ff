//! datamap-server - DataMap administrative backend
//!
//! Registers one source-system connection, versions data dictionaries
//! (optionally synced from a central Universal Dictionary service), maps
//! source columns to dictionary terms, generates extraction SQL, runs
//! batched extract/load into the canonical Postgres staging schema, runs
//! DQA checks against dictionary contracts, and transmits canonical tables
//! downstream in paginated batches with SSE progress reporting.

use anyhow::Result;
use clap::Parser;
use datamap_common::config::Settings;
use datamap_common::events::EventBus;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

use datamap_server::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "datamap-server", version, about = "DataMap administrative backend")]
struct Args {
    /// Bind address override (otherwise from env/config file)
    #[arg(long)]
    bind: Option<String>,

    /// Metadata store URL override
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    let subscriber = FmtSubscriber::builder()
        .with_max_level(Level::INFO)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;

    info!("Starting datamap-server");
    info!("Version: {}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let mut settings = Settings::load()?;
    if let Some(bind) = args.bind {
        settings.bind_addr = bind;
    }
    if let Some(url) = args.database_url {
        settings.database_url = url;
    }

    // Metadata store + fixed tables
    let db_pool = datamap_common::db::init_database_pool(&settings.database_url).await?;
    info!("Metadata store connection established");

    // Reconcile canonical tables against the current local dictionaries.
    // Runs again after every dictionary sync; at startup it heals drift
    // left by edits while the service was down.
    if let Err(e) = datamap_server::services::provision_canonical_tables(&db_pool).await {
        warn!(error = %e, "Canonical table reconciliation failed at startup");
    }

    // sqlx Any driver registration for live source connections
    sqlx::any::install_default_drivers();

    let event_bus = EventBus::new(100);
    let bind_addr = settings.bind_addr.clone();
    let state = AppState::new(db_pool, settings, event_bus);

    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    info!("Listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(listener, app).await?;

    Ok(())
}
