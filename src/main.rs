//! Session gateway.
//!
//! # Architecture Overview
//!
//! ```text
//!     Client Request
//!          │
//!          ▼
//!   ┌─────────────┐   ┌──────────────────┐   ┌──────────────────┐   ┌──────────┐
//!   │ http server │──▶│ access control   │──▶│ admission (rate  │──▶│ handlers │
//!   │ + layers    │   │ (token, session) │   │ limit per route) │   │          │
//!   └─────────────┘   └────────┬─────────┘   └──────────────────┘   └────┬─────┘
//!                              │                                         │
//!                              ▼                                         ▼
//!                     ┌──────────────────┐                      ┌──────────────────┐
//!                     │ session manager  │◀─────────────────────│ register / login │
//!                     │ tokens, secrets  │                      │ refresh / logout │
//!                     └────────┬─────────┘                      └──────────────────┘
//!                              ▼
//!                     ┌──────────────────┐
//!                     │ session store    │  Postgres or in-memory
//!                     └──────────────────┘
//! ```

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::net::TcpListener;

use session_gate::config::{load_config, load_from_env};
use session_gate::lifecycle::signals::spawn_signal_handler;
use session_gate::observability::{init_metrics, init_tracing};
use session_gate::session::postgres::{self, PgSessionStore, PgUserStore};
use session_gate::session::{MemorySessionStore, MemoryUserStore, SessionStore, UserStore};
use session_gate::{AdmissionController, GatewayServer, SessionManager, Shutdown};

#[derive(Debug, Parser)]
#[command(name = "session-gate", version, about = "Session and admission gateway")]
struct Cli {
    /// Path to a TOML configuration file. Defaults plus environment otherwise.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => load_config(path)?,
        None => load_from_env()?,
    };

    init_tracing(&config.observability)?;
    tracing::info!("session-gate v{} starting", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        bind_address = %config.listener.bind_address,
        request_timeout_secs = config.timeouts.request_secs,
        rate_limit_enabled = config.rate_limit.enabled,
        "Configuration loaded"
    );

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => {
                if let Err(e) = init_metrics(addr) {
                    tracing::error!(error = %e, "Failed to start metrics exporter");
                }
            }
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let (session_store, user_store): (Arc<dyn SessionStore>, Arc<dyn UserStore>) =
        match &config.database.url {
            Some(url) => {
                let pool = postgres::connect(&config.database, url).await?;
                postgres::ensure_schema(&pool).await?;
                tracing::info!("Connected to Postgres");
                (
                    Arc::new(PgSessionStore::new(pool.clone())),
                    Arc::new(PgUserStore::new(pool)),
                )
            }
            None => {
                tracing::warn!("No database configured, sessions are kept in memory");
                (
                    Arc::new(MemorySessionStore::new()),
                    Arc::new(MemoryUserStore::new()),
                )
            }
        };

    let sessions = Arc::new(SessionManager::new(
        &config.auth,
        Duration::from_secs(config.timeouts.store_secs),
        session_store,
        user_store,
    )?);
    let admission = Arc::new(AdmissionController::new(&config.rate_limit)?);

    let listener = TcpListener::bind(&config.listener.bind_address).await?;

    let shutdown = Arc::new(Shutdown::new());
    spawn_signal_handler(shutdown.clone());

    let server = GatewayServer::new(config, sessions, admission);
    server.run(listener, &shutdown).await?;

    tracing::info!("Shutdown complete");
    Ok(())
}
