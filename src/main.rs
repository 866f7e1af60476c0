//! MealPay - campus dining wallet service
//!
//! ```text
//! ┌──────────┐    ┌────────────┐    ┌──────────────┐    ┌──────────┐
//! │  Config  │───▶│  Gateway   │───▶│ Orchestrator │───▶│  Store   │
//! │  (YAML)  │    │  (axum)    │    │ Token+Ledger │    │ (PG/mem) │
//! └──────────┘    └────────────┘    └──────────────┘    └──────────┘
//! ```

use std::sync::Arc;

use anyhow::Context;
use mealpay::clock::{Clock, SystemClock};
use mealpay::config::AppConfig;
use mealpay::db::Database;
use mealpay::gateway::{self, AppState};
use mealpay::logging::init_logging;
use mealpay::store::{MemoryStore, PgStore, Storage, schema::init_schema};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

/// Get port override from command line (--port argument)
fn get_port_override() -> Option<u16> {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if args[i] == "--port" && i + 1 < args.len() {
            return args[i + 1].parse().ok();
        }
    }
    None
}

async fn open_store(config: &AppConfig) -> anyhow::Result<Arc<dyn Storage>> {
    match &config.postgres_url {
        Some(url) => {
            let db = Database::connect_with(url, &config.database)
                .await
                .context("Failed to connect to PostgreSQL")?;
            db.health_check().await.context("PostgreSQL health check failed")?;
            init_schema(db.pool()).await?;
            tracing::info!("Using PostgreSQL store");
            Ok(Arc::new(PgStore::new(db.into_pool())))
        }
        None => {
            tracing::warn!("No postgres_url configured; using in-process store (data is not persisted)");
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let mut app_config = AppConfig::load(&env)?;
    if let Some(port) = get_port_override() {
        app_config.gateway.port = port;
    }
    let _log_guard = init_logging(&app_config);

    tracing::info!(
        build = env!("MEALPAY_BUILD"),
        env = %env,
        "Starting MealPay"
    );

    let store = open_store(&app_config).await?;
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let state = AppState::new(
        store,
        clock,
        &app_config.token.secret,
        app_config.token.ttl_seconds,
        &app_config.wallet.currency,
    )
    .context("Failed to initialise token codec")?;

    gateway::run_server(&app_config.gateway, state).await
}
