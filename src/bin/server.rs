// Process Tracker - HTTP server
// Run with: cargo run --bin server

//! # Process Tracker Server Binary
//!
//! Loads configuration, picks a storage backend, bootstraps the department
//! chain and the administrator account, then serves the REST API.
//!
//! ```text
//! AppConfig::load()
//!   ↓ database.url set?
//! PostgresStorage (migrated)  |  InMemoryStorage
//!   ↓
//! WorkflowEngine
//!   ↓
//! ApiServer (axum)
//! ```

use std::sync::Arc;

use anyhow::{anyhow, Result};
use process_tracker::config::AppConfig;
use process_tracker::{ApiServerBuilder, InMemoryStorage, PostgresStorage, ProcessStorage, WorkflowEngine};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let config = AppConfig::load()?;

    // RUST_LOG wins over the configured level
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Process Tracker server");

    let storage: Arc<dyn ProcessStorage> = match &config.database.url {
        Some(url) => {
            let postgres = PostgresStorage::connect(url, config.database.max_connections).await?;
            postgres.migrate().await?;
            info!(max_connections = config.database.max_connections, "using PostgreSQL storage");
            Arc::new(postgres)
        }
        None => {
            warn!("no database url configured, data lives in memory only");
            Arc::new(InMemoryStorage::new())
        }
    };

    let engine = WorkflowEngine::new(storage, config.engine_config());

    if config.bootstrap.seed_departments && engine.seed_default_departments().await? {
        info!("department chain seeded with defaults");
    }

    match &config.bootstrap.admin_email {
        Some(email) => {
            let admin = engine.ensure_admin(email, &config.bootstrap.admin_name).await?;
            info!(admin = %admin.id, "administrator ready");
        }
        None => warn!("no bootstrap admin configured; set PROCESS_TRACKER__BOOTSTRAP__ADMIN_EMAIL"),
    }

    ApiServerBuilder::new(Arc::new(engine))
        .with_config((&config).into())
        .build()
        .run()
        .await
        .map_err(|e| anyhow!(e))?;

    Ok(())
}
