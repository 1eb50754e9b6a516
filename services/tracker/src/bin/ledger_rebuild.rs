//! services/tracker/src/bin/ledger_rebuild.rs
//!
//! Rebuilds the time-charge ledger of every timesheet (or of one user's
//! timesheets) from the recorded time blocks.

use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use timecharge_core::{Engine, Reconciliation, RecordStore};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use tracker_lib::{adapters::DbAdapter, config::Config, error::ServiceError, events::log_updates};

#[tokio::main]
async fn main() -> Result<(), ServiceError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer())
        .init();
    info!("Configuration loaded. Starting ledger rebuild...");

    // --- 2. Connect to Database & Run Migrations ---
    info!("Connecting to database...");
    let db_pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .connect(&config.database_url)
        .await?;
    let db_adapter = Arc::new(DbAdapter::new(db_pool));
    info!("Running database migrations...");
    db_adapter.run_migrations().await?;
    info!("Database migrations complete.");

    // --- 3. Build the Engine & Listen for Updates ---
    let engine = Engine::new(db_adapter.clone(), config.engine_config());
    let shutdown = CancellationToken::new();
    let listener = tokio::spawn(log_updates(engine.subscribe(), shutdown.clone()));

    // --- 4. Rebuild ---
    let timesheets = db_adapter.list_timesheets(config.rebuild_user_id).await?;
    info!(count = timesheets.len(), "Rebuilding timesheets");

    let mut rebuilt = 0usize;
    let mut failed = 0usize;
    for timesheet in &timesheets {
        match engine.resync_timesheet(timesheet.id).await {
            Ok(Reconciliation::Applied { .. }) => rebuilt += 1,
            Ok(Reconciliation::Skipped(reason)) => {
                warn!(timesheet_id = %timesheet.id, ?reason, "Timesheet skipped");
            }
            Err(e) => {
                failed += 1;
                error!(timesheet_id = %timesheet.id, "Rebuild failed: {}", e);
            }
        }
    }

    shutdown.cancel();
    match listener.await {
        Ok(logged) => info!(logged, "Update listener drained"),
        Err(e) => warn!("Update listener ended abnormally: {}", e),
    }

    info!(rebuilt, failed, "Ledger rebuild finished");
    if failed > 0 {
        return Err(ServiceError::Internal(format!(
            "{} timesheet(s) could not be rebuilt",
            failed
        )));
    }
    Ok(())
}
