pub mod cache;
pub mod clock;
pub mod completion;
pub mod config;
pub mod db;
pub mod errors;
pub mod models;
pub mod scheduler;
pub mod store;

pub use crate::clock::{Clock, ManualClock, SystemClock};
pub use crate::config::StoreConfig;
pub use crate::db::{RecordStore, SqliteRecordStore};
pub use crate::errors::{AppError, AppResult};
pub use crate::models::{CreateEvent, Event, Priority, StoreSnapshot, StoreState, UpdateEvent};
pub use crate::store::EventStore;

use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;

static LOG_GUARD: std::sync::OnceLock<WorkerGuard> = std::sync::OnceLock::new();

/// Installs a JSON subscriber writing to a daily-rolling file under
/// `log_dir`. `RUST_LOG` takes precedence over `default_filter`.
pub fn init_tracing(log_dir: &Path, default_filter: &str) -> AppResult<()> {
    std::fs::create_dir_all(log_dir)?;
    let file_appender = tracing_appender::rolling::daily(log_dir, "events.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
    let _ = LOG_GUARD.set(guard);

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_filter)),
        )
        .json()
        .with_writer(non_blocking)
        .try_init()
        .map_err(|error| AppError::Internal(error.to_string()))
}

/// Builds the SQLite-backed store described by `config`, installs logging
/// under `log_dir`, and initializes the store.
pub async fn bootstrap(config: &StoreConfig, log_dir: &Path) -> AppResult<std::sync::Arc<EventStore>> {
    if let Err(error) = init_tracing(log_dir, &config.log_filter) {
        tracing::warn!(error = %error, "keeping the already installed tracing subscriber");
    }
    let store = EventStore::open(config);
    store.initialize().await?;
    Ok(store)
}
