pub mod answers;
pub mod bank;
pub mod config;
pub mod error;
pub mod handlers;
pub mod keys;
pub mod models;
pub mod parser;
pub mod persistence;
pub mod routes;
pub mod session;
pub mod state;
pub mod view;
pub mod ws_protocol;

use std::sync::Arc;

use config::Config;
use persistence::{JsonFileStore, MemoryStore, SnapshotStore};

/// Builds the shared state, picking the snapshot store from `config`.
/// Must be called from within a tokio runtime.
pub fn build_state(config: &Config) -> anyhow::Result<state::AppState> {
    anyhow::ensure!(!config.tick_interval.is_zero(), "tick interval must be non-zero");
    let store: Arc<dyn SnapshotStore> = match &config.state_path {
        Some(path) => {
            tracing::info!("snapshots stored at {}", path.display());
            Arc::new(JsonFileStore::new(path.clone()))
        }
        None => {
            tracing::info!("no state path configured, snapshots kept in memory");
            Arc::new(MemoryStore::new())
        }
    };
    Ok(state::AppState::new(config, store))
}
