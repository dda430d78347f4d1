// crates/clace-server/src/state.rs
// ============================================================================
// Module: Shared Server State
// Description: The `Clone`-able handle every axum extractor reaches for.
// Purpose: Bundle the registry, loaded config, live sync schedulers, and
//          graceful-shutdown signal behind one `Arc`-backed value.
// Dependencies: clace-apply, clace-config, clace-registry
// ============================================================================

use std::sync::Arc;

use clace_apply::CancelToken;
use clace_config::ServerConfig;
use clace_registry::Registry;

use crate::sync_manager::SyncManager;

/// Shared application state for the axum router.
#[derive(Clone)]
pub struct AppState {
    /// The app registry and its router/lock table.
    pub registry: Arc<Registry>,
    /// The loaded, environment-substituted server config.
    pub config: Arc<ServerConfig>,
    /// Handles for every sync entry's running scheduler task.
    pub sync_manager: SyncManager,
    /// Signaled by `POST /_clace/stop` to begin a graceful shutdown.
    pub shutdown: CancelToken,
}

impl AppState {
    /// Bundles a registry and config into one cloneable handle, with a
    /// fresh, empty sync-scheduler registry and shutdown signal.
    #[must_use]
    pub fn new(registry: Arc<Registry>, config: Arc<ServerConfig>) -> Self {
        Self {
            registry,
            config,
            sync_manager: SyncManager::default(),
            shutdown: CancelToken::new(),
        }
    }
}
