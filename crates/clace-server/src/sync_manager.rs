// crates/clace-server/src/sync_manager.rs
// ============================================================================
// Module: Sync Scheduler Registry
// Description: Tracks the live `clace_apply::SyncScheduler` task spawned for
//              each sync entry, keyed by sync id (spec.md §4.6).
// Purpose: Let the control API's webhook/run routes reach a running
//          scheduler without threading a channel through every handler.
// Dependencies: clace-apply, tokio
// ============================================================================

//! ## Overview
//! [`start_server`](crate) spawns one [`clace_apply::SyncScheduler`] task
//! per sync entry at boot and registers its webhook sender and cancel
//! token here. `POST /_clace/sync/webhook/{id}` and `POST
//! /_clace/sync/run` both just look the id up and push into its
//! channel; neither route owns scheduling logic itself.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::PoisonError;

use clace_apply::ApplyEngine;
use clace_apply::ApplyFile;
use clace_apply::ApplyOptions;
use clace_apply::CancelToken;
use clace_apply::SyncScheduler;
use clace_core::SyncEntry;
use clace_core::SyncMetadata;
use clace_registry::Registry;
use tokio::sync::mpsc;
use tracing::warn;

use crate::state::AppState;

/// A running sync scheduler's externally-reachable handles.
#[derive(Clone)]
pub struct SyncHandle {
    /// Sender side of the scheduler's webhook trigger channel.
    pub webhook_tx: mpsc::Sender<()>,
    /// Cancellation handle for shutting the scheduler down.
    pub cancel: CancelToken,
}

/// Shared, clonable registry of live sync scheduler handles.
#[derive(Clone, Default)]
pub struct SyncManager {
    handles: Arc<Mutex<HashMap<String, SyncHandle>>>,
}

impl SyncManager {
    /// Registers a freshly spawned scheduler's handle, replacing any
    /// prior handle for the same id.
    pub fn register(&self, id: String, handle: SyncHandle) {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).insert(id, handle);
    }

    /// Drops a scheduler's handle, e.g. after its sync entry is deleted.
    pub fn unregister(&self, id: &str) {
        self.handles.lock().unwrap_or_else(PoisonError::into_inner).remove(id);
    }

    /// Cancels `id`'s running scheduler task without removing its handle.
    /// Callers that also want the handle gone should follow with
    /// [`SyncManager::unregister`].
    pub fn cancel(&self, id: &str) {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(handle) = handles.get(id) {
            handle.cancel.cancel();
        }
    }

    /// Requests an immediate run for `id`'s scheduler.
    ///
    /// Returns `false` if no scheduler is registered for `id`, or if its
    /// webhook channel is full (a run is already queued).
    pub fn trigger(&self, id: &str) -> bool {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        handles.get(id).is_some_and(|handle| handle.webhook_tx.try_send(()).is_ok())
    }

    /// Cancels and drops every registered scheduler, used on graceful
    /// shutdown.
    pub fn cancel_all(&self) {
        let handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);
        for handle in handles.values() {
            handle.cancel.cancel();
        }
    }
}

/// Spawns a background `tokio` task running `entry`'s sync schedule and
/// registers its handle in `state.sync_manager` (spec.md §4.6).
pub fn spawn(state: &AppState, entry: SyncEntry) {
    let (webhook_tx, webhook_rx) = mpsc::channel(8);
    let cancel = CancelToken::new();
    state.sync_manager.register(
        entry.id.clone(),
        SyncHandle {
            webhook_tx,
            cancel: cancel.clone(),
        },
    );

    let scheduler = SyncScheduler::new(
        entry.id.clone(),
        state.registry.store_handle(),
        entry.metadata.schedule_frequency_min,
        webhook_rx,
        cancel,
        state.config.system.max_sync_failure_count,
    );
    let registry = Arc::clone(&state.registry);
    let sync_path = entry.path;
    let sync_metadata = entry.metadata;
    tokio::spawn(scheduler.run(move |_trigger| {
        let registry = Arc::clone(&registry);
        let sync_path = sync_path.clone();
        let sync_metadata = sync_metadata.clone();
        async move { run_apply_file(&registry, &sync_path, &sync_metadata) }
    }));
}

/// Spawns a scheduler for every sync entry already recorded in the
/// store, at server boot.
pub fn spawn_all(state: &AppState) {
    match state.registry.store().list_syncs() {
        Ok(entries) => {
            for entry in entries {
                spawn(state, entry);
            }
        }
        Err(err) => warn!(error = %err, "failed to list sync entries at startup"),
    }
}

/// Reads `path` as a local apply-file TOML and runs it against
/// `registry`. A sync entry's `path` naming a remote git location is not
/// yet supported; this surfaces as a failed run rather than a panic.
fn run_apply_file(registry: &Registry, path: &str, metadata: &SyncMetadata) -> Result<(), String> {
    let apply_toml = std::fs::read_to_string(path).map_err(|err| err.to_string())?;
    let file = ApplyFile::parse(&apply_toml).map_err(|err| err.to_string())?;
    let options = ApplyOptions {
        dry_run: false,
        clobber: metadata.clobber,
        approve: metadata.approve,
        promote: metadata.promote,
        reload: metadata.reload,
        app_path_glob: "all".to_string(),
    };
    ApplyEngine::new(registry)
        .apply(path, &file, &options)
        .map(|_| ())
        .map_err(|err| err.to_string())
}
