// crates/clace-apply/src/scheduler.rs
// ============================================================================
// Module: Sync Scheduler
// Description: Runs a sync entry's apply file on its configured cadence
//              or in response to a webhook, disabling it after too many
//              consecutive failures (spec.md §4.6).
// Purpose: Turn a `SyncEntry` into a live, cancellable background task.
// Dependencies: clace-core, clace-store-sqlite, tokio, tracing
// ============================================================================

//! ## Overview
//! One [`SyncScheduler`] owns one sync entry's lifecycle: it sleeps until
//! the next scheduled tick or an incoming [`SyncTrigger::Webhook`],
//! whichever comes first, runs the apply, and records the outcome via
//! [`clace_store_sqlite::MetadataStore::update_sync_status`]. After
//! `max_consecutive_failures` failures in a row it flips the entry's
//! state to `Disabled` and stops scheduling further runs, per spec.md
//! §4.6; an operator re-enables it explicitly.

use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;
use std::time::Duration;

use clace_core::SyncState;
use clace_core::SyncStatus;
use clace_core::Timestamp;
use clace_store_sqlite::MetadataStore;
use tokio::sync::Notify;
use tokio::sync::mpsc;
use tracing::info;
use tracing::warn;

/// Cooperative cancellation handle shared between a scheduler and
/// whatever spawned it.
#[derive(Clone)]
pub struct CancelToken {
    cancelled: Arc<AtomicBool>,
    notify: Arc<Notify>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    /// Creates a token in the not-cancelled state.
    #[must_use]
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            notify: Arc::new(Notify::new()),
        }
    }

    /// Requests cancellation and wakes anything waiting on
    /// [`CancelToken::cancelled`].
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
        self.notify.notify_waiters();
    }

    /// Whether cancellation has been requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Resolves once [`CancelToken::cancel`] has been called.
    pub async fn cancelled(&self) {
        if self.is_cancelled() {
            return;
        }
        self.notify.notified().await;
    }
}

/// What woke the scheduler up for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncTrigger {
    /// The configured schedule frequency elapsed.
    Scheduled,
    /// An external webhook call requested an immediate run.
    Webhook,
}

/// One sync entry's running apply loop.
pub struct SyncScheduler {
    sync_id: String,
    store: Arc<MetadataStore>,
    frequency: Duration,
    webhook_rx: mpsc::Receiver<()>,
    cancel: CancelToken,
    max_consecutive_failures: u32,
}

impl SyncScheduler {
    /// Builds a scheduler for `sync_id`, ticking every
    /// `schedule_frequency_min` minutes (a zero frequency disables
    /// scheduled ticks; only webhooks trigger a run). Auto-disables the
    /// entry after `max_consecutive_failures` failed runs in a row
    /// (spec.md §6.4 `system.max_sync_failure_count`).
    #[must_use]
    pub fn new(
        sync_id: String,
        store: Arc<MetadataStore>,
        schedule_frequency_min: u32,
        webhook_rx: mpsc::Receiver<()>,
        cancel: CancelToken,
        max_consecutive_failures: u32,
    ) -> Self {
        Self {
            sync_id,
            store,
            frequency: Duration::from_secs(u64::from(schedule_frequency_min) * 60),
            webhook_rx,
            cancel,
            max_consecutive_failures,
        }
    }

    /// Runs the scheduling loop until cancelled, invoking `run_apply` for
    /// every trigger. `run_apply` returning `Err` counts as a failed run;
    /// `Ok(())` resets the consecutive-failure counter.
    pub async fn run<F, Fut>(mut self, mut run_apply: F)
    where
        F: FnMut(SyncTrigger) -> Fut,
        Fut: std::future::Future<Output = Result<(), String>>,
    {
        loop {
            let trigger = if self.frequency.is_zero() {
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    received = self.webhook_rx.recv() => {
                        if received.is_none() {
                            return;
                        }
                        SyncTrigger::Webhook
                    }
                }
            } else {
                tokio::select! {
                    () = self.cancel.cancelled() => return,
                    () = tokio::time::sleep(self.frequency) => SyncTrigger::Scheduled,
                    received = self.webhook_rx.recv() => {
                        if received.is_none() {
                            return;
                        }
                        SyncTrigger::Webhook
                    }
                }
            };

            let status = match self.store.get_sync(&self.sync_id) {
                Ok(entry) => entry.status,
                Err(err) => {
                    warn!(sync_id = %self.sync_id, error = %err, "sync entry vanished, stopping scheduler");
                    return;
                }
            };
            if status.state == SyncState::Disabled {
                info!(sync_id = %self.sync_id, "sync entry disabled, skipping run");
                continue;
            }

            let result = run_apply(trigger).await;
            self.record_result(status, result);
        }
    }

    fn record_result(&self, previous: SyncStatus, result: Result<(), String>) {
        let mut status = previous;
        status.last_run_at = Some(Timestamp::now());
        match result {
            Ok(()) => {
                status.state = SyncState::Idle;
                status.error = None;
                status.failure_count = 0;
            }
            Err(err) => {
                status.failure_count += 1;
                status.error = Some(err);
                status.state = if status.failure_count >= self.max_consecutive_failures {
                    warn!(sync_id = %self.sync_id, "disabling sync after repeated failures");
                    SyncState::Disabled
                } else {
                    SyncState::Idle
                };
            }
        }
        if let Err(err) = self.store.update_sync_status(&self.sync_id, &status) {
            warn!(sync_id = %self.sync_id, error = %err, "failed to persist sync status");
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use clace_core::Metadata;
    use clace_core::SyncEntry;
    use clace_core::SyncMetadata;
    use clace_core::SyncStatus;
    use clace_core::ReloadPolicy;
    use clace_store_sqlite::MetadataStore;
    use tokio::sync::mpsc;

    use super::CancelToken;
    use super::SyncScheduler;

    fn entry(id: &str) -> SyncEntry {
        let _ = Metadata::initial("", ""); // keep import path stable for future richer fixtures
        SyncEntry {
            id: id.to_string(),
            path: "apps.toml".to_string(),
            metadata: SyncMetadata {
                git_branch: None,
                git_auth: None,
                approve: false,
                reload: ReloadPolicy::None,
                promote: false,
                clobber: false,
                force_reload: false,
                schedule_frequency_min: 0,
                webhook_url: None,
            },
            status: SyncStatus::default(),
        }
    }

    #[tokio::test]
    async fn webhook_trigger_runs_once_then_cancels() {
        let store = Arc::new(MetadataStore::open_in_memory().unwrap());
        store.create_sync(&entry("s1")).unwrap();
        let (tx, rx) = mpsc::channel(4);
        let cancel = CancelToken::new();
        let scheduler = SyncScheduler::new("s1".to_string(), store.clone(), 0, rx, cancel.clone(), 5);

        let runs = Arc::new(AtomicUsize::new(0));
        let runs_clone = runs.clone();
        let cancel_clone = cancel.clone();
        let handle = tokio::spawn(async move {
            scheduler
                .run(|_trigger| {
                    runs_clone.fetch_add(1, Ordering::SeqCst);
                    cancel_clone.cancel();
                    async { Ok(()) }
                })
                .await;
        });

        tx.send(()).await.unwrap();
        handle.await.unwrap();
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        let status = store.get_sync("s1").unwrap().status;
        assert_eq!(status.failure_count, 0);
    }

    #[tokio::test]
    async fn repeated_failures_disable_the_entry() {
        let store = Arc::new(MetadataStore::open_in_memory().unwrap());
        store.create_sync(&entry("s2")).unwrap();
        let (tx, rx) = mpsc::channel(16);
        let cancel = CancelToken::new();
        let scheduler = SyncScheduler::new("s2".to_string(), store.clone(), 0, rx, cancel.clone(), 5);

        for _ in 0..6 {
            tx.send(()).await.unwrap();
        }
        drop(tx);

        scheduler.run(|_trigger| async { Err("boom".to_string()) }).await;

        let status = store.get_sync("s2").unwrap().status;
        assert_eq!(status.state, clace_core::SyncState::Disabled);
        assert!(status.failure_count >= 5);
    }
}
