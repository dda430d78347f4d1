// crates/clace-registry/src/applock.rs
// ============================================================================
// Module: Per-App Lock Table
// Description: A keyed mutex table so registry transitions against the
//              same app serialize while unrelated apps run in parallel.
// Purpose: Implement the locking order required by spec.md §5.
// Dependencies: clace-core, std::sync
// ============================================================================

//! ## Overview
//! Every app id maps to its own `Mutex<()>`. Callers must acquire the map
//! lock only long enough to clone the per-app `Arc<Mutex<()>>` out, then
//! drop the map lock before blocking on the per-app lock:
//!
//! # Invariants
//! - The map lock is never held while waiting on a per-app lock.
//! - Two transitions against different app ids never block each other.
//! - Entries are never removed: an app id is reused only by
//!   [`clace_core::AppId`] generation, which never repeats, so the table
//!   grows with the number of distinct apps ever seen, not with traffic.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::MutexGuard;

use clace_core::AppId;

/// Keyed mutex table, one entry per app id ever registered.
pub struct AppLockTable {
    entries: Mutex<HashMap<AppId, Arc<Mutex<()>>>>,
}

impl Default for AppLockTable {
    fn default() -> Self {
        Self::new()
    }
}

impl AppLockTable {
    /// Creates an empty table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }

    /// Blocks until the per-app lock for `id` is held, returning a guard
    /// that releases it on drop.
    ///
    /// # Panics
    /// Panics if the map lock or the per-app lock is poisoned by a prior
    /// panicking holder; this mirrors `std::sync::Mutex`'s own contract
    /// and is intentional since a poisoned app lock means that app's
    /// registry state may be inconsistent.
    #[must_use]
    pub fn lock(&self, id: &AppId) -> AppLockGuard {
        let per_app = {
            let mut entries = self.entries.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
            entries
                .entry(id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        AppLockGuard { per_app }
    }

    /// Number of distinct app ids ever locked through this table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    /// Whether no app id has ever been locked through this table.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Held per-app lock. Dropping it releases the lock for that app id only.
#[must_use = "the lock is released when this guard is dropped"]
pub struct AppLockGuard {
    per_app: Arc<Mutex<()>>,
}

impl AppLockGuard {
    /// Blocks on the per-app mutex, returning a scope token for the
    /// duration the caller's critical section should run.
    ///
    /// # Panics
    /// Panics if the per-app lock was poisoned by a prior panicking
    /// holder for this same app id.
    #[must_use]
    pub fn enter(&self) -> MutexGuard<'_, ()> {
        self.per_app
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::AtomicI32;
    use std::sync::atomic::Ordering;
    use std::thread;

    use clace_core::AppId;

    use super::AppLockTable;

    #[test]
    fn same_app_id_serializes() {
        let table = Arc::new(AppLockTable::new());
        let id = AppId::new_prod();
        let counter = Arc::new(AtomicI32::new(0));
        let max_seen = Arc::new(AtomicI32::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let table = table.clone();
                let id = id.clone();
                let counter = counter.clone();
                let max_seen = max_seen.clone();
                thread::spawn(move || {
                    let guard = table.lock(&id);
                    let _scope = guard.enter();
                    let now = counter.fetch_add(1, Ordering::SeqCst) + 1;
                    max_seen.fetch_max(now, Ordering::SeqCst);
                    counter.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn different_app_ids_do_not_share_a_lock() {
        let table = AppLockTable::new();
        let a = AppId::new_prod();
        let b = AppId::new_stage();
        let guard_a = table.lock(&a);
        let _scope_a = guard_a.enter();
        let guard_b = table.lock(&b);
        let _scope_b = guard_b.enter();
        assert_eq!(table.len(), 2);
    }
}
