// crates/clace-registry/src/router.rs
// ============================================================================
// Module: Request Router
// Description: RCU dispatch table mapping (domain, request path) to the
//              app id whose mount owns the longest matching prefix.
// Purpose: Give the HTTP front a lock-free read path (spec.md §4.4, §5).
// Dependencies: clace-core, std::sync
// ============================================================================

//! ## Overview
//! The router never blocks a reader on a writer. [`RouterHandle::snapshot`]
//! clones an `Arc` under a brief read lock and the caller then matches
//! against that immutable table with no further locking; a concurrent
//! [`RouterHandle::replace`] publishes a new table by swapping the `Arc`
//! under a brief write lock. This is the RCU (read-copy-update) pattern:
//! readers never see a torn table and writers never wait on readers.
//!
//! A request's app is the *longest* registered mount path, compared
//! segment-by-segment, whose domain matches exactly; failing that, a
//! mount registered under the configured `system.default_domain`
//! (spec.md §6.4), distinct from the final fallback: a mount registered
//! under the empty (catch-all) domain.

use std::sync::Arc;
use std::sync::RwLock;

use clace_core::AppId;

/// One published mount: an app id reachable at `domain` + `mount_path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteEntry {
    /// Exact domain this mount answers on, or `""` for the catch-all domain.
    pub domain: String,
    /// Mount path, always starting with `/` (root app uses `"/"`).
    pub mount_path: String,
    /// The app id serving requests under this mount.
    pub app_id: AppId,
}

/// An immutable, queryable snapshot of the mount table.
#[derive(Debug, Clone, Default)]
pub struct Router {
    entries: Vec<RouteEntry>,
}

impl Router {
    /// Builds a router from an unordered set of mounts.
    #[must_use]
    pub fn from_entries(mut entries: Vec<RouteEntry>) -> Self {
        entries.sort_by(|a, b| b.mount_path.len().cmp(&a.mount_path.len()));
        Self { entries }
    }

    /// Finds the longest mount matching `(domain, path)`. Tries an exact
    /// domain match first, then `default_domain` (spec.md §6.4
    /// `system.default_domain`, skipped when empty or equal to `domain`),
    /// then finally the empty catch-all domain.
    #[must_use]
    pub fn dispatch(&self, domain: &str, path: &str, default_domain: &str) -> Option<&AppId> {
        let path_segments = split_segments(path);
        let find_in = |bucket: &str| {
            self.entries
                .iter()
                .filter(|e| e.domain == bucket)
                .find(|e| mount_matches(&e.mount_path, &path_segments))
        };
        find_in(domain)
            .or_else(|| {
                if default_domain.is_empty() || default_domain == domain {
                    None
                } else {
                    find_in(default_domain)
                }
            })
            .or_else(|| find_in(""))
            .map(|e| &e.app_id)
    }

    /// All currently published mounts, longest-prefix first.
    #[must_use]
    pub fn entries(&self) -> &[RouteEntry] {
        &self.entries
    }
}

fn split_segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn mount_matches(mount_path: &str, request_segments: &[&str]) -> bool {
    let mount_segments = split_segments(mount_path);
    if mount_segments.len() > request_segments.len() {
        return false;
    }
    mount_segments
        .iter()
        .zip(request_segments.iter())
        .all(|(m, r)| m == r)
}

/// Handle to the live router, swappable without blocking readers.
pub struct RouterHandle {
    current: RwLock<Arc<Router>>,
}

impl Default for RouterHandle {
    fn default() -> Self {
        Self::new(Router::default())
    }
}

impl RouterHandle {
    /// Creates a handle published with `initial`.
    #[must_use]
    pub fn new(initial: Router) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    /// Clones out the currently published snapshot.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking
    /// writer.
    #[must_use]
    pub fn snapshot(&self) -> Arc<Router> {
        Arc::clone(
            &self
                .current
                .read()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// Publishes a new router, atomically replacing the old one.
    ///
    /// # Panics
    /// Panics if the internal lock is poisoned by a prior panicking
    /// writer.
    pub fn replace(&self, next: Router) {
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        *guard = Arc::new(next);
    }
}

#[cfg(test)]
mod tests {
    use clace_core::AppId;

    use super::Router;
    use super::RouteEntry;
    use super::RouterHandle;

    fn entry(domain: &str, mount: &str, id: &AppId) -> RouteEntry {
        RouteEntry {
            domain: domain.to_string(),
            mount_path: mount.to_string(),
            app_id: id.clone(),
        }
    }

    #[test]
    fn longest_mount_wins() {
        let root = AppId::new_prod();
        let nested = AppId::new_prod();
        let router = Router::from_entries(vec![
            entry("", "/", &root),
            entry("", "/api/v1", &nested),
        ]);
        assert_eq!(router.dispatch("", "/api/v1/widgets", ""), Some(&nested));
        assert_eq!(router.dispatch("", "/other", ""), Some(&root));
    }

    #[test]
    fn exact_domain_beats_catch_all() {
        let catch_all = AppId::new_prod();
        let scoped = AppId::new_prod();
        let router = Router::from_entries(vec![
            entry("", "/", &catch_all),
            entry("example.com", "/", &scoped),
        ]);
        assert_eq!(router.dispatch("example.com", "/x", ""), Some(&scoped));
        assert_eq!(router.dispatch("other.com", "/x", ""), Some(&catch_all));
    }

    #[test]
    fn default_domain_is_tried_before_the_catch_all() {
        let catch_all = AppId::new_prod();
        let default_bucket = AppId::new_prod();
        let router = Router::from_entries(vec![
            entry("", "/", &catch_all),
            entry("default.example.com", "/", &default_bucket),
        ]);
        assert_eq!(
            router.dispatch("unknown.example.com", "/x", "default.example.com"),
            Some(&default_bucket)
        );
        assert_eq!(router.dispatch("unknown.example.com", "/x", ""), Some(&catch_all));
    }

    #[test]
    fn handle_replace_is_visible_to_new_snapshots() {
        let handle = RouterHandle::default();
        assert!(handle.snapshot().dispatch("", "/", "").is_none());
        let id = AppId::new_prod();
        handle.replace(Router::from_entries(vec![entry("", "/", &id)]));
        assert_eq!(handle.snapshot().dispatch("", "/anything", ""), Some(&id));
    }
}
