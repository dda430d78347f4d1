// crates/clace-registry/src/lib.rs
// ============================================================================
// Module: Clace App Registry
// Description: App lifecycle state machine, per-app keyed locking, and the
//              RCU request router (spec.md §4.3, §4.4, §5).
// Purpose: Own every transition between app states and publish the
//          lock-free snapshot the HTTP front dispatches requests against.
// Dependencies: clace-core, clace-audit, clace-store-sqlite, git2, sha2,
//               data-encoding, tempfile, thiserror, tracing
// ============================================================================

//! ## Overview
//! Three pieces live here, each grounded in a distinct correctness
//! property:
//! - [`applock`] serializes transitions against the *same* app id while
//!   letting unrelated apps proceed concurrently (spec.md §5 lock
//!   ordering: map lock, then per-app lock, never the reverse).
//! - [`registry`] is the state machine: every create/delete/promote/
//!   switch-version/preview/account/param transition goes through
//!   [`registry::Registry`], which holds the relevant app lock for the
//!   duration of the store transaction.
//! - [`router`] is the read path: an RCU table swapped under a short write
//!   lock so request dispatch never blocks on a registry transition.
//! - [`source`] refreshes an app's file tree from disk or git for
//!   [`registry::Registry::reload`] and apply-engine reloads.

pub mod applock;
pub mod registry;
pub mod router;
pub mod source;

pub use applock::AppLockTable;
pub use applock::AppLockGuard;
pub use registry::Registry;
pub use registry::RegistryError;
pub use router::RouteEntry;
pub use router::Router;
pub use router::RouterHandle;
pub use source::ResolvedSource;
pub use source::SourceError;
