// crates/clace-apply/src/lib.rs
// ============================================================================
// Module: Clace Apply Engine + Sync Scheduler
// Description: Declarative reconciliation of app definitions (spec.md
//              §4.5) and the scheduled/webhook sync job runner (§4.6).
// Purpose: Converge a declared set of apps onto the registry's state with
//          create/update/skip semantics, and run that convergence on a
//          schedule or in response to webhooks.
// Dependencies: clace-core, clace-registry, clace-store-sqlite, toml,
//               tokio, thiserror, tracing
// ============================================================================

//! ## Overview
//! [`engine`] is pure with respect to the filesystem: it takes an already
//! parsed [`engine::ApplyFile`] and a [`clace_registry::Registry`] and
//! decides, per declared app, whether to create, update, or skip it. Dry
//! runs walk the exact same decision path but stop short of calling any
//! registry mutator — see `engine::ApplyEngine::apply` for why that is a
//! simpler reading of "no committed changes" than a rollback-only
//! transaction.
//!
//! [`scheduler`] is the only place in the workspace that owns a
//! `tokio::time::interval`; it re-runs an apply file on its configured
//! cadence or on an explicit webhook trigger, and disables an entry after
//! too many consecutive failures (spec.md §4.6).

pub mod baseline;
pub mod engine;
pub mod scheduler;

pub use engine::ApplyDecision;
pub use engine::ApplyEngine;
pub use engine::ApplyError;
pub use engine::ApplyFile;
pub use engine::ApplyOptions;
pub use engine::ApplyOutcome;
pub use engine::ApplyResponse;
pub use engine::DeclaredApp;
pub use scheduler::CancelToken;
pub use scheduler::SyncScheduler;
pub use scheduler::SyncTrigger;
