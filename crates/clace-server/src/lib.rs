// crates/clace-server/src/lib.rs
// ============================================================================
// Module: Clace HTTP Front + Control API
// Description: axum listener dispatching app traffic through the registry
//              router and serving the `/_clace/*` control API (spec.md
//              §6.1, §4.4).
// Purpose: Translate HTTP requests into registry/apply-engine calls and
//          map their results back onto the wire per spec.md §7.
// Dependencies: axum, axum-server, bcrypt, clace-core, clace-registry,
//               clace-apply, clace-config, clace-store-sqlite, tokio,
//               tracing, tracing-subscriber
// ============================================================================

//! ## Overview
//! [`state::AppState`] is the one value every handler closes over: the
//! registry, the apply engine's shared pieces, and the loaded config.
//! [`app::build_router`] wires two disjoint route trees onto it: app
//! traffic (anything not under `/_clace/`) resolved through
//! [`dispatch`], and the control API under `/_clace/` implemented in
//! [`control`]. [`auth`] gates every control-API route behind HTTP Basic
//! Auth against the configured bcrypt admin password hash; app traffic
//! auth is a `Settings.auth_type` concern the dispatch layer reads per
//! request but does not itself enforce here (spec.md's scripting/plugin
//! runtime, where per-app auth actually executes, is out of scope).
//!
//! Security posture: `/_clace/*` always requires Basic Auth once
//! `security.admin_password_hash` is set; an empty hash is a deliberate
//! opt-out only ever appropriate for local development, and
//! [`auth::require_admin`] logs a warning every time it runs unguarded.

/// Router assembly: wires app traffic and the control API onto shared state.
pub mod app;
pub mod auth;
/// Startup wiring: loads config, opens the store, and builds [`state::AppState`].
pub mod bootstrap;
/// The `/_clace/*` control API handlers.
pub mod control;
/// Resolves app traffic through the registry router.
pub mod dispatch;
/// Shared error-to-response mapping for control API handlers.
pub mod error_response;
/// `tracing_subscriber` bootstrap from [`clace_config::LoggingConfig`].
pub mod logging;
/// The shared [`state::AppState`] every handler closes over.
pub mod state;
pub mod sync_manager;

pub use app::build_router;
pub use error_response::ErrorBody;
pub use state::AppState;
pub use sync_manager::SyncHandle;
pub use sync_manager::SyncManager;
