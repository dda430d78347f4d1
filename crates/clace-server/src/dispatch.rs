// crates/clace-server/src/dispatch.rs
// ============================================================================
// Module: App Traffic Dispatch
// Description: Resolves a request's `(domain, path)` through the registry
//              router and reports which app would serve it.
// Purpose: Exercise the RCU router's read path (spec.md §4.4); running the
//          resolved app's handler is the scripting/plugin runtime, which
//          is explicitly out of scope here (spec.md §1).
// Dependencies: axum, clace-core, clace-registry
// ============================================================================

use axum::extract::State;
use axum_extra::extract::Host;
use axum::http::StatusCode;
use axum::http::Uri;
use axum::response::IntoResponse;
use axum::response::Response;
use serde::Serialize;

use crate::state::AppState;

/// Reported match for a dispatched request (no handler actually runs).
#[derive(Debug, Serialize)]
struct DispatchResult {
    /// The app id the router resolved this request to.
    app_id: String,
}

/// Resolves `(host, path)` against the live router snapshot.
///
/// Returns `404` when no mount matches; returns a small JSON descriptor
/// of the matched app id otherwise, since actually invoking that app's
/// handler is out of scope for this crate.
pub async fn dispatch(State(state): State<AppState>, Host(host): Host, uri: Uri) -> Response {
    let domain = host.split(':').next().unwrap_or_default();
    let snapshot = state.registry.router().snapshot();
    match snapshot.dispatch(domain, uri.path(), &state.config.system.default_domain) {
        Some(app_id) => axum::Json(DispatchResult {
            app_id: app_id.to_string(),
        })
        .into_response(),
        None => StatusCode::NOT_FOUND.into_response(),
    }
}
