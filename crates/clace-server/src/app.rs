// crates/clace-server/src/app.rs
// ============================================================================
// Module: Router Assembly
// Description: Wires the control API and app-traffic dispatch into one
//              axum router (spec.md §6.1, §4.4).
// Purpose: Single place that decides which paths need admin auth.
// Dependencies: axum, clace-core
// ============================================================================

use axum::Router;
use axum::middleware;
use axum::routing::delete;
use axum::routing::get;
use axum::routing::post;

use crate::auth::require_admin;
use crate::control;
use crate::dispatch::dispatch;
use crate::state::AppState;

/// Builds the full server router: `/_clace/*` control routes behind
/// [`require_admin`], and everything else through [`dispatch`].
#[must_use]
pub fn build_router(state: AppState) -> Router {
    let control_routes = Router::new()
        .route("/app", get(control::list_apps).post(control::create_app).delete(control::delete_matching))
        .route("/app/by-path", get(control::get_app_by_path))
        .route("/app/{id}", get(control::get_app).delete(control::delete_app))
        .route("/app/{id}/metadata", post(control::update_metadata))
        .route("/app/{id}/promote", post(control::promote))
        .route("/app/{id}/version/switch", post(control::switch_version))
        .route("/app/{id}/version", get(control::list_versions))
        .route("/version/files", get(control::version_files))
        .route("/app/{id}/account", post(control::link_account))
        .route("/app/{id}/param", post(control::update_param))
        .route("/approve", post(control::approve))
        .route("/reload", post(control::reload))
        .route("/promote", post(control::promote_matching))
        .route("/preview", post(control::preview))
        .route("/app_settings", post(control::app_settings))
        .route(
            "/app_webhook_token",
            get(control::list_webhook_tokens).post(control::create_webhook_token).delete(control::delete_webhook_token),
        )
        .route("/apply", post(control::apply))
        .route("/sync", get(control::list_syncs).post(control::create_sync))
        .route("/sync/{id}", delete(control::delete_sync))
        .route("/sync/run", post(control::sync_run))
        .route("/stop", post(control::stop))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_admin));

    let webhook_routes = Router::new()
        .route("/sync/webhook/{id}", post(control::sync_webhook))
        .route("/webhook/{token}", post(control::trigger_app_webhook));

    Router::new()
        .nest("/_clace", control_routes)
        .nest("/_clace", webhook_routes)
        .fallback(dispatch)
        .with_state(state)
}
