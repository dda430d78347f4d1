// crates/clace-server/src/control.rs
// ============================================================================
// Module: Control API
// Description: `/_clace/*` handlers for app lifecycle, versioning, and
//              sync management (spec.md §6.1).
// Purpose: Translate JSON requests into `clace_registry::Registry` and
//          `clace_apply` calls and map their results/errors onto the wire.
// Dependencies: axum, clace-core, clace-registry, clace-apply, serde
// ============================================================================

use axum::Json;
use axum::extract::Path;
use axum::extract::Query;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use clace_apply::ApplyEngine;
use clace_apply::ApplyFile;
use clace_apply::ApplyOptions;
use clace_core::AppId;
use clace_core::AppRow;
use clace_core::AppWebhookToken;
use clace_core::AuthType;
use clace_core::ClaceError;
use clace_core::Metadata;
use clace_core::PathSpec;
use clace_core::ReloadPolicy;
use clace_core::Settings;
use clace_core::SyncEntry;
use clace_core::SyncMetadata;
use clace_core::SyncStatus;
use clace_core::VariantKind;
use clace_core::VersionRow;
use clace_registry::RegistryError;
use clace_store_sqlite::SwitchTarget;
use serde::Deserialize;
use serde::Serialize;

use crate::error_response::ApiError;
use crate::state::AppState;
use crate::sync_manager;

/// Suffix appended to a prod app's path to name its stage sibling,
/// mirrored from `clace_registry::registry` since the control API needs
/// to resolve a prod declaration's stage sibling for glob-based approve
/// and reload.
const STAGE_SUFFIX: &str = "_cl_stage";

/// Query parameters accepted by `GET /_clace/app/list`.
#[derive(Debug, Deserialize)]
pub struct ListQuery {
    /// Path-spec selector (spec.md §6.2); defaults to `"all"`.
    #[serde(rename = "appPathGlob", default = "default_glob")]
    app_path_glob: String,
}

fn default_glob() -> String {
    "all".to_string()
}

/// `POST /_clace/app/create` request body.
#[derive(Debug, Deserialize)]
pub struct CreateAppRequest {
    /// Domain to serve the app under; `""` for the catch-all domain.
    #[serde(default)]
    pub domain: String,
    /// Mount path, beginning with `/`.
    pub path: String,
    /// Source the app's files come from.
    pub source_url: String,
    /// Create a dev app instead of a prod+stage pair.
    #[serde(default)]
    pub is_dev: bool,
    /// Display name for the initial metadata.
    #[serde(default = "default_name")]
    pub name: String,
    /// App spec identifier for the initial metadata.
    #[serde(default = "default_spec")]
    pub spec: String,
}

fn default_name() -> String {
    "app".to_string()
}

fn default_spec() -> String {
    "proxy".to_string()
}

/// Lists apps matching `appPathGlob`.
///
/// # Errors
/// Returns [`ApiError`] if `appPathGlob` fails to parse or the store
/// reports an engine error.
pub async fn list_apps(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<AppRow>>, ApiError> {
    Ok(Json(apps_matching(&state, &query.app_path_glob)?))
}

/// Creates a new app (spec.md §4.3).
///
/// # Errors
/// Returns [`ApiError`] if an app already exists at `(domain, path)`.
pub async fn create_app(
    State(state): State<AppState>,
    Json(body): Json<CreateAppRequest>,
) -> Result<Json<AppRow>, ApiError> {
    let metadata = Metadata::initial(body.name, body.spec);
    let row = if body.is_dev {
        state
            .registry
            .create_dev_app(&body.domain, &body.path, &body.source_url, Settings::default(), metadata)
    } else {
        state
            .registry
            .create_prod_app(&body.domain, &body.path, &body.source_url, Settings::default(), metadata)
    }
    .map_err(ClaceError::from)
    .map_err(ApiError::from)?;
    Ok(Json(row))
}

/// Fetches a single app by id.
///
/// # Errors
/// Returns [`ApiError`] if no such app exists.
pub async fn get_app(State(state): State<AppState>, Path(id): Path<String>) -> Result<Json<AppRow>, ApiError> {
    let row = state
        .registry
        .get_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(row))
}

/// Deletes an app by id.
///
/// # Errors
/// Returns [`ApiError`] if no such app exists.
pub async fn delete_app(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    state
        .registry
        .delete_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

/// One app's outcome within a glob-selected bulk mutation.
#[derive(Debug, Serialize)]
pub struct GlobItemResult {
    /// The matched app's mount path.
    pub path: String,
    /// Whether this app's op succeeded.
    pub ok: bool,
    /// A short human-readable outcome or error message.
    pub message: String,
}

/// Aggregate response for a glob-selected bulk mutation. A failure on
/// one matched app never aborts the others (spec.md §6.1's
/// `appPathGlob`-keyed endpoints apply to every match independently).
#[derive(Debug, Serialize)]
pub struct GlobMutationResponse {
    /// Whether this response describes a dry run.
    pub dry_run: bool,
    /// One entry per app the selector matched.
    pub results: Vec<GlobItemResult>,
}

/// Query parameters shared by the glob-selected approve/reload/promote/
/// delete endpoints.
#[derive(Debug, Deserialize)]
pub struct GlobMutationQuery {
    /// Path-spec selector (spec.md §6.2).
    #[serde(rename = "appPathGlob", default = "default_glob")]
    pub app_path_glob: String,
    /// Report what would happen without committing it.
    #[serde(rename = "dryRun", default)]
    pub dry_run: bool,
    /// Promote a reloaded/approved stage sibling into prod afterward.
    #[serde(default)]
    pub promote: bool,
}

fn apps_matching(state: &AppState, app_path_glob: &str) -> Result<Vec<AppRow>, ApiError> {
    let spec = PathSpec::parse(app_path_glob).map_err(ApiError::from)?;
    let apps = state
        .registry
        .list_apps()
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(apps.into_iter().filter(|a| spec.matches(&a.domain, &a.path)).collect())
}

/// Resolves the app a staged/approved/reloaded change actually lands on
/// for `app`: its stage sibling for a prod declaration, `app` itself
/// otherwise. Mirrors `clace_registry::Registry`'s own stage redirect so
/// a glob matched against prod paths (the common case) targets the row
/// that actually carries the pending change.
fn resolve_staged_target(state: &AppState, app: &AppRow) -> Result<AppRow, RegistryError> {
    match app.id.kind() {
        Some(VariantKind::Prod) => {
            let stage_path = format!("{}{STAGE_SUFFIX}", app.path);
            state.registry.get_app_by_path(&app.domain, &stage_path, VariantKind::Stage)
        }
        _ => Ok(app.clone()),
    }
}

/// Approves every declared app matched by `appPathGlob`'s pending
/// metadata as-is, then optionally promotes it (spec.md §6.1 `/approve`).
///
/// # Errors
/// Returns [`ApiError`] if `appPathGlob` fails to parse; a failure for
/// one matched app is reported in its `GlobItemResult` rather than
/// aborting the rest.
pub async fn approve(
    State(state): State<AppState>,
    Query(query): Query<GlobMutationQuery>,
) -> Result<Json<GlobMutationResponse>, ApiError> {
    let apps = apps_matching(&state, &query.app_path_glob)?;
    let mut results = Vec::with_capacity(apps.len());
    for app in apps {
        if app.id.kind() == Some(VariantKind::Preview) {
            continue;
        }
        if query.dry_run {
            results.push(GlobItemResult { path: app.path, ok: true, message: "would approve".to_string() });
            continue;
        }
        let outcome = (|| -> Result<String, RegistryError> {
            let target = resolve_staged_target(&state, &app)?;
            state.registry.approve_and_update(&target, target.metadata.clone(), None)?;
            if query.promote && app.id.kind() == Some(VariantKind::Prod) {
                state.registry.promote(&app, None)?;
                return Ok("approved, promoted".to_string());
            }
            Ok("approved".to_string())
        })();
        results.push(match outcome {
            Ok(message) => GlobItemResult { path: app.path, ok: true, message },
            Err(err) => GlobItemResult { path: app.path, ok: false, message: ClaceError::from(err).to_string() },
        });
    }
    Ok(Json(GlobMutationResponse { dry_run: query.dry_run, results }))
}

/// `POST /_clace/reload` request body.
#[derive(Debug, Deserialize, Default)]
pub struct ReloadRequest {
    /// Git branch to resolve the source against.
    #[serde(default)]
    pub branch: Option<String>,
    /// Exact git commit to pin the source to.
    #[serde(default)]
    pub commit: Option<String>,
    /// Auto-approve any new loads/permissions the reload introduces.
    #[serde(default)]
    pub approve: bool,
}

/// Re-fetches source for every app matched by `appPathGlob` (a prod
/// match redirects to its stage sibling, matching the apply engine's own
/// reload phase), optionally promoting afterward (spec.md §6.1
/// `/reload`).
///
/// # Errors
/// Returns [`ApiError`] if `appPathGlob` fails to parse; a failure for
/// one matched app is reported in its `GlobItemResult`.
pub async fn reload(
    State(state): State<AppState>,
    Query(query): Query<GlobMutationQuery>,
    Json(body): Json<ReloadRequest>,
) -> Result<Json<GlobMutationResponse>, ApiError> {
    let apps = apps_matching(&state, &query.app_path_glob)?;
    let mut results = Vec::with_capacity(apps.len());
    for app in apps {
        if app.id.kind() == Some(VariantKind::Preview) {
            continue;
        }
        if query.dry_run {
            results.push(GlobItemResult { path: app.path, ok: true, message: "would reload".to_string() });
            continue;
        }
        let outcome = (|| -> Result<String, RegistryError> {
            let target = resolve_staged_target(&state, &app)?;
            let promote_after = query.promote && target.id.kind() == Some(VariantKind::Stage);
            state.registry.reload(
                &target,
                body.branch.as_deref(),
                body.commit.as_deref(),
                body.approve,
                promote_after,
                None,
            )?;
            Ok(if promote_after { "reloaded, promoted".to_string() } else { "reloaded".to_string() })
        })();
        results.push(match outcome {
            Ok(message) => GlobItemResult { path: app.path, ok: true, message },
            Err(err) => GlobItemResult { path: app.path, ok: false, message: ClaceError::from(err).to_string() },
        });
    }
    Ok(Json(GlobMutationResponse { dry_run: query.dry_run, results }))
}

/// Promotes every prod app matched by `appPathGlob` (spec.md §6.1
/// `/promote`). Matched apps that are not prod-kind are skipped rather
/// than erroring, since a glob commonly spans every variant of a path.
///
/// # Errors
/// Returns [`ApiError`] if `appPathGlob` fails to parse.
pub async fn promote_matching(
    State(state): State<AppState>,
    Query(query): Query<GlobMutationQuery>,
) -> Result<Json<GlobMutationResponse>, ApiError> {
    let apps = apps_matching(&state, &query.app_path_glob)?;
    let mut results = Vec::new();
    for app in apps {
        if app.id.kind() != Some(VariantKind::Prod) {
            continue;
        }
        if query.dry_run {
            results.push(GlobItemResult { path: app.path, ok: true, message: "would promote".to_string() });
            continue;
        }
        let outcome = state.registry.promote(&app, None);
        results.push(match outcome {
            Ok(_) => GlobItemResult { path: app.path, ok: true, message: "promoted".to_string() },
            Err(err) => GlobItemResult { path: app.path, ok: false, message: ClaceError::from(err).to_string() },
        });
    }
    Ok(Json(GlobMutationResponse { dry_run: query.dry_run, results }))
}

/// Deletes every app matched by `appPathGlob` (spec.md §6.1
/// `DELETE /app`).
///
/// # Errors
/// Returns [`ApiError`] if `appPathGlob` fails to parse.
pub async fn delete_matching(
    State(state): State<AppState>,
    Query(query): Query<GlobMutationQuery>,
) -> Result<Json<GlobMutationResponse>, ApiError> {
    let apps = apps_matching(&state, &query.app_path_glob)?;
    let mut results = Vec::with_capacity(apps.len());
    for app in apps {
        if query.dry_run {
            results.push(GlobItemResult { path: app.path, ok: true, message: "would delete".to_string() });
            continue;
        }
        let outcome = state.registry.delete_app(&app.id);
        results.push(match outcome {
            Ok(()) => GlobItemResult { path: app.path, ok: true, message: "deleted".to_string() },
            Err(err) => GlobItemResult { path: app.path, ok: false, message: ClaceError::from(err).to_string() },
        });
    }
    Ok(Json(GlobMutationResponse { dry_run: query.dry_run, results }))
}

/// Query parameters for `POST /_clace/preview`.
#[derive(Debug, Deserialize)]
pub struct PreviewQuery {
    /// Domain the prod app is served under.
    #[serde(default)]
    pub domain: String,
    /// Prod app's mount path.
    #[serde(rename = "appPath")]
    pub app_path: String,
    /// Git commit the preview pins its source to.
    #[serde(rename = "commitId")]
    pub commit_id: String,
}

/// Creates an ephemeral preview variant pinned to a commit (spec.md
/// §6.1 `/preview`).
///
/// # Errors
/// Returns [`ApiError`] if no prod app exists at `(domain, appPath)`.
pub async fn preview(
    State(state): State<AppState>,
    Query(query): Query<PreviewQuery>,
) -> Result<Json<AppRow>, ApiError> {
    let prod = state
        .registry
        .get_app_by_path(&query.domain, &query.app_path, VariantKind::Prod)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let row = state
        .registry
        .create_preview(&prod, &query.commit_id, prod.metadata.clone())
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(row))
}

/// `POST /_clace/app_settings` request body.
#[derive(Debug, Deserialize, Default)]
pub struct AppSettingsRequest {
    /// Path-spec selector (spec.md §6.2); defaults to `"all"`.
    #[serde(default = "default_glob")]
    pub app_path_glob: String,
    /// New auth mode, if present.
    pub auth_type: Option<AuthType>,
    /// New stage write-access flag, if present.
    pub stage_write_access: Option<bool>,
    /// New preview write-access flag, if present.
    pub preview_write_access: Option<bool>,
    /// New git auth credential name, if present.
    pub git_auth_name: Option<String>,
}

/// Applies an immediate (unversioned) settings patch to every app
/// matched by `app_path_glob` (spec.md §6.1 `/app_settings`; contrast
/// with the staged, versioned `/app/{id}/metadata`).
///
/// # Errors
/// Returns [`ApiError`] if `app_path_glob` fails to parse.
pub async fn app_settings(
    State(state): State<AppState>,
    Json(body): Json<AppSettingsRequest>,
) -> Result<Json<GlobMutationResponse>, ApiError> {
    let apps = apps_matching(&state, &body.app_path_glob)?;
    let mut results = Vec::with_capacity(apps.len());
    for app in apps {
        let outcome = state.registry.update_settings(
            &app.id,
            |settings| {
                if let Some(auth_type) = &body.auth_type {
                    settings.auth_type = auth_type.clone();
                }
                if let Some(stage_write_access) = body.stage_write_access {
                    settings.stage_write_access = stage_write_access;
                }
                if let Some(preview_write_access) = body.preview_write_access {
                    settings.preview_write_access = preview_write_access;
                }
                if let Some(git_auth_name) = &body.git_auth_name {
                    settings.git_auth_name.clone_from(git_auth_name);
                }
            },
            None,
        );
        results.push(match outcome {
            Ok(_) => GlobItemResult { path: app.path, ok: true, message: "updated".to_string() },
            Err(err) => GlobItemResult { path: app.path, ok: false, message: ClaceError::from(err).to_string() },
        });
    }
    Ok(Json(GlobMutationResponse { dry_run: false, results }))
}

/// Query parameters for `GET /_clace/version/files`.
#[derive(Debug, Deserialize)]
pub struct VersionFilesQuery {
    /// App id.
    pub id: String,
    /// Version number; defaults to the active version.
    pub version: Option<i64>,
}

/// Lists the file paths recorded against a version (spec.md §6.1
/// `/version/files`).
///
/// # Errors
/// Returns [`ApiError`] if the app or version does not exist.
pub async fn version_files(
    State(state): State<AppState>,
    Query(query): Query<VersionFilesQuery>,
) -> Result<Json<Vec<String>>, ApiError> {
    let files = state
        .registry
        .store()
        .list_files(&AppId::from_raw(query.id), query.version)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(files))
}

/// `POST /_clace/app_webhook_token` request body.
#[derive(Debug, Deserialize)]
pub struct CreateWebhookTokenRequest {
    /// App id the token authorizes a reload trigger for.
    pub id: String,
}

/// Mints a fresh reload-trigger token for an app (spec.md §6.1
/// `/app_webhook_token`).
///
/// # Errors
/// Returns [`ApiError`] if `id` does not exist.
pub async fn create_webhook_token(
    State(state): State<AppState>,
    Json(body): Json<CreateWebhookTokenRequest>,
) -> Result<Json<AppWebhookToken>, ApiError> {
    let token = state
        .registry
        .create_webhook_token(&AppId::from_raw(body.id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(token))
}

/// Query parameters for `GET /_clace/app_webhook_token`.
#[derive(Debug, Deserialize)]
pub struct ListWebhookTokensQuery {
    /// App id to list tokens for.
    pub id: String,
}

/// Lists the webhook tokens minted for an app.
///
/// # Errors
/// Returns [`ApiError`] on a store engine error.
pub async fn list_webhook_tokens(
    State(state): State<AppState>,
    Query(query): Query<ListWebhookTokensQuery>,
) -> Result<Json<Vec<AppWebhookToken>>, ApiError> {
    let tokens = state
        .registry
        .list_webhook_tokens(&AppId::from_raw(query.id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(tokens))
}

/// Query parameters for `DELETE /_clace/app_webhook_token`.
#[derive(Debug, Deserialize)]
pub struct DeleteWebhookTokenQuery {
    /// Token to revoke.
    pub token: String,
}

/// Revokes a webhook token.
///
/// # Errors
/// Returns [`ApiError`] if `token` is unknown.
pub async fn delete_webhook_token(
    State(state): State<AppState>,
    Query(query): Query<DeleteWebhookTokenQuery>,
) -> Result<Response, ApiError> {
    state
        .registry
        .delete_webhook_token(&query.token)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// Resolves a presented webhook token and runs the reload it authorizes
/// (spec.md §6.1; this route is intentionally outside the admin-auth
/// layer, mirroring the sync webhook trigger's own unauthenticated
/// path).
///
/// # Errors
/// Returns [`ApiError`] if `token` is unknown or revoked.
pub async fn trigger_app_webhook(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<VersionRow>, ApiError> {
    let version = state
        .registry
        .trigger_webhook_reload(&token)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(version))
}

/// Requests an immediate run of sync entry `id`'s scheduler
/// (spec.md §6.1 `/sync/run`).
///
/// # Errors
/// Returns [`ApiError`] with `404` if `id` has no running scheduler.
pub async fn sync_run(State(state): State<AppState>, Query(query): Query<SyncIdQuery>) -> Result<Response, ApiError> {
    if state.sync_manager.trigger(&query.id) {
        Ok(StatusCode::ACCEPTED.into_response())
    } else {
        Err(ApiError::from(ClaceError::NotFound(query.id)))
    }
}

/// Query parameters naming a sync entry by id.
#[derive(Debug, Deserialize)]
pub struct SyncIdQuery {
    /// Sync entry identifier.
    pub id: String,
}

/// Triggers sync entry `id`'s scheduler the same way `sync_run` does,
/// except unauthenticated: this is the stable path an external webhook
/// posts to (spec.md §4.6, §6.1 `/sync/webhook/<id>`).
///
/// # Errors
/// Returns [`ApiError`] with `404` if `id` has no running scheduler.
pub async fn sync_webhook(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    if state.sync_manager.trigger(&id) {
        Ok(StatusCode::ACCEPTED.into_response())
    } else {
        Err(ApiError::from(ClaceError::NotFound(id)))
    }
}

/// Begins a graceful shutdown: in-flight requests are served, no new
/// sync runs are dispatched, and the process exits once
/// `bootstrap::serve`'s shutdown future resolves (spec.md §5).
///
/// Per spec.md §6.1, the response to this call may legitimately be
/// truncated if the process exits before the client finishes reading
/// it.
pub async fn stop(State(state): State<AppState>) -> Response {
    state.sync_manager.cancel_all();
    state.shutdown.cancel();
    StatusCode::ACCEPTED.into_response()
}

/// `POST /_clace/app/{id}/metadata` request body.
#[derive(Debug, Deserialize)]
pub struct UpdateMetadataRequest {
    /// Replacement metadata declaration.
    pub metadata: Metadata,
    /// Auto-approve any new loads/permissions this declares.
    #[serde(default)]
    pub approve: bool,
    /// Row version the caller last observed, for optimistic concurrency.
    pub expected_row_version: Option<i64>,
}

/// Stages a metadata update for an app (spec.md §4.3, §4.2).
///
/// # Errors
/// Returns [`ApiError`] with `403` if the declared surface needs operator
/// approval and `approve` was not set.
pub async fn update_metadata(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateMetadataRequest>,
) -> Result<Json<VersionRow>, ApiError> {
    let app = state
        .registry
        .get_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let version = state
        .registry
        .stage_metadata_update(&app, body.metadata, body.approve, body.expected_row_version)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(version))
}

/// `POST /_clace/app/{id}/promote` request body.
#[derive(Debug, Deserialize, Default)]
pub struct PromoteRequest {
    /// Row version the caller last observed.
    pub expected_row_version: Option<i64>,
}

/// Promotes a prod app's stage sibling into prod (spec.md §4.3).
///
/// # Errors
/// Returns [`ApiError`] if `id` is not a prod app or has no stage sibling.
pub async fn promote(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<PromoteRequest>,
) -> Result<Json<VersionRow>, ApiError> {
    let app = state
        .registry
        .get_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let version = state
        .registry
        .promote(&app, body.expected_row_version)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(version))
}

/// `POST /_clace/app/{id}/version/switch` request body.
#[derive(Debug, Deserialize)]
#[serde(tag = "target", rename_all = "snake_case")]
pub enum SwitchVersionRequest {
    /// Activate this exact version.
    Explicit {
        /// Target version number.
        version: i64,
    },
    /// Activate the version before the current one.
    Previous,
    /// Activate the version after the current one.
    Next,
    /// Shorthand for `Previous`.
    Revert,
}

impl From<SwitchVersionRequest> for SwitchTarget {
    fn from(value: SwitchVersionRequest) -> Self {
        match value {
            SwitchVersionRequest::Explicit { version } => Self::Explicit(version),
            SwitchVersionRequest::Previous => Self::Previous,
            SwitchVersionRequest::Next => Self::Next,
            SwitchVersionRequest::Revert => Self::Revert,
        }
    }
}

/// Activates a different already-recorded version.
///
/// # Errors
/// Returns [`ApiError`] if `id` or the resolved target version does not
/// exist.
pub async fn switch_version(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<SwitchVersionRequest>,
) -> Result<Json<VersionRow>, ApiError> {
    let row = state
        .registry
        .switch_version(&AppId::from_raw(id), body.into())
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(row))
}

/// Lists an app's version history.
///
/// # Errors
/// Returns [`ApiError`] on a store engine error.
pub async fn list_versions(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Vec<VersionRow>>, ApiError> {
    let rows = state
        .registry
        .list_versions(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(rows))
}

/// `POST /_clace/app/{id}/account` request body.
#[derive(Debug, Deserialize)]
pub struct LinkAccountRequest {
    /// Plugin account name declared in metadata.
    pub plugin_account: String,
    /// Concrete account id to bind it to.
    pub account_id: String,
    /// Row version the caller last observed.
    pub expected_row_version: Option<i64>,
}

/// Links a plugin account binding.
///
/// # Errors
/// Returns [`ApiError`] on a store or transition error.
pub async fn link_account(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LinkAccountRequest>,
) -> Result<Json<VersionRow>, ApiError> {
    let app = state
        .registry
        .get_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let version = state
        .registry
        .link_account(&app, &body.plugin_account, &body.account_id, body.expected_row_version)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(version))
}

/// `POST /_clace/app/{id}/param` request body.
#[derive(Debug, Deserialize)]
pub struct UpdateParamRequest {
    /// Parameter key.
    pub key: String,
    /// Parameter value.
    pub value: String,
    /// Row version the caller last observed.
    pub expected_row_version: Option<i64>,
}

/// Updates a single app parameter value.
///
/// # Errors
/// Returns [`ApiError`] on a store or transition error.
pub async fn update_param(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<UpdateParamRequest>,
) -> Result<Json<VersionRow>, ApiError> {
    let app = state
        .registry
        .get_app(&AppId::from_raw(id))
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let version = state
        .registry
        .update_param(&app, &body.key, &body.value, body.expected_row_version)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(version))
}

/// `POST /_clace/apply` request body.
#[derive(Debug, Deserialize)]
pub struct ApplyRequest {
    /// Identifier used for non-declarative-change baselines, typically
    /// the apply file's path.
    pub file_path: String,
    /// Raw TOML text of the apply file.
    pub apply_toml: String,
    /// Compute decisions without committing them.
    #[serde(default)]
    pub dry_run: bool,
    /// Overwrite fields that drifted out of band since the last apply.
    #[serde(default)]
    pub clobber: bool,
    /// Auto-approve new loads/permissions declared apps introduce.
    #[serde(default)]
    pub approve: bool,
    /// Promote a reloaded stage sibling into prod.
    #[serde(default)]
    pub promote: bool,
    /// Which apps to reload after the create/update phase.
    #[serde(default = "default_reload_policy")]
    pub reload: ReloadPolicy,
    /// Selector restricting which declarations from the file are applied.
    #[serde(default = "default_app_path_glob")]
    pub app_path_glob: String,
}

fn default_reload_policy() -> ReloadPolicy {
    ReloadPolicy::None
}

fn default_app_path_glob() -> String {
    "all".to_string()
}

/// Outcome entry returned to the caller; mirrors
/// [`clace_apply::ApplyOutcome`] in a JSON-friendly shape.
#[derive(Debug, Serialize)]
pub struct ApplyOutcomeBody {
    /// The declared app's mount path.
    pub path: String,
    /// What happened, as a short label.
    pub decision: String,
}

/// The full response body for `POST /_clace/apply`: the per-app outcomes
/// plus the aggregate summary (spec.md §4.5 step 6).
#[derive(Debug, Serialize)]
pub struct ApplyResponseBody {
    /// One entry per declaration matched by `app_path_glob`.
    pub outcomes: Vec<ApplyOutcomeBody>,
    /// Paths created.
    pub created: Vec<String>,
    /// Paths updated.
    pub updated: Vec<String>,
    /// Paths reloaded.
    pub reloaded: Vec<String>,
    /// Paths skipped due to a non-declarative change.
    pub skipped: Vec<String>,
    /// Paths whose declared surface was recorded as approved.
    pub approved: Vec<String>,
    /// Paths promoted from stage into prod.
    pub promoted: Vec<String>,
    /// Whether this response describes a dry run.
    pub dry_run: bool,
}

/// Runs the apply engine against a submitted apply file (spec.md §4.5).
///
/// # Errors
/// Returns [`ApiError`] if the TOML or `app_path_glob` fails to parse, or
/// a create/update/reload fails for a reason other than a detected
/// non-declarative change.
pub async fn apply(
    State(state): State<AppState>,
    Json(body): Json<ApplyRequest>,
) -> Result<Json<ApplyResponseBody>, ApiError> {
    let file = ApplyFile::parse(&body.apply_toml)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    let options = ApplyOptions {
        dry_run: body.dry_run,
        clobber: body.clobber,
        approve: body.approve,
        promote: body.promote,
        reload: body.reload,
        app_path_glob: body.app_path_glob,
    };
    let (outcomes, response) = ApplyEngine::new(&state.registry)
        .apply(&body.file_path, &file, &options)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(ApplyResponseBody {
        outcomes: outcomes
            .into_iter()
            .map(|o| ApplyOutcomeBody {
                path: o.path,
                decision: decision_label(&o.decision),
            })
            .collect(),
        created: response.created,
        updated: response.updated,
        reloaded: response.reloaded,
        skipped: response.skipped,
        approved: response.approved,
        promoted: response.promoted,
        dry_run: response.dry_run,
    }))
}

/// Renders an [`clace_apply::ApplyDecision`] as the short label the wire
/// format and the CLI both print.
fn decision_label(decision: &clace_apply::ApplyDecision) -> String {
    match decision {
        clace_apply::ApplyDecision::Created => "created".to_string(),
        clace_apply::ApplyDecision::Updated => "updated".to_string(),
        clace_apply::ApplyDecision::Unchanged => "unchanged".to_string(),
        clace_apply::ApplyDecision::SkippedNonDeclarativeChange { field } => {
            format!("skipped (non-declarative change on {field})")
        }
        clace_apply::ApplyDecision::Reloaded => "reloaded".to_string(),
        clace_apply::ApplyDecision::Approved => "approved".to_string(),
        clace_apply::ApplyDecision::Promoted => "promoted".to_string(),
    }
}

/// `POST /_clace/sync/create` request body.
#[derive(Debug, Deserialize)]
pub struct CreateSyncRequest {
    /// Sync entry identifier.
    pub id: String,
    /// Apply-file location.
    pub path: String,
    /// Sync-specific configuration.
    pub metadata: SyncMetadata,
}

/// Creates a sync entry (spec.md §4.6).
///
/// # Errors
/// Returns [`ApiError`] if `id` is already in use.
pub async fn create_sync(
    State(state): State<AppState>,
    Json(body): Json<CreateSyncRequest>,
) -> Result<Json<SyncEntry>, ApiError> {
    let entry = SyncEntry {
        id: body.id,
        path: body.path,
        metadata: body.metadata,
        status: SyncStatus::default(),
    };
    state
        .registry
        .store()
        .create_sync(&entry)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    sync_manager::spawn(&state, entry.clone());
    Ok(Json(entry))
}

/// Lists every sync entry.
///
/// # Errors
/// Returns [`ApiError`] on a store engine error.
pub async fn list_syncs(State(state): State<AppState>) -> Result<Json<Vec<SyncEntry>>, ApiError> {
    let entries = state
        .registry
        .store()
        .list_syncs()
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(entries))
}

/// Deletes a sync entry.
///
/// # Errors
/// Returns [`ApiError`] if no such entry exists.
pub async fn delete_sync(State(state): State<AppState>, Path(id): Path<String>) -> Result<Response, ApiError> {
    state
        .registry
        .store()
        .delete_sync(&id)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    state.sync_manager.cancel(&id);
    state.sync_manager.unregister(&id);
    Ok(axum::http::StatusCode::NO_CONTENT.into_response())
}

/// Looks up an app by an exact `(domain, path, kind)` triple. Used by the
/// CLI to resolve a human-given path into an id before calling an
/// id-keyed endpoint.
///
/// # Errors
/// Returns [`ApiError`] if no such app exists.
pub async fn get_app_by_path(
    State(state): State<AppState>,
    Query(query): Query<GetByPathQuery>,
) -> Result<Json<AppRow>, ApiError> {
    let kind = variant_kind_from_str(&query.kind).map_err(ApiError::from)?;
    let row = state
        .registry
        .get_app_by_path(&query.domain, &query.path, kind)
        .map_err(ClaceError::from)
        .map_err(ApiError::from)?;
    Ok(Json(row))
}

/// Query parameters for [`get_app_by_path`].
#[derive(Debug, Deserialize)]
pub struct GetByPathQuery {
    /// Domain to look up, `""` for the catch-all domain.
    #[serde(default)]
    pub domain: String,
    /// Mount path to look up.
    pub path: String,
    /// Variant kind: `"prod"`, `"stage"`, `"dev"`, or `"preview"`.
    pub kind: String,
}

fn variant_kind_from_str(raw: &str) -> Result<VariantKind, ClaceError> {
    match raw {
        "prod" => Ok(VariantKind::Prod),
        "stage" => Ok(VariantKind::Stage),
        "dev" => Ok(VariantKind::Dev),
        "preview" => Ok(VariantKind::Preview),
        other => Err(ClaceError::InvalidArgument(format!("unknown variant kind: {other}"))),
    }
}
