// crates/clace-core/src/domain.rs
// ============================================================================
// Module: Clace Domain Rows
// Description: App, version, sync, and audit-log row shapes (spec.md §3).
// Purpose: Single source of truth for the metadata store schema and the
//          wire types the control API serializes.
// Dependencies: serde
// ============================================================================

//! ## Overview
//! These types are intentionally "dumb": they carry no behavior beyond
//! construction helpers. The state machine lives in `clace-registry`; the
//! durability guarantees live in `clace-store-sqlite`.

use std::collections::BTreeMap;

use serde::Deserialize;
use serde::Serialize;

use crate::ids::AppId;
use crate::time::Timestamp;

/// `auth_type` setting values (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthType {
    /// Use the server's admin credentials.
    System,
    /// Use the server-wide default auth policy.
    Default,
    /// No authentication required.
    None,
    /// A named OAuth provider entry.
    Named(String),
}

/// Unversioned, immediately-applied app settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Settings {
    /// Authentication mode for the app.
    pub auth_type: AuthType,
    /// Whether the stage variant accepts writes from handlers.
    pub stage_write_access: bool,
    /// Whether the preview variant accepts writes from handlers.
    pub preview_write_access: bool,
    /// Git auth credential name; `"-"` means unset.
    pub git_auth_name: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auth_type: AuthType::Default,
            stage_write_access: false,
            preview_write_access: false,
            git_auth_name: "-".to_string(),
        }
    }
}

/// A single declared permission (spec.md §4.2).
///
/// # Invariants
/// - Set membership for audit comparisons is structural equality over all
///   fields; `arguments`/`secrets` compare element-wise in declared order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perm {
    /// Plugin identifier the permission applies to.
    pub plugin: String,
    /// Method name on the plugin.
    pub method: String,
    /// Positional arguments; an entry prefixed `regex:` is a pattern.
    pub arguments: Vec<String>,
    /// Whether the call is declared read-only.
    pub is_read: Option<bool>,
    /// Secret key paths the call may read; each path component may be a
    /// `regex:`-prefixed pattern.
    pub secrets: Vec<Vec<String>>,
}

/// Per-version metadata for an app, per spec.md §3.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionMetadata {
    /// Version number this metadata was recorded under.
    pub version: i64,
    /// The version active immediately before this one, if any.
    pub previous_version: Option<i64>,
    /// Git branch the source was fetched from, if git-backed.
    pub git_branch: Option<String>,
    /// Git commit the source was fetched from, if git-backed.
    pub git_commit: Option<String>,
    /// Commit message associated with the fetched source.
    pub git_message: Option<String>,
}

/// Versioned, staged app metadata (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Metadata {
    /// Display name for the app.
    pub name: String,
    /// App spec/type identifier (interpreted by the scripting layer).
    pub spec: String,
    /// Version provenance.
    pub version_metadata: VersionMetadata,
    /// External plugin identifiers the app declares it loads.
    pub loads: Vec<String>,
    /// Declared permission set.
    pub permissions: Vec<Perm>,
    /// Plugin account bindings.
    pub accounts: BTreeMap<String, String>,
    /// Parameter values supplied to the app.
    pub param_values: BTreeMap<String, String>,
    /// Container runtime options, opaque to the core.
    pub container_options: BTreeMap<String, String>,
    /// Container argument list.
    pub container_args: Vec<String>,
    /// Container volume mounts.
    pub container_volumes: Vec<String>,
    /// App-level configuration overrides.
    pub app_config: BTreeMap<String, String>,
}

impl Metadata {
    /// Builds an initial metadata row for version 1 of a freshly created
    /// app.
    #[must_use]
    pub fn initial(name: impl Into<String>, spec: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            spec: spec.into(),
            version_metadata: VersionMetadata {
                version: 1,
                previous_version: None,
                git_branch: None,
                git_commit: None,
                git_message: None,
            },
            loads: Vec::new(),
            permissions: Vec::new(),
            accounts: BTreeMap::new(),
            param_values: BTreeMap::new(),
            container_options: BTreeMap::new(),
            container_args: Vec::new(),
            container_volumes: Vec::new(),
            app_config: BTreeMap::new(),
        }
    }
}

/// An app row: stable identity plus settings and the currently active
/// metadata snapshot (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppRow {
    /// Variant identifier.
    pub id: AppId,
    /// Domain the app is served under; empty string means default domain.
    pub domain: String,
    /// Path the app is served at; always begins with `/`.
    pub path: String,
    /// Source location (git URL or local disk path).
    pub source_url: String,
    /// Whether this row is the dev flavor of prod.
    pub is_dev: bool,
    /// Unversioned settings.
    pub settings: Settings,
    /// Active version's metadata snapshot.
    pub metadata: Metadata,
    /// Row creation time.
    pub create_time: Timestamp,
}

/// An append-only version history row (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRow {
    /// Owning app id.
    pub app_id: AppId,
    /// Dense, monotonic version number for this app.
    pub version: i64,
    /// The version active immediately before this one, if any.
    pub previous_version: Option<i64>,
    /// Whether this is the currently active version.
    pub active: bool,
    /// Row creation time.
    pub create_time: Timestamp,
    /// Metadata snapshot for this version.
    pub metadata: Metadata,
    /// Content hash of the app's file tree at this version.
    pub files_hash: String,
}

/// `reload` policy for a sync job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReloadPolicy {
    /// Skip reloading entirely.
    None,
    /// Reload only apps touched by the apply run.
    Updated,
    /// Reload every app matched by the glob.
    Matched,
}

/// Sync entry configuration (spec.md §3, §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncMetadata {
    /// Git branch to resolve the apply file against.
    pub git_branch: Option<String>,
    /// Git auth credential name.
    pub git_auth: Option<String>,
    /// Whether reloads are auto-approved.
    pub approve: bool,
    /// Reload policy for each run.
    pub reload: ReloadPolicy,
    /// Whether to promote after a successful reload.
    pub promote: bool,
    /// Whether declarative updates may overwrite out-of-band changes.
    pub clobber: bool,
    /// Whether to force-reload even when the upstream commit is unchanged.
    pub force_reload: bool,
    /// Scheduled run frequency in minutes; `0` means webhook-triggered.
    pub schedule_frequency_min: u32,
    /// Stable webhook URL path for webhook-triggered entries.
    pub webhook_url: Option<String>,
}

/// Lifecycle state of a sync entry (spec.md §4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    /// Waiting for its next scheduled run or a webhook call.
    Idle,
    /// An apply run is currently executing for this entry.
    Running,
    /// Disabled after `failure_count` reached the configured maximum.
    Disabled,
}

/// Observable status for a sync entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncStatus {
    /// Current lifecycle state.
    pub state: SyncState,
    /// Last error message, if the most recent run failed.
    pub error: Option<String>,
    /// Timestamp of the last run, if any.
    pub last_run_at: Option<Timestamp>,
    /// Consecutive failure count since the last success.
    pub failure_count: u32,
    /// Serialized response from the last apply run.
    pub last_apply_response: Option<String>,
}

impl Default for SyncStatus {
    fn default() -> Self {
        Self {
            state: SyncState::Idle,
            error: None,
            last_run_at: None,
            failure_count: 0,
            last_apply_response: None,
        }
    }
}

/// A sync entry (spec.md §3, §4.6).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncEntry {
    /// Sync entry identifier.
    pub id: String,
    /// Apply-file location: absolute local path or git URL.
    pub path: String,
    /// Sync-specific configuration.
    pub metadata: SyncMetadata,
    /// Observable run status.
    pub status: SyncStatus,
}

/// A bearer token authorizing an unauthenticated reload trigger for a
/// single app (spec.md §6.1 `app_webhook_token`), analogous to a sync
/// entry's webhook trigger but scoped to one app instead of an apply
/// file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppWebhookToken {
    /// Opaque bearer token; callers present it at the trigger path.
    pub token: String,
    /// App the token triggers a reload for.
    pub app_id: AppId,
    /// When the token was issued.
    pub create_time: Timestamp,
}

/// Audit log event kind (spec.md §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditLogKind {
    /// HTTP request/response pair.
    Http,
    /// System-originated event (e.g. scheduler tick).
    System,
    /// An operator or automated action on an app (create/promote/etc.).
    Action,
    /// Caller-supplied custom event.
    Custom,
}

/// An internal/observability audit log entry (spec.md §3).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditLogEntry {
    /// Event identifier.
    pub event_id: String,
    /// Event creation time.
    pub create_time: Timestamp,
    /// Event kind, used for retention bucketing.
    pub kind: AuditLogKind,
    /// App the event relates to, if any.
    pub app_id: Option<AppId>,
    /// User that triggered the event, if any.
    pub user_id: Option<String>,
    /// Request correlation id, if any.
    pub request_id: Option<String>,
    /// Free-form status label (e.g. `"ok"`, `"error"`).
    pub status: String,
    /// Serialized event detail payload.
    pub detail_blob: String,
}
