// crates/clace-registry/src/registry.rs
// ============================================================================
// Module: App Registry
// Description: The app lifecycle state machine (spec.md §4.3): create,
//              delete, stage/approve, promote, switch-version, preview,
//              account linking, and param updates.
// Purpose: Hold the per-app lock for the duration of every transition and
//          keep the router's published snapshot in sync with the store.
// Dependencies: clace-core, clace-audit, clace-store-sqlite, thiserror,
//               tracing
// ============================================================================

//! ## Overview
//! [`Registry`] is the only thing in the workspace allowed to call
//! [`clace_store_sqlite::MetadataStore`] mutators. Every public method:
//! 1. acquires the per-app lock (or, for creates, just runs the store's
//!    own duplicate check — there is no existing app id to lock yet),
//! 2. does the store work,
//! 3. republishes the router if the set of live mounts changed.
//!
//! The stage/promote boundary matches spec.md §4.3's transition table: a
//! prod app's staged changes live on its stage sibling (`<path>_cl_stage`)
//! until [`Registry::promote`] copies them across; previews are throwaway
//! siblings keyed by commit and are never promotion targets themselves.

use std::collections::BTreeSet;
use std::sync::Arc;

use clace_audit::AuditInput;
use clace_core::AppId;
use clace_core::AppRow;
use clace_core::AppWebhookToken;
use clace_core::ClaceError;
use clace_core::Metadata;
use clace_core::Perm;
use clace_core::Settings;
use clace_core::Timestamp;
use clace_core::VariantKind;
use clace_core::VersionRow;
use clace_store_sqlite::MetadataStore;
use clace_store_sqlite::StoreError;
use clace_store_sqlite::SwitchTarget;
use thiserror::Error;
use tracing::info;

use crate::applock::AppLockTable;
use crate::router::RouteEntry;
use crate::router::Router;
use crate::router::RouterHandle;

/// Suffix appended to a prod app's path to name its stage sibling.
const STAGE_SUFFIX: &str = "_cl_stage";

/// Rejects a mount path that lands on or under the reserved control
/// prefix (spec.md §4.4: the control prefix is matched first and never
/// shadowed by an app).
fn reject_control_path_shadow(path: &str) -> Result<(), RegistryError> {
    let prefix = clace_core::CONTROL_PREFIX;
    if path == prefix || path.starts_with(&format!("{prefix}/")) {
        return Err(RegistryError::ControlPathShadow(path.to_string()));
    }
    Ok(())
}

/// Registry-level errors.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// The underlying store reported an error.
    #[error(transparent)]
    Store(#[from] StoreError),
    /// The audit gate reported an error evaluating a declared surface.
    #[error(transparent)]
    Audit(#[from] clace_audit::AuditError),
    /// The requested transition is not valid for the app's variant kind.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),
    /// The requested mount path falls under the reserved control prefix.
    #[error("{0}: path falls under the reserved {prefix} prefix", prefix = clace_core::CONTROL_PREFIX)]
    ControlPathShadow(String),
    /// Refreshing the app's source tree failed.
    #[error(transparent)]
    SourceFetch(#[from] crate::source::SourceError),
    /// A declared surface needs operator approval before it can activate.
    #[error("{new_loads} new load(s), {new_perms} new permission(s) need approval")]
    NeedsApproval {
        /// Count of newly declared, unapproved plugin loads.
        new_loads: usize,
        /// Count of newly declared, unapproved permissions.
        new_perms: usize,
    },
}

impl From<RegistryError> for ClaceError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Store(StoreError::NotFound(m)) => Self::NotFound(m),
            RegistryError::Store(StoreError::Duplicate(m)) => Self::Duplicate(m),
            RegistryError::Store(StoreError::Conflict(id, expected, actual)) => {
                Self::Conflict(format!("{id}: expected row version {expected}, found {actual}"))
            }
            RegistryError::Store(StoreError::Invalid(m)) => Self::InvalidArgument(m),
            RegistryError::Store(StoreError::Db(m) | StoreError::Corrupt(m)) => Self::Internal(m),
            RegistryError::Audit(clace_audit::AuditError::InvalidRegex(m)) => {
                Self::InvalidArgument(m)
            }
            RegistryError::InvalidTransition(m) | RegistryError::ControlPathShadow(m) => {
                Self::InvalidArgument(m)
            }
            RegistryError::NeedsApproval { new_loads, new_perms } => {
                Self::NeedsApproval(new_loads, new_perms)
            }
            RegistryError::SourceFetch(err) => Self::SourceFetch(err.to_string()),
        }
    }
}

/// The app lifecycle registry (spec.md §4.3).
pub struct Registry {
    store: Arc<MetadataStore>,
    locks: AppLockTable,
    router: RouterHandle,
}

impl Registry {
    /// Wraps a store with a fresh lock table and an empty router.
    #[must_use]
    pub fn new(store: MetadataStore) -> Self {
        let registry = Self {
            store: Arc::new(store),
            locks: AppLockTable::new(),
            router: RouterHandle::default(),
        };
        registry.rebuild_router_best_effort();
        registry
    }

    /// Exposes the live router for the HTTP front's dispatch path.
    #[must_use]
    pub const fn router(&self) -> &RouterHandle {
        &self.router
    }

    /// Exposes the backing store for read-only queries (listing, etc.).
    #[must_use]
    pub fn store(&self) -> &MetadataStore {
        &self.store
    }

    /// Clones a shared handle to the backing store, for tasks (the sync
    /// scheduler) that outlive any single registry call and need to read
    /// or write store state independently of a registry transition.
    #[must_use]
    pub fn store_handle(&self) -> Arc<MetadataStore> {
        Arc::clone(&self.store)
    }

    fn rebuild_router_best_effort(&self) {
        match self.store.list_apps() {
            Ok(apps) => {
                let entries = apps
                    .into_iter()
                    .map(|a| RouteEntry {
                        domain: a.domain,
                        mount_path: a.path,
                        app_id: a.id,
                    })
                    .collect();
                self.router.replace(Router::from_entries(entries));
            }
            Err(err) => {
                tracing::warn!(error = %err, "failed to rebuild router snapshot");
            }
        }
    }

    /// Creates a new prod app and its stage sibling together (spec.md
    /// §4.3: every prod app has exactly one stage sibling from creation).
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if an app already exists at
    /// `(domain, path)`, or [`RegistryError::ControlPathShadow`] if `path`
    /// falls under the reserved control prefix.
    pub fn create_prod_app(
        &self,
        domain: &str,
        path: &str,
        source_url: &str,
        settings: Settings,
        metadata: Metadata,
    ) -> Result<AppRow, RegistryError> {
        reject_control_path_shadow(path)?;
        let prod_id = AppId::new_prod();
        let guard = self.locks.lock(&prod_id);
        let _scope = guard.enter();
        let now = Timestamp::now();
        let prod_row = AppRow {
            id: prod_id.clone(),
            domain: domain.to_string(),
            path: path.to_string(),
            source_url: source_url.to_string(),
            is_dev: false,
            settings: settings.clone(),
            metadata: metadata.clone(),
            create_time: now,
        };
        let prod_version = VersionRow {
            app_id: prod_id.clone(),
            version: 1,
            previous_version: None,
            active: true,
            create_time: now,
            metadata: metadata.clone(),
            files_hash: String::new(),
        };
        self.store.create_app(&prod_row, &prod_version)?;

        let stage_id = AppId::new_stage();
        let stage_row = AppRow {
            id: stage_id.clone(),
            domain: domain.to_string(),
            path: format!("{path}{STAGE_SUFFIX}"),
            source_url: source_url.to_string(),
            is_dev: false,
            settings,
            metadata: metadata.clone(),
            create_time: now,
        };
        let stage_version = VersionRow {
            app_id: stage_id,
            version: 1,
            previous_version: None,
            active: true,
            create_time: now,
            metadata,
            files_hash: String::new(),
        };
        self.store.create_app(&stage_row, &stage_version)?;

        self.rebuild_router_best_effort();
        info!(app_id = %prod_id, domain, path, "created prod app");
        Ok(prod_row)
    }

    /// Creates a standalone dev app (no stage sibling; spec.md §4.3).
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if an app already exists at
    /// `(domain, path)`, or [`RegistryError::ControlPathShadow`] if `path`
    /// falls under the reserved control prefix.
    pub fn create_dev_app(
        &self,
        domain: &str,
        path: &str,
        source_url: &str,
        settings: Settings,
        metadata: Metadata,
    ) -> Result<AppRow, RegistryError> {
        reject_control_path_shadow(path)?;
        let id = AppId::new_dev();
        let guard = self.locks.lock(&id);
        let _scope = guard.enter();
        let now = Timestamp::now();
        let row = AppRow {
            id: id.clone(),
            domain: domain.to_string(),
            path: path.to_string(),
            source_url: source_url.to_string(),
            is_dev: true,
            settings,
            metadata: metadata.clone(),
            create_time: now,
        };
        let version = VersionRow {
            app_id: id.clone(),
            version: 1,
            previous_version: None,
            active: true,
            create_time: now,
            metadata,
            files_hash: String::new(),
        };
        self.store.create_app(&row, &version)?;
        self.rebuild_router_best_effort();
        info!(app_id = %id, domain, path, "created dev app");
        Ok(row)
    }

    /// Creates a throwaway preview sibling of a prod app at a given
    /// commit (spec.md §4.3). Previews mount at their own commit-scoped
    /// path and are served by the router like any other variant, but are
    /// never a promotion target themselves.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if a preview for this exact
    /// commit already exists.
    pub fn create_preview(
        &self,
        prod: &AppRow,
        commit: &str,
        metadata: Metadata,
    ) -> Result<AppRow, RegistryError> {
        let id = AppId::new_preview(commit);
        let guard = self.locks.lock(&id);
        let _scope = guard.enter();
        let now = Timestamp::now();
        let row = AppRow {
            id: id.clone(),
            domain: prod.domain.clone(),
            path: format!("{}_cl_preview_{commit}", prod.path),
            source_url: prod.source_url.clone(),
            is_dev: false,
            settings: prod.settings.clone(),
            metadata: metadata.clone(),
            create_time: now,
        };
        let version = VersionRow {
            app_id: id.clone(),
            version: 1,
            previous_version: None,
            active: true,
            create_time: now,
            metadata,
            files_hash: String::new(),
        };
        self.store.create_app(&row, &version)?;
        self.rebuild_router_best_effort();
        info!(app_id = %id, commit, "created preview app");
        Ok(row)
    }

    /// Deletes an app outright. Deleting a prod app does not delete its
    /// stage sibling; callers that want both gone must delete both ids.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if the app does not exist.
    pub fn delete_app(&self, id: &AppId) -> Result<(), RegistryError> {
        let guard = self.locks.lock(id);
        let _scope = guard.enter();
        self.store.delete_app(id)?;
        self.rebuild_router_best_effort();
        info!(app_id = %id, "deleted app");
        Ok(())
    }

    /// Looks up an app by id.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if the app does not exist.
    pub fn get_app(&self, id: &AppId) -> Result<AppRow, RegistryError> {
        Ok(self.store.get_app(id)?)
    }

    /// Looks up an app by `(domain, path)` for a given variant kind.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if no such app exists.
    pub fn get_app_by_path(
        &self,
        domain: &str,
        path: &str,
        kind: VariantKind,
    ) -> Result<AppRow, RegistryError> {
        Ok(self.store.get_app_by_path(domain, path, kind)?)
    }

    /// Lists every app, unfiltered; callers apply
    /// [`clace_core::PathSpec`] selection themselves.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store engine error.
    pub fn list_apps(&self) -> Result<Vec<AppRow>, RegistryError> {
        Ok(self.store.list_apps()?)
    }

    /// Updates unversioned settings on an app.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if the app does not exist or the
    /// optimistic-concurrency check fails.
    pub fn update_settings(
        &self,
        id: &AppId,
        patch: impl FnOnce(&mut Settings),
        expected_row_version: Option<i64>,
    ) -> Result<AppRow, RegistryError> {
        let guard = self.locks.lock(id);
        let _scope = guard.enter();
        Ok(self.store.update_settings(id, patch, expected_row_version)?)
    }

    /// Resolves the app whose metadata a staged change should land on,
    /// per spec.md §4.3's transition table: stage and dev apps take
    /// changes directly; prod apps redirect to their stage sibling;
    /// preview apps never accept staged changes.
    fn stage_target(&self, app: &AppRow) -> Result<AppId, RegistryError> {
        match app.id.kind() {
            Some(VariantKind::Stage | VariantKind::Dev) => Ok(app.id.clone()),
            Some(VariantKind::Prod) => {
                let stage_path = format!("{}{STAGE_SUFFIX}", app.path);
                let stage = self
                    .store
                    .get_app_by_path(&app.domain, &stage_path, VariantKind::Stage)?;
                Ok(stage.id)
            }
            Some(VariantKind::Preview) | None => Err(RegistryError::InvalidTransition(format!(
                "{}: preview apps do not accept staged metadata changes",
                app.id
            ))),
        }
    }

    /// Applies a declarative metadata change, running it through the
    /// audit gate first (spec.md §4.2, §4.3). A prod app's change lands
    /// on its stage sibling; `audit_override` lets an operator who is
    /// approving a new surface in the same call bypass the gate.
    ///
    /// # Errors
    /// Returns [`RegistryError::NeedsApproval`] if the new metadata
    /// declares loads or permissions beyond what is already approved and
    /// `audit_override` is `false`.
    pub fn stage_metadata_update(
        &self,
        app: &AppRow,
        new_metadata: Metadata,
        audit_override: bool,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        let target_id = self.stage_target(app)?;
        let guard = self.locks.lock(&target_id);
        let _scope = guard.enter();

        if !audit_override {
            let (approved_loads, approved_permissions) =
                self.store.get_approved_surface(&target_id)?;
            let declared_loads: BTreeSet<String> = new_metadata.loads.iter().cloned().collect();
            let decision = clace_audit::evaluate(AuditInput {
                declared_loads: &declared_loads,
                declared_permissions: &new_metadata.permissions,
                approved_loads: &approved_loads,
                approved_permissions: &approved_permissions,
            })?;
            if decision.needs_approval {
                return Err(RegistryError::NeedsApproval {
                    new_loads: decision.new_loads_added.len(),
                    new_perms: decision.new_perms_added.len(),
                });
            }
        }

        let row = self
            .store
            .stage_metadata_update(&target_id, new_metadata, expected_row_version)?;
        info!(app_id = %target_id, version = row.version, "staged metadata update");
        Ok(row)
    }

    /// Records operator approval of a declared surface, then applies the
    /// metadata unconditionally.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store engine error.
    pub fn approve_and_update(
        &self,
        app: &AppRow,
        new_metadata: Metadata,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        let target_id = self.stage_target(app)?;
        let declared_loads: BTreeSet<String> = new_metadata.loads.iter().cloned().collect();
        self.store
            .set_approved_surface(&target_id, &declared_loads, &new_metadata.permissions)?;
        self.stage_metadata_update(app, new_metadata, true, expected_row_version)
    }

    /// Re-fetches an app's source tree and records it as a new active
    /// version, without changing state (spec.md §4.3's `reload`
    /// transition: `active --reload--> same state`). Dev apps are
    /// re-read from disk; everything else is re-cloned from its git
    /// remote using `settings.git_auth_name`. The declared surface is
    /// re-run through the audit gate exactly like a staged metadata
    /// update unless `audit_override` is set. When `promote_after` is
    /// set and `app` is a stage app, the reloaded stage is immediately
    /// promoted into its prod sibling.
    ///
    /// # Errors
    /// Returns [`RegistryError::SourceFetch`] if the source tree cannot
    /// be re-read, [`RegistryError::NeedsApproval`] if the declared
    /// surface needs operator approval, [`RegistryError::InvalidTransition`]
    /// if `app` is a preview (previews are immutable) or if
    /// `promote_after` is requested for a non-stage app, and
    /// [`RegistryError::Store`] on a store engine error.
    pub fn reload(
        &self,
        app: &AppRow,
        git_branch: Option<&str>,
        git_commit: Option<&str>,
        audit_override: bool,
        promote_after: bool,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        if app.id.kind() == Some(VariantKind::Preview) {
            return Err(RegistryError::InvalidTransition(format!(
                "{}: preview apps cannot be reloaded",
                app.id
            )));
        }
        if promote_after && app.id.kind() != Some(VariantKind::Stage) {
            return Err(RegistryError::InvalidTransition(format!(
                "{}: only stage apps can be reloaded with promote",
                app.id
            )));
        }

        let guard = self.locks.lock(&app.id);
        let lock_scope = guard.enter();

        let resolved = crate::source::resolve(
            &app.source_url,
            app.is_dev,
            git_branch,
            git_commit,
            &app.settings.git_auth_name,
        )?;

        if !audit_override {
            let (approved_loads, approved_permissions) = self.store.get_approved_surface(&app.id)?;
            let declared_loads: BTreeSet<String> = app.metadata.loads.iter().cloned().collect();
            let decision = clace_audit::evaluate(AuditInput {
                declared_loads: &declared_loads,
                declared_permissions: &app.metadata.permissions,
                approved_loads: &approved_loads,
                approved_permissions: &approved_permissions,
            })?;
            if decision.needs_approval {
                return Err(RegistryError::NeedsApproval {
                    new_loads: decision.new_loads_added.len(),
                    new_perms: decision.new_perms_added.len(),
                });
            }
        }

        let row = self
            .store
            .stage_metadata_update(&app.id, app.metadata.clone(), expected_row_version)?;
        self.store.set_files(&app.id, row.version, &resolved.files, &resolved.files_hash)?;
        info!(app_id = %app.id, version = row.version, "reloaded app source");

        if promote_after {
            let prod_path = app
                .path
                .strip_suffix(STAGE_SUFFIX)
                .unwrap_or(app.path.as_str());
            let prod = self
                .store
                .get_app_by_path(&app.domain, prod_path, VariantKind::Prod)?;
            drop(lock_scope);
            return self.promote(&prod, None);
        }

        Ok(row)
    }

    /// Promotes a prod app's stage sibling into prod as a new active
    /// version (spec.md §4.3).
    ///
    /// # Errors
    /// Returns [`RegistryError::InvalidTransition`] if `prod` is not a
    /// prod-kind app, or [`RegistryError::Store`] on a store error.
    pub fn promote(
        &self,
        prod: &AppRow,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        if prod.id.kind() != Some(VariantKind::Prod) {
            return Err(RegistryError::InvalidTransition(format!(
                "{}: only prod apps can be promoted into",
                prod.id
            )));
        }
        let stage_path = format!("{}{STAGE_SUFFIX}", prod.path);
        let stage = self
            .store
            .get_app_by_path(&prod.domain, &stage_path, VariantKind::Stage)?;

        let guard = self.locks.lock(&prod.id);
        let _scope = guard.enter();
        let row = self
            .store
            .promote(&prod.id, stage.metadata, expected_row_version)?;
        info!(app_id = %prod.id, version = row.version, "promoted stage into prod");
        Ok(row)
    }

    /// Activates a different already-recorded version.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if `id` or the target version
    /// does not exist.
    pub fn switch_version(
        &self,
        id: &AppId,
        target: SwitchTarget,
    ) -> Result<VersionRow, RegistryError> {
        let guard = self.locks.lock(id);
        let _scope = guard.enter();
        Ok(self.store.switch_version(id, target)?)
    }

    /// Lists an app's version history.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store engine error.
    pub fn list_versions(&self, id: &AppId) -> Result<Vec<VersionRow>, RegistryError> {
        Ok(self.store.list_versions(id)?)
    }

    /// Links a plugin account name to a concrete account id
    /// (`metadata.accounts`, spec.md §3).
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store or transition error.
    pub fn link_account(
        &self,
        app: &AppRow,
        plugin_account: &str,
        account_id: &str,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        let mut metadata = app.metadata.clone();
        metadata
            .accounts
            .insert(plugin_account.to_string(), account_id.to_string());
        self.stage_metadata_update(app, metadata, true, expected_row_version)
    }

    /// Updates a single app-level parameter value
    /// (`metadata.param_values`, spec.md §3).
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store or transition error.
    pub fn update_param(
        &self,
        app: &AppRow,
        key: &str,
        value: &str,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, RegistryError> {
        let mut metadata = app.metadata.clone();
        metadata.param_values.insert(key.to_string(), value.to_string());
        self.stage_metadata_update(app, metadata, true, expected_row_version)
    }

    /// Mints a fresh bearer token authorizing an unauthenticated reload
    /// trigger for `id` (spec.md §6.1 `app_webhook_token`).
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if `id` does not exist.
    pub fn create_webhook_token(&self, id: &AppId) -> Result<AppWebhookToken, RegistryError> {
        Ok(self.store.create_webhook_token(id)?)
    }

    /// Lists the webhook tokens minted for `id`.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] on a store engine error.
    pub fn list_webhook_tokens(&self, id: &AppId) -> Result<Vec<AppWebhookToken>, RegistryError> {
        Ok(self.store.list_webhook_tokens(id)?)
    }

    /// Revokes a webhook token.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if `token` is unknown.
    pub fn delete_webhook_token(&self, token: &str) -> Result<(), RegistryError> {
        Ok(self.store.delete_webhook_token(token)?)
    }

    /// Resolves a presented webhook token and reloads the app it was
    /// minted for, with no audit override and no promotion — the same
    /// restricted surface a scheduled sync run gets.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] if `token` is unknown or revoked,
    /// and anything [`Registry::reload`] can return otherwise.
    pub fn trigger_webhook_reload(&self, token: &str) -> Result<VersionRow, RegistryError> {
        let id = self.store.find_app_by_webhook_token(token)?;
        let app = self.get_app(&id)?;
        self.reload(&app, None, None, false, false, None)
    }

    /// Declared-but-unapproved permission check without mutating
    /// anything, used by the control API's dry preview of an apply.
    ///
    /// # Errors
    /// Returns [`RegistryError::Store`] or [`RegistryError::Audit`] on a
    /// lookup or evaluation failure.
    pub fn audit_preview(
        &self,
        target: &AppId,
        declared_loads: &BTreeSet<String>,
        declared_permissions: &[Perm],
    ) -> Result<clace_audit::AuditDecision, RegistryError> {
        let (approved_loads, approved_permissions) = self.store.get_approved_surface(target)?;
        Ok(clace_audit::evaluate(AuditInput {
            declared_loads,
            declared_permissions,
            approved_loads: &approved_loads,
            approved_permissions: &approved_permissions,
        })?)
    }
}

#[cfg(test)]
mod tests {
    use clace_core::Metadata;
    use clace_core::Settings;
    use clace_store_sqlite::MetadataStore;

    use super::Registry;

    fn registry() -> Registry {
        Registry::new(MetadataStore::open_in_memory().unwrap())
    }

    #[test]
    fn create_prod_app_also_creates_stage_sibling() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        let stage = registry
            .get_app_by_path("", "/a_cl_stage", clace_core::VariantKind::Stage)
            .unwrap();
        assert_eq!(stage.domain, prod.domain);
    }

    #[test]
    fn stage_update_on_prod_lands_on_stage_sibling() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        let mut next = Metadata::initial("demo", "proxy");
        next.app_config.insert("k".to_string(), "v".to_string());
        let version = registry
            .stage_metadata_update(&prod, next, true, None)
            .unwrap();
        assert_eq!(version.version, 2);
        let prod_unchanged = registry.get_app(&prod.id).unwrap();
        assert_eq!(prod_unchanged.metadata.version_metadata.version, 1);
    }

    #[test]
    fn promote_copies_stage_into_prod() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        let mut next = Metadata::initial("demo", "proxy");
        next.app_config.insert("k".to_string(), "staged".to_string());
        registry
            .stage_metadata_update(&prod, next, true, None)
            .unwrap();
        let promoted = registry.promote(&prod, None).unwrap();
        assert_eq!(
            promoted.metadata.app_config.get("k"),
            Some(&"staged".to_string())
        );
    }

    #[test]
    fn unapproved_new_load_is_rejected() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        let mut next = Metadata::initial("demo", "proxy");
        next.loads.push("fs".to_string());
        let err = registry.stage_metadata_update(&prod, next, false, None).unwrap_err();
        assert!(matches!(err, super::RegistryError::NeedsApproval { .. }));
    }

    #[test]
    fn control_prefix_paths_are_rejected() {
        let registry = registry();
        let err = registry
            .create_prod_app("", "/_clace/app", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap_err();
        assert!(matches!(err, super::RegistryError::ControlPathShadow(_)));
    }

    #[test]
    fn preview_apps_are_published_to_the_router() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        registry
            .create_preview(&prod, "deadbeef", Metadata::initial("demo", "proxy"))
            .unwrap();
        let snapshot = registry.router().snapshot();
        assert!(snapshot.dispatch("", "/a_cl_preview_deadbeef", "").is_some());
    }

    #[test]
    fn reload_dev_app_picks_up_new_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.star"), "x").unwrap();
        let registry = registry();
        let dev = registry
            .create_dev_app(
                "",
                "/a",
                dir.path().to_str().unwrap(),
                Settings::default(),
                Metadata::initial("demo", "proxy"),
            )
            .unwrap();

        let before = registry.reload(&dev, None, None, true, false, None).unwrap();
        assert_eq!(before.version, 2);

        std::fs::write(dir.path().join("extra.star"), "y").unwrap();
        let after = registry.reload(&dev, None, None, true, false, None).unwrap();
        assert_eq!(after.version, 3);

        let files = registry.store().list_files(&dev.id, None).unwrap();
        assert_eq!(files, vec!["app.star".to_string(), "extra.star".to_string()]);
    }

    #[test]
    fn reload_rejects_preview_apps() {
        let registry = registry();
        let prod = registry
            .create_prod_app("", "/a", ".", Settings::default(), Metadata::initial("demo", "proxy"))
            .unwrap();
        let preview = registry
            .create_preview(&prod, "deadbeef", Metadata::initial("demo", "proxy"))
            .unwrap();
        let err = registry.reload(&preview, None, None, true, false, None).unwrap_err();
        assert!(matches!(err, super::RegistryError::InvalidTransition(_)));
    }
}
