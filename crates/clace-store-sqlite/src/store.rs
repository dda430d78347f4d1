// crates/clace-store-sqlite/src/store.rs
// ============================================================================
// Module: SQLite Metadata Store
// Description: Durable MetadataStore backed by SQLite WAL (spec.md §4.1).
// Purpose: Persist app rows, version rows, sync entries, and audit log
//          entries with optimistic concurrency on app row versions.
// Dependencies: clace-core, rusqlite, serde_json, thiserror
// ============================================================================

//! ## Overview
//! Every state-changing operation here runs inside a single `SQLite`
//! transaction and bumps the affected app's `row_version` counter and
//! `updated_at` timestamp (spec.md §4.1 "Consistency"). Callers pass the
//! `row_version` they last observed; a mismatch is reported as
//! [`StoreError::Conflict`] rather than silently overwritten. Retries for a
//! conflicting write live in `clace-registry`, not here.
//!
//! Security posture: the database file is a trusted, locally-owned
//! resource; this module does not sanitize stored blobs beyond what
//! `rusqlite`'s parameterized queries already guarantee.

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::collections::BTreeSet;
use std::path::Path;
use std::path::PathBuf;
use std::sync::Mutex;

use clace_core::AppId;
use clace_core::AppRow;
use clace_core::AppWebhookToken;
use clace_core::AuditLogEntry;
use clace_core::AuditLogKind;
use clace_core::ClaceError;
use clace_core::Metadata;
use clace_core::Settings;
use clace_core::SyncEntry;
use clace_core::SyncMetadata;
use clace_core::SyncStatus;
use clace_core::Timestamp;
use clace_core::VariantKind;
use clace_core::VersionRow;
use rusqlite::Connection;
use rusqlite::OpenFlags;
use rusqlite::OptionalExtension;
use rusqlite::params;
use thiserror::Error;

// ============================================================================
// SECTION: Constants
// ============================================================================

/// `SQLite` schema version for the store.
const SCHEMA_VERSION: i64 = 1;
/// Default busy timeout (ms) before `SQLITE_BUSY` is surfaced.
const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Metadata store errors.
///
/// # Invariants
/// - Variants are stable for programmatic handling by `clace-registry`.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` engine error.
    #[error("store db error: {0}")]
    Db(String),
    /// No row matched the request.
    #[error("not found: {0}")]
    NotFound(String),
    /// A row with the same identity already exists.
    #[error("duplicate: {0}")]
    Duplicate(String),
    /// The caller's expected row version did not match the stored one.
    #[error("conflict on {0}: expected row version {1}, found {2}")]
    Conflict(String, i64, i64),
    /// Malformed input rejected before any SQL ran.
    #[error("invalid: {0}")]
    Invalid(String),
    /// A stored JSON blob failed to (de)serialize; indicates corruption.
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        Self::Corrupt(err.to_string())
    }
}

impl From<StoreError> for ClaceError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound(m) => Self::NotFound(m),
            StoreError::Duplicate(m) => Self::Duplicate(m),
            StoreError::Conflict(id, expected, actual) => {
                Self::Conflict(format!("{id}: expected row version {expected}, found {actual}"))
            }
            StoreError::Invalid(m) => Self::InvalidArgument(m),
            StoreError::Db(m) | StoreError::Corrupt(m) => Self::Internal(m),
        }
    }
}

// ============================================================================
// SECTION: Store
// ============================================================================

/// Durable, transactional metadata store (spec.md §4.1).
///
/// # Invariants
/// - All state-changing operations run inside a single serializable
///   `SQLite` transaction.
/// - `apps.row_version` increments on every state-changing operation
///   against that app, forming the optimistic-concurrency token.
pub struct MetadataStore {
    conn: Mutex<Connection>,
}

/// `switch_version` target selector (spec.md §4.1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchTarget {
    /// Activate this exact version number.
    Explicit(i64),
    /// Activate the version immediately before the current active one.
    Previous,
    /// Activate the version immediately after the current active one.
    Next,
    /// Shorthand for [`SwitchTarget::Previous`].
    Revert,
}

impl MetadataStore {
    /// Opens (creating if necessary) the store at `path`.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] if the file cannot be opened or the
    /// schema cannot be initialized.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path: PathBuf = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).map_err(|err| StoreError::Db(err.to_string()))?;
        }
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
        let mut conn = Connection::open_with_flags(&path, flags)?;
        apply_pragmas(&conn)?;
        initialize_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Opens an in-memory store, used by tests and dry-run apply.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] if the schema cannot be initialized.
    pub fn open_in_memory() -> Result<Self, StoreError> {
        let mut conn = Connection::open_in_memory()?;
        apply_pragmas(&conn)?;
        initialize_schema(&mut conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, Connection>, StoreError> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Db("store mutex poisoned".to_string()))
    }

    // ------------------------------------------------------------------
    // App CRUD
    // ------------------------------------------------------------------

    /// Creates an app row and its initial (active) version row atomically.
    ///
    /// # Errors
    /// Returns [`StoreError::Duplicate`] if an app of the same variant
    /// kind already exists at `(domain, path)`.
    pub fn create_app(
        &self,
        app: &AppRow,
        initial_version: &VersionRow,
    ) -> Result<(), StoreError> {
        let kind_prefix = app
            .id
            .kind()
            .ok_or_else(|| StoreError::Invalid(format!("id has no recognizable kind: {}", app.id)))?
            .prefix();
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let exists: Option<String> = tx
            .query_row(
                "SELECT id FROM apps WHERE domain = ?1 AND path = ?2 AND id LIKE ?3 || '%' LIMIT 1",
                params![app.domain, app.path, kind_prefix],
                |row| row.get(0),
            )
            .optional()?;
        if exists.is_some() {
            return Err(StoreError::Duplicate(format!(
                "{}:{} ({kind_prefix}*)",
                app.domain, app.path
            )));
        }
        let settings_json = serde_json::to_string(&app.settings)?;
        tx.execute(
            "INSERT INTO apps (id, domain, path, source_url, is_dev, settings_json, create_time,
                                updated_at, row_version, approved_loads_json, approved_permissions_json,
                                last_active_version)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, 1, '[]', '[]', NULL)",
            params![
                app.id.as_str(),
                app.domain,
                app.path,
                app.source_url,
                i64::from(app.is_dev),
                settings_json,
                app.create_time.as_millis(),
            ],
        )?;
        insert_version_row(&tx, initial_version)?;
        tx.commit()?;
        Ok(())
    }

    /// Fetches an app row by id.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such app exists.
    pub fn get_app(&self, id: &AppId) -> Result<AppRow, StoreError> {
        let guard = self.lock()?;
        read_app(&guard, id)
    }

    /// Fetches an app row by `(domain, path, kind)`.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such app exists.
    pub fn get_app_by_path(
        &self,
        domain: &str,
        path: &str,
        kind: VariantKind,
    ) -> Result<AppRow, StoreError> {
        let guard = self.lock()?;
        let id: String = guard
            .query_row(
                "SELECT id FROM apps WHERE domain = ?1 AND path = ?2 AND id LIKE ?3 || '%' LIMIT 1",
                params![domain, path, kind.prefix()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("{domain}:{path} ({})", kind.prefix())))?;
        read_app(&guard, &AppId::from_raw(id))
    }

    /// Lists every app row, most-recently-created last.
    ///
    /// Glob filtering is the caller's responsibility
    /// ([`clace_core::PathSpec::matches`]); this keeps the store free of
    /// glob-parsing concerns.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn list_apps(&self) -> Result<Vec<AppRow>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard.prepare("SELECT id FROM apps ORDER BY create_time ASC, id ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter()
            .map(|id| read_app(&guard, &AppId::from_raw(id.clone())))
            .collect()
    }

    /// Updates unversioned settings on an app, returning the updated row.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the app does not exist, or
    /// [`StoreError::Conflict`] if `expected_row_version` is supplied and
    /// does not match the stored value.
    pub fn update_settings(
        &self,
        id: &AppId,
        patch: impl FnOnce(&mut Settings),
        expected_row_version: Option<i64>,
    ) -> Result<AppRow, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let (mut settings, row_version) = {
            let (settings_json, row_version): (String, i64) = tx
                .query_row(
                    "SELECT settings_json, row_version FROM apps WHERE id = ?1",
                    params![id.as_str()],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
            (serde_json::from_str::<Settings>(&settings_json)?, row_version)
        };
        check_row_version(id, row_version, expected_row_version)?;
        patch(&mut settings);
        let settings_json = serde_json::to_string(&settings)?;
        let now = Timestamp::now().as_millis();
        tx.execute(
            "UPDATE apps SET settings_json = ?1, updated_at = ?2, row_version = row_version + 1
             WHERE id = ?3",
            params![settings_json, now, id.as_str()],
        )?;
        let updated = read_app(&tx, id)?;
        tx.commit()?;
        Ok(updated)
    }

    /// Applies a staged metadata update (spec.md §4.1, §4.3 transition
    /// table): appends a new version row to `target`'s own history,
    /// always immediately activating it. Callers decide, from `target`'s
    /// [`VariantKind`], whether `target` is the stage sibling to touch or
    /// a direct target (dev/stage).
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `target` does not exist, or
    /// [`StoreError::Conflict`] on a row-version mismatch.
    pub fn stage_metadata_update(
        &self,
        target: &AppId,
        new_metadata: Metadata,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let row_version: i64 = tx
            .query_row(
                "SELECT row_version FROM apps WHERE id = ?1",
                params![target.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(target.to_string()))?;
        check_row_version(target, row_version, expected_row_version)?;
        let current_active = active_version_number(&tx, target)?;
        let next_version = current_active + 1;
        let row = VersionRow {
            app_id: target.clone(),
            version: next_version,
            previous_version: Some(current_active),
            active: true,
            create_time: Timestamp::now(),
            metadata: new_metadata,
            files_hash: String::new(),
        };
        tx.execute(
            "UPDATE versions SET active = 0 WHERE app_id = ?1 AND active = 1",
            params![target.as_str()],
        )?;
        insert_version_row(&tx, &row)?;
        tx.execute(
            "UPDATE apps SET updated_at = ?1, row_version = row_version + 1, last_active_version = ?3 WHERE id = ?2",
            params![Timestamp::now().as_millis(), target.as_str(), current_active],
        )?;
        tx.commit()?;
        Ok(row)
    }

    /// Promotes `stage_active_metadata` into `prod_id` as a new active
    /// version, leaving the stage's own history untouched.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `prod_id` does not exist, or
    /// [`StoreError::Conflict`] on a row-version mismatch.
    pub fn promote(
        &self,
        prod_id: &AppId,
        stage_active_metadata: Metadata,
        expected_row_version: Option<i64>,
    ) -> Result<VersionRow, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let row_version: i64 = tx
            .query_row(
                "SELECT row_version FROM apps WHERE id = ?1",
                params![prod_id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(prod_id.to_string()))?;
        check_row_version(prod_id, row_version, expected_row_version)?;
        let current_active = active_version_number(&tx, prod_id)?;
        let next_version = current_active + 1;
        let mut metadata = stage_active_metadata;
        metadata.version_metadata.previous_version = Some(current_active);
        metadata.version_metadata.version = next_version;
        let row = VersionRow {
            app_id: prod_id.clone(),
            version: next_version,
            previous_version: Some(current_active),
            active: true,
            create_time: Timestamp::now(),
            metadata,
            files_hash: String::new(),
        };
        tx.execute(
            "UPDATE versions SET active = 0 WHERE app_id = ?1 AND active = 1",
            params![prod_id.as_str()],
        )?;
        insert_version_row(&tx, &row)?;
        tx.execute(
            "UPDATE apps SET updated_at = ?1, row_version = row_version + 1, last_active_version = ?3 WHERE id = ?2",
            params![Timestamp::now().as_millis(), prod_id.as_str(), current_active],
        )?;
        tx.commit()?;
        Ok(row)
    }

    /// Activates a different, already-recorded version row.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `id` or the target version does
    /// not exist (including an out-of-range previous/next/revert).
    pub fn switch_version(&self, id: &AppId, target: SwitchTarget) -> Result<VersionRow, StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let active_version: i64 = tx
            .query_row(
                "SELECT version FROM versions WHERE app_id = ?1 AND active = 1",
                params![id.as_str()],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        let last_active: Option<i64> = tx.query_row(
            "SELECT last_active_version FROM apps WHERE id = ?1",
            params![id.as_str()],
            |row| row.get(0),
        )?;
        let target_version = match target {
            SwitchTarget::Explicit(v) => v,
            SwitchTarget::Previous | SwitchTarget::Revert => last_active.ok_or_else(|| {
                StoreError::NotFound(format!("{id}: no version before {active_version}"))
            })?,
            SwitchTarget::Next => {
                let next: Option<i64> = tx
                    .query_row(
                        "SELECT MIN(version) FROM versions WHERE app_id = ?1 AND version > ?2",
                        params![id.as_str(), active_version],
                        |row| row.get(0),
                    )
                    .optional()?
                    .flatten();
                next.ok_or_else(|| {
                    StoreError::NotFound(format!("{id}: no version after {active_version}"))
                })?
            }
        };
        let exists: bool = tx
            .query_row(
                "SELECT 1 FROM versions WHERE app_id = ?1 AND version = ?2",
                params![id.as_str(), target_version],
                |_| Ok(true),
            )
            .optional()?
            .unwrap_or(false);
        if !exists {
            return Err(StoreError::NotFound(format!(
                "{id}: no such version {target_version}"
            )));
        }
        tx.execute(
            "UPDATE versions SET active = 0 WHERE app_id = ?1 AND active = 1",
            params![id.as_str()],
        )?;
        tx.execute(
            "UPDATE versions SET active = 1 WHERE app_id = ?1 AND version = ?2",
            params![id.as_str(), target_version],
        )?;
        tx.execute(
            "UPDATE apps SET updated_at = ?1, row_version = row_version + 1, last_active_version = ?3 WHERE id = ?2",
            params![Timestamp::now().as_millis(), id.as_str(), active_version],
        )?;
        let row = read_version(&tx, id, target_version)?;
        tx.commit()?;
        Ok(row)
    }

    /// Deletes an app and its entire version history.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the app does not exist.
    pub fn delete_app(&self, id: &AppId) -> Result<(), StoreError> {
        let mut guard = self.lock()?;
        let tx = guard.transaction()?;
        let deleted = tx.execute("DELETE FROM apps WHERE id = ?1", params![id.as_str()])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        tx.execute("DELETE FROM versions WHERE app_id = ?1", params![id.as_str()])?;
        tx.commit()?;
        Ok(())
    }

    /// Records a freshly approved loads/permissions surface for an app.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the app does not exist.
    pub fn set_approved_surface(
        &self,
        id: &AppId,
        loads: &BTreeSet<String>,
        permissions: &[clace_core::Perm],
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let loads_json = serde_json::to_string(loads)?;
        let perms_json = serde_json::to_string(permissions)?;
        let updated = guard.execute(
            "UPDATE apps SET approved_loads_json = ?1, approved_permissions_json = ?2,
                              updated_at = ?3, row_version = row_version + 1
             WHERE id = ?4",
            params![loads_json, perms_json, Timestamp::now().as_millis(), id.as_str()],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Reads the approved loads/permissions surface for an app.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the app does not exist.
    pub fn get_approved_surface(
        &self,
        id: &AppId,
    ) -> Result<(BTreeSet<String>, Vec<clace_core::Perm>), StoreError> {
        let guard = self.lock()?;
        let (loads_json, perms_json): (String, String) = guard
            .query_row(
                "SELECT approved_loads_json, approved_permissions_json FROM apps WHERE id = ?1",
                params![id.as_str()],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        Ok((
            serde_json::from_str(&loads_json)?,
            serde_json::from_str(&perms_json)?,
        ))
    }

    /// Lists the version history of an app, oldest first.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn list_versions(&self, id: &AppId) -> Result<Vec<VersionRow>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard.prepare(
            "SELECT version FROM versions WHERE app_id = ?1 ORDER BY version ASC",
        )?;
        let versions: Vec<i64> = stmt
            .query_map(params![id.as_str()], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        versions
            .into_iter()
            .map(|v| read_version(&guard, id, v))
            .collect()
    }

    /// Lists the files recorded against a version (or the active version
    /// when `version` is `None`). The core stores only a flat relative
    /// path list supplied by the caller at version-creation time; actual
    /// file contents live outside this store (see spec.md §1 scope note
    /// on the scripting/plugin runtime).
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the app or version is missing.
    pub fn list_files(&self, id: &AppId, version: Option<i64>) -> Result<Vec<String>, StoreError> {
        let guard = self.lock()?;
        let version = match version {
            Some(v) => v,
            None => active_version_number(&guard, id)?,
        };
        let files_json: String = guard
            .query_row(
                "SELECT files_json FROM versions WHERE app_id = ?1 AND version = ?2",
                params![id.as_str(), version],
                |row| row.get(0),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound(format!("{id}@{version}")))?;
        Ok(serde_json::from_str(&files_json)?)
    }

    /// Records the file list and content hash for a version (used by the
    /// registry after a source fetch recomputes the tree).
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if the version does not exist.
    pub fn set_files(
        &self,
        id: &AppId,
        version: i64,
        files: &[String],
        files_hash: &str,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let files_json = serde_json::to_string(files)?;
        let updated = guard.execute(
            "UPDATE versions SET files_json = ?1, files_hash = ?2 WHERE app_id = ?3 AND version = ?4",
            params![files_json, files_hash, id.as_str(), version],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(format!("{id}@{version}")));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Sync entries
    // ------------------------------------------------------------------

    /// Creates a sync entry.
    ///
    /// # Errors
    /// Returns [`StoreError::Duplicate`] if the id already exists.
    pub fn create_sync(&self, entry: &SyncEntry) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let metadata_json = serde_json::to_string(&entry.metadata)?;
        let status_json = serde_json::to_string(&entry.status)?;
        let result = guard.execute(
            "INSERT INTO sync_entries (id, path, metadata_json, status_json) VALUES (?1, ?2, ?3, ?4)",
            params![entry.id, entry.path, metadata_json, status_json],
        );
        match result {
            Ok(_) => Ok(()),
            Err(rusqlite::Error::SqliteFailure(e, _))
                if e.code == rusqlite::ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate(entry.id.clone()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Fetches a sync entry by id.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such entry exists.
    pub fn get_sync(&self, id: &str) -> Result<SyncEntry, StoreError> {
        let guard = self.lock()?;
        read_sync(&guard, id)
    }

    /// Lists every sync entry.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn list_syncs(&self) -> Result<Vec<SyncEntry>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard.prepare("SELECT id FROM sync_entries ORDER BY id ASC")?;
        let ids: Vec<String> = stmt
            .query_map(params![], |row| row.get(0))?
            .collect::<Result<_, _>>()?;
        drop(stmt);
        ids.iter().map(|id| read_sync(&guard, id)).collect()
    }

    /// Deletes a sync entry.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such entry exists.
    pub fn delete_sync(&self, id: &str) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let deleted = guard.execute("DELETE FROM sync_entries WHERE id = ?1", params![id])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Overwrites a sync entry's observable status.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such entry exists.
    pub fn update_sync_status(&self, id: &str, status: &SyncStatus) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let status_json = serde_json::to_string(status)?;
        let updated = guard.execute(
            "UPDATE sync_entries SET status_json = ?1 WHERE id = ?2",
            params![status_json, id],
        )?;
        if updated == 0 {
            return Err(StoreError::NotFound(id.to_string()));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Audit log
    // ------------------------------------------------------------------

    /// Appends an audit log entry.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn append_audit_log(&self, entry: &AuditLogEntry) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let kind = audit_kind_label(entry.kind);
        guard.execute(
            "INSERT INTO audit_log (event_id, create_time, kind, app_id, user_id, request_id, status, detail_blob)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                entry.event_id,
                entry.create_time.as_millis(),
                kind,
                entry.app_id.as_ref().map(AppId::as_str),
                entry.user_id,
                entry.request_id,
                entry.status,
                entry.detail_blob,
            ],
        )?;
        Ok(())
    }

    /// Lists the most recent audit log entries, optionally filtered by
    /// kind, newest first.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn list_audit_log(
        &self,
        kind: Option<AuditLogKind>,
        limit: i64,
    ) -> Result<Vec<AuditLogEntry>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = match kind {
            Some(_) => guard.prepare(
                "SELECT event_id, create_time, kind, app_id, user_id, request_id, status, detail_blob
                 FROM audit_log WHERE kind = ?1 ORDER BY create_time DESC LIMIT ?2",
            )?,
            None => guard.prepare(
                "SELECT event_id, create_time, kind, app_id, user_id, request_id, status, detail_blob
                 FROM audit_log ORDER BY create_time DESC LIMIT ?1",
            )?,
        };
        let rows = if let Some(k) = kind {
            stmt.query_map(params![audit_kind_label(k), limit], map_audit_row)?
                .collect::<Result<Vec<_>, _>>()?
        } else {
            stmt.query_map(params![limit], map_audit_row)?
                .collect::<Result<Vec<_>, _>>()?
        };
        Ok(rows)
    }

    /// Deletes audit entries of `kind` older than `cutoff`.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn prune_audit_log(&self, kind: AuditLogKind, cutoff: Timestamp) -> Result<usize, StoreError> {
        let guard = self.lock()?;
        let deleted = guard.execute(
            "DELETE FROM audit_log WHERE kind = ?1 AND create_time < ?2",
            params![audit_kind_label(kind), cutoff.as_millis()],
        )?;
        Ok(deleted)
    }

    // ------------------------------------------------------------------
    // Apply baseline (non-declarative-change comparator, SPEC_FULL §4)
    // ------------------------------------------------------------------

    /// Reads the field value recorded at the end of the previous
    /// successful apply of `file_path` for `(domain, path, field_name)`.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn get_apply_baseline(
        &self,
        file_path: &str,
        domain: &str,
        app_path: &str,
        field_name: &str,
    ) -> Result<Option<String>, StoreError> {
        let guard = self.lock()?;
        Ok(guard
            .query_row(
                "SELECT field_value FROM apply_baseline
                 WHERE file_path = ?1 AND app_domain = ?2 AND app_path = ?3 AND field_name = ?4",
                params![file_path, domain, app_path, field_name],
                |row| row.get(0),
            )
            .optional()?)
    }

    /// Records the field value observed at the end of a successful apply,
    /// for future "non-declarative change" comparisons.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn set_apply_baseline(
        &self,
        file_path: &str,
        domain: &str,
        app_path: &str,
        field_name: &str,
        value: &str,
    ) -> Result<(), StoreError> {
        let guard = self.lock()?;
        guard.execute(
            "INSERT INTO apply_baseline (file_path, app_domain, app_path, field_name, field_value)
             VALUES (?1, ?2, ?3, ?4, ?5)
             ON CONFLICT(file_path, app_domain, app_path, field_name)
             DO UPDATE SET field_value = excluded.field_value",
            params![file_path, domain, app_path, field_name, value],
        )?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // App webhook tokens
    // ------------------------------------------------------------------

    /// Mints and stores a fresh bearer token authorizing an
    /// unauthenticated reload trigger for `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn create_webhook_token(&self, id: &AppId) -> Result<AppWebhookToken, StoreError> {
        let guard = self.lock()?;
        let token = random_webhook_token();
        let create_time = Timestamp::now();
        guard.execute(
            "INSERT INTO app_webhook_tokens (token, app_id, create_time) VALUES (?1, ?2, ?3)",
            params![token, id.as_str(), create_time.as_millis()],
        )?;
        Ok(AppWebhookToken {
            token,
            app_id: id.clone(),
            create_time,
        })
    }

    /// Lists every webhook token minted for `id`.
    ///
    /// # Errors
    /// Returns [`StoreError::Db`] on an engine error.
    pub fn list_webhook_tokens(&self, id: &AppId) -> Result<Vec<AppWebhookToken>, StoreError> {
        let guard = self.lock()?;
        let mut stmt = guard.prepare(
            "SELECT token, app_id, create_time FROM app_webhook_tokens WHERE app_id = ?1 ORDER BY create_time ASC",
        )?;
        let rows = stmt
            .query_map(params![id.as_str()], |row| {
                let create_time_ms: i64 = row.get(2)?;
                Ok(AppWebhookToken {
                    token: row.get(0)?,
                    app_id: AppId::from_raw(row.get::<_, String>(1)?),
                    create_time: Timestamp::from_millis(create_time_ms),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Revokes a webhook token.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if no such token exists.
    pub fn delete_webhook_token(&self, token: &str) -> Result<(), StoreError> {
        let guard = self.lock()?;
        let deleted = guard.execute("DELETE FROM app_webhook_tokens WHERE token = ?1", params![token])?;
        if deleted == 0 {
            return Err(StoreError::NotFound(token.to_string()));
        }
        Ok(())
    }

    /// Resolves a presented bearer token to the app id it was minted
    /// for.
    ///
    /// # Errors
    /// Returns [`StoreError::NotFound`] if `token` is unknown or revoked.
    pub fn find_app_by_webhook_token(&self, token: &str) -> Result<AppId, StoreError> {
        let guard = self.lock()?;
        guard
            .query_row(
                "SELECT app_id FROM app_webhook_tokens WHERE token = ?1",
                params![token],
                |row| row.get::<_, String>(0),
            )
            .optional()?
            .map(AppId::from_raw)
            .ok_or_else(|| StoreError::NotFound("webhook token".to_string()))
    }
}

fn random_webhook_token() -> String {
    use rand::RngCore;
    let mut bytes = [0_u8; 20];
    rand::rngs::OsRng.fill_bytes(&mut bytes);
    data_encoding::BASE32_NOPAD.encode(&bytes).to_lowercase()
}

// ============================================================================
// SECTION: Free functions
// ============================================================================

fn check_row_version(
    id: &AppId,
    actual: i64,
    expected: Option<i64>,
) -> Result<(), StoreError> {
    match expected {
        Some(expected) if expected != actual => {
            Err(StoreError::Conflict(id.to_string(), expected, actual))
        }
        _ => Ok(()),
    }
}

fn audit_kind_label(kind: AuditLogKind) -> &'static str {
    match kind {
        AuditLogKind::Http => "http",
        AuditLogKind::System => "system",
        AuditLogKind::Action => "action",
        AuditLogKind::Custom => "custom",
    }
}

fn audit_kind_from_label(label: &str) -> Result<AuditLogKind, StoreError> {
    match label {
        "http" => Ok(AuditLogKind::Http),
        "system" => Ok(AuditLogKind::System),
        "action" => Ok(AuditLogKind::Action),
        "custom" => Ok(AuditLogKind::Custom),
        other => Err(StoreError::Corrupt(format!("unknown audit kind: {other}"))),
    }
}

fn map_audit_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<AuditLogEntry> {
    let kind_label: String = row.get(2)?;
    let app_id: Option<String> = row.get(3)?;
    Ok(AuditLogEntry {
        event_id: row.get(0)?,
        create_time: Timestamp::from_millis(row.get(1)?),
        kind: audit_kind_from_label(&kind_label).unwrap_or(AuditLogKind::Custom),
        app_id: app_id.map(AppId::from_raw),
        user_id: row.get(4)?,
        request_id: row.get(5)?,
        status: row.get(6)?,
        detail_blob: row.get(7)?,
    })
}

fn insert_version_row(conn: &Connection, row: &VersionRow) -> Result<(), StoreError> {
    let metadata_json = serde_json::to_string(&row.metadata)?;
    conn.execute(
        "INSERT INTO versions (app_id, version, previous_version, active, create_time,
                                metadata_json, files_hash, files_json)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, '[]')",
        params![
            row.app_id.as_str(),
            row.version,
            row.previous_version,
            i64::from(row.active),
            row.create_time.as_millis(),
            metadata_json,
            row.files_hash,
        ],
    )?;
    Ok(())
}

fn read_app(conn: &Connection, id: &AppId) -> Result<AppRow, StoreError> {
    let (domain, path, source_url, is_dev, settings_json, create_time): (
        String,
        String,
        String,
        i64,
        String,
        i64,
    ) = conn
        .query_row(
            "SELECT domain, path, source_url, is_dev, settings_json, create_time FROM apps WHERE id = ?1",
            params![id.as_str()],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    let active_version = active_version_number(conn, id)?;
    let metadata = read_version(conn, id, active_version)?.metadata;
    Ok(AppRow {
        id: id.clone(),
        domain,
        path,
        source_url,
        is_dev: is_dev != 0,
        settings: serde_json::from_str(&settings_json)?,
        metadata,
        create_time: Timestamp::from_millis(create_time),
    })
}

fn active_version_number(conn: &Connection, id: &AppId) -> Result<i64, StoreError> {
    conn.query_row(
        "SELECT version FROM versions WHERE app_id = ?1 AND active = 1",
        params![id.as_str()],
        |row| row.get(0),
    )
    .optional()?
    .ok_or_else(|| StoreError::NotFound(format!("{id}: no active version")))
}

fn read_version(conn: &Connection, id: &AppId, version: i64) -> Result<VersionRow, StoreError> {
    let (previous_version, active, create_time, metadata_json, files_hash): (
        Option<i64>,
        i64,
        i64,
        String,
        String,
    ) = conn
        .query_row(
            "SELECT previous_version, active, create_time, metadata_json, files_hash
             FROM versions WHERE app_id = ?1 AND version = ?2",
            params![id.as_str(), version],
            |row| {
                Ok((
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                ))
            },
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(format!("{id}@{version}")))?;
    Ok(VersionRow {
        app_id: id.clone(),
        version,
        previous_version,
        active: active != 0,
        create_time: Timestamp::from_millis(create_time),
        metadata: serde_json::from_str(&metadata_json)?,
        files_hash,
    })
}

fn read_sync(conn: &Connection, id: &str) -> Result<SyncEntry, StoreError> {
    let (path, metadata_json, status_json): (String, String, String) = conn
        .query_row(
            "SELECT path, metadata_json, status_json FROM sync_entries WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
        )
        .optional()?
        .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
    Ok(SyncEntry {
        id: id.to_string(),
        path,
        metadata: serde_json::from_str::<SyncMetadata>(&metadata_json)?,
        status: serde_json::from_str::<SyncStatus>(&status_json)?,
    })
}

fn apply_pragmas(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch("PRAGMA foreign_keys = ON; PRAGMA journal_mode = WAL; PRAGMA synchronous = NORMAL;")?;
    conn.busy_timeout(std::time::Duration::from_millis(DEFAULT_BUSY_TIMEOUT_MS))?;
    Ok(())
}

fn initialize_schema(conn: &mut Connection) -> Result<(), StoreError> {
    let tx = conn.transaction()?;
    tx.execute_batch("CREATE TABLE IF NOT EXISTS store_meta (version INTEGER NOT NULL);")?;
    let version: Option<i64> = tx
        .query_row("SELECT version FROM store_meta LIMIT 1", params![], |row| row.get(0))
        .optional()?;
    if version.is_none() {
        tx.execute("INSERT INTO store_meta (version) VALUES (?1)", params![SCHEMA_VERSION])?;
        tx.execute_batch(
            "CREATE TABLE apps (
                id TEXT PRIMARY KEY,
                domain TEXT NOT NULL,
                path TEXT NOT NULL,
                source_url TEXT NOT NULL,
                is_dev INTEGER NOT NULL,
                settings_json TEXT NOT NULL,
                create_time INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                row_version INTEGER NOT NULL,
                approved_loads_json TEXT NOT NULL,
                approved_permissions_json TEXT NOT NULL,
                last_active_version INTEGER
            );
            CREATE INDEX idx_apps_domain_path ON apps (domain, path);

            CREATE TABLE versions (
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                version INTEGER NOT NULL,
                previous_version INTEGER,
                active INTEGER NOT NULL,
                create_time INTEGER NOT NULL,
                metadata_json TEXT NOT NULL,
                files_hash TEXT NOT NULL,
                files_json TEXT NOT NULL DEFAULT '[]',
                PRIMARY KEY (app_id, version)
            );
            CREATE INDEX idx_versions_app_active ON versions (app_id, active);

            CREATE TABLE sync_entries (
                id TEXT PRIMARY KEY,
                path TEXT NOT NULL,
                metadata_json TEXT NOT NULL,
                status_json TEXT NOT NULL
            );

            CREATE TABLE audit_log (
                event_id TEXT PRIMARY KEY,
                create_time INTEGER NOT NULL,
                kind TEXT NOT NULL,
                app_id TEXT,
                user_id TEXT,
                request_id TEXT,
                status TEXT NOT NULL,
                detail_blob TEXT NOT NULL
            );
            CREATE INDEX idx_audit_kind_time ON audit_log (kind, create_time);

            CREATE TABLE apply_baseline (
                file_path TEXT NOT NULL,
                app_domain TEXT NOT NULL,
                app_path TEXT NOT NULL,
                field_name TEXT NOT NULL,
                field_value TEXT NOT NULL,
                PRIMARY KEY (file_path, app_domain, app_path, field_name)
            );

            CREATE TABLE app_webhook_tokens (
                token TEXT PRIMARY KEY,
                app_id TEXT NOT NULL REFERENCES apps(id) ON DELETE CASCADE,
                create_time INTEGER NOT NULL
            );
            CREATE INDEX idx_app_webhook_tokens_app_id ON app_webhook_tokens (app_id);",
        )?;
    }
    tx.commit()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use clace_core::AppId;
    use clace_core::AppRow;
    use clace_core::Metadata;
    use clace_core::Settings;
    use clace_core::Timestamp;
    use clace_core::VersionRow;

    use super::MetadataStore;
    use super::StoreError;
    use super::SwitchTarget;

    fn new_app(id: AppId, domain: &str, path: &str) -> (AppRow, VersionRow) {
        let metadata = Metadata::initial("demo", "proxy");
        let app = AppRow {
            id: id.clone(),
            domain: domain.to_string(),
            path: path.to_string(),
            source_url: ".".to_string(),
            is_dev: false,
            settings: Settings::default(),
            metadata: metadata.clone(),
            create_time: Timestamp::now(),
        };
        let version = VersionRow {
            app_id: id,
            version: 1,
            previous_version: None,
            active: true,
            create_time: Timestamp::now(),
            metadata,
            files_hash: String::new(),
        };
        (app, version)
    }

    #[test]
    fn create_then_get_round_trips() {
        let store = MetadataStore::open_in_memory().unwrap();
        let id = AppId::new_prod();
        let (app, version) = new_app(id.clone(), "", "/a");
        store.create_app(&app, &version).unwrap();
        let fetched = store.get_app(&id).unwrap();
        assert_eq!(fetched.path, "/a");
        assert_eq!(fetched.metadata.version_metadata.version, 1);
    }

    #[test]
    fn duplicate_same_kind_same_path_is_rejected() {
        let store = MetadataStore::open_in_memory().unwrap();
        let id1 = AppId::new_prod();
        let (app1, version1) = new_app(id1, "", "/a");
        store.create_app(&app1, &version1).unwrap();
        let id2 = AppId::new_prod();
        let (app2, version2) = new_app(id2, "", "/a");
        let err = store.create_app(&app2, &version2).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate(_)));
    }

    #[test]
    fn stage_update_then_switch_back_and_forth() {
        let store = MetadataStore::open_in_memory().unwrap();
        let id = AppId::new_stage();
        let (app, version) = new_app(id.clone(), "", "/a_cl_stage");
        store.create_app(&app, &version).unwrap();

        let mut v2 = Metadata::initial("demo", "proxy");
        v2.app_config.insert("k".to_string(), "v".to_string());
        store.stage_metadata_update(&id, v2, None).unwrap();
        let active = store.get_app(&id).unwrap();
        assert_eq!(active.metadata.version_metadata.version, 2);

        let mut v3 = Metadata::initial("demo", "proxy");
        v3.app_config.insert("k2".to_string(), "v2".to_string());
        store.stage_metadata_update(&id, v3, None).unwrap();

        let reverted = store.switch_version(&id, SwitchTarget::Revert).unwrap();
        assert_eq!(reverted.version, 2);
        let reverted_again = store.switch_version(&id, SwitchTarget::Revert).unwrap();
        assert_eq!(reverted_again.version, 3);
    }

    #[test]
    fn row_version_conflict_is_detected() {
        let store = MetadataStore::open_in_memory().unwrap();
        let id = AppId::new_prod();
        let (app, version) = new_app(id.clone(), "", "/a");
        store.create_app(&app, &version).unwrap();
        let err = store
            .update_settings(&id, |s| s.stage_write_access = true, Some(999))
            .unwrap_err();
        assert!(matches!(err, StoreError::Conflict(_, 999, 1)));
    }

    #[test]
    fn promote_copies_stage_metadata_into_prod() {
        let store = MetadataStore::open_in_memory().unwrap();
        let prod_id = AppId::new_prod();
        let (prod, prod_v1) = new_app(prod_id.clone(), "", "/a");
        store.create_app(&prod, &prod_v1).unwrap();

        let mut staged = Metadata::initial("demo", "proxy");
        staged.app_config.insert("k".to_string(), "staged".to_string());
        let promoted = store.promote(&prod_id, staged.clone(), None).unwrap();
        assert_eq!(promoted.version, 2);
        assert_eq!(promoted.metadata.app_config.get("k"), Some(&"staged".to_string()));
        let prod_now = store.get_app(&prod_id).unwrap();
        assert_eq!(prod_now.metadata.app_config.get("k"), Some(&"staged".to_string()));
    }
}
