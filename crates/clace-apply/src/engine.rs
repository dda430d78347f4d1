// crates/clace-apply/src/engine.rs
// ============================================================================
// Module: Apply Engine
// Description: Converges a declared set of apps onto the registry's
//              current state (spec.md §4.5).
// Purpose: Decide, per declared app, whether to create it, update it, or
//          skip it, then optionally reload, approve, and promote, and
//          report the aggregate result.
// Dependencies: clace-core, clace-registry, clace-store-sqlite, toml,
//               thiserror, tracing
// ============================================================================

//! ## Overview
//! An apply file declares a flat list of apps; [`ApplyEngine::apply`]
//! filters it by the caller's `app_path_glob`, then walks it app by app
//! and, for each, looks the prod app up by `(domain, path)`. Missing means
//! create; present means diff `app_config` against the live row and
//! either update (if it differs and isn't blocked by a non-declarative
//! change) or leave it matched. Updates land on a prod app's stage
//! sibling, matching [`clace_registry::Registry::stage_metadata_update`]'s
//! own redirection; a create brings prod and stage up together. The
//! reload phase (`--reload`) then re-fetches source for the apps that
//! phase selects, `--approve` attaches approval to each reload, and
//! `--promote` promotes a reloaded stage sibling into prod. A dry run
//! computes every [`ApplyDecision`] but performs no registry mutation at
//! all — this is a simpler reading of spec.md's "no committed changes"
//! dry-run requirement than threading a rollback-only transaction handle
//! through the registry, and is recorded as such in this workspace's
//! design ledger.

use clace_core::ClaceError;
use clace_core::Metadata;
use clace_core::PathSpec;
use clace_core::ReloadPolicy;
use clace_core::Settings;
use clace_core::VariantKind;
use clace_registry::Registry;
use clace_registry::RegistryError;
use clace_store_sqlite::StoreError;
use serde::Deserialize;
use thiserror::Error;
use tracing::info;

use crate::baseline;

/// Suffix appended to a prod app's path to name its stage sibling,
/// mirrored from `clace_registry::registry` since the apply engine needs
/// to find a prod declaration's stage sibling for reload/promote.
const STAGE_SUFFIX: &str = "_cl_stage";

/// Apply engine errors.
#[derive(Debug, Error)]
pub enum ApplyError {
    /// The apply file's TOML failed to parse.
    #[error("parsing apply file: {0}")]
    Parse(#[from] toml::de::Error),
    /// The `appPathGlob` selector was malformed.
    #[error("{0}")]
    InvalidPathSpec(String),
    /// A declared app could not be created or updated.
    #[error(transparent)]
    Registry(#[from] RegistryError),
    /// The store reported an error outside a registry transition (e.g.
    /// baseline bookkeeping).
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<ApplyError> for ClaceError {
    fn from(err: ApplyError) -> Self {
        match err {
            ApplyError::Parse(e) => Self::InvalidArgument(e.to_string()),
            ApplyError::InvalidPathSpec(m) => Self::InvalidArgument(m),
            ApplyError::Registry(e) => e.into(),
            ApplyError::Store(StoreError::NotFound(m)) => Self::NotFound(m),
            ApplyError::Store(StoreError::Duplicate(m)) => Self::Duplicate(m),
            ApplyError::Store(StoreError::Conflict(id, expected, actual)) => {
                Self::Conflict(format!("{id}: expected row version {expected}, found {actual}"))
            }
            ApplyError::Store(StoreError::Invalid(m)) => Self::InvalidArgument(m),
            ApplyError::Store(StoreError::Db(m) | StoreError::Corrupt(m)) => Self::Internal(m),
        }
    }
}

/// One app declared in an apply file.
#[derive(Debug, Clone, Deserialize)]
pub struct DeclaredApp {
    /// Domain the app answers on; empty for the catch-all domain.
    #[serde(default)]
    pub domain: String,
    /// Mount path, always starting with `/`.
    pub path: String,
    /// Source the app's files are fetched from.
    pub source_url: String,
    /// Git branch to resolve the source against on reload.
    #[serde(default)]
    pub branch: Option<String>,
    /// Exact git commit to pin the source to on reload.
    #[serde(default)]
    pub commit: Option<String>,
    /// Whether this declares a dev app instead of a prod app.
    #[serde(default)]
    pub is_dev: bool,
    /// Flat `app_config` key/value pairs this declaration owns.
    #[serde(default)]
    pub app_config: std::collections::BTreeMap<String, String>,
}

/// The parsed shape of an apply file (spec.md §4.5).
#[derive(Debug, Clone, Deserialize, Default)]
pub struct ApplyFile {
    /// Every app this file declares.
    #[serde(default, rename = "app")]
    pub apps: Vec<DeclaredApp>,
}

impl ApplyFile {
    /// Parses an apply file's TOML text.
    ///
    /// # Errors
    /// Returns [`ApplyError::Parse`] if `text` is not valid TOML matching
    /// this schema.
    pub fn parse(text: &str) -> Result<Self, ApplyError> {
        Ok(toml::from_str(text)?)
    }
}

/// What the engine decided to do with one declared app.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyDecision {
    /// No app existed at this `(domain, path)`; it was (or would be)
    /// created.
    Created,
    /// An app existed and at least one declared field differed; it was
    /// (or would be) updated.
    Updated,
    /// An app existed and already matched every declared field.
    Unchanged,
    /// An app existed but a declared field had drifted out of band and
    /// `clobber` was not set, so the update was refused.
    SkippedNonDeclarativeChange {
        /// The field that would have been clobbered.
        field: String,
    },
    /// The app's source was re-fetched and recorded as a new version.
    Reloaded,
    /// The reload's declared surface was recorded as operator-approved.
    Approved,
    /// A reloaded stage sibling was promoted into prod.
    Promoted,
}

/// Options controlling one [`ApplyEngine::apply`] run.
#[derive(Debug, Clone)]
pub struct ApplyOptions {
    /// Compute decisions without mutating the registry.
    pub dry_run: bool,
    /// Overwrite fields even if they drifted out of band since the last
    /// successful apply of this file.
    pub clobber: bool,
    /// Auto-approve any new loads/permissions a declared app introduces.
    pub approve: bool,
    /// Promote a reloaded stage sibling into prod.
    pub promote: bool,
    /// Which apps to reload after the create/update phase.
    pub reload: ReloadPolicy,
    /// Selector restricting which declarations from the file are applied
    /// (spec.md §6.2). `"all"` applies every declaration.
    pub app_path_glob: String,
}

impl Default for ApplyOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            clobber: false,
            approve: false,
            promote: false,
            reload: ReloadPolicy::None,
            app_path_glob: "all".to_string(),
        }
    }
}

/// The outcome for one declared app.
#[derive(Debug, Clone)]
pub struct ApplyOutcome {
    /// The app's mount path, for reporting.
    pub path: String,
    /// What happened (or would happen, for a dry run).
    pub decision: ApplyDecision,
}

/// Aggregate result of one apply run (spec.md §4.5 step 6).
#[derive(Debug, Clone, Default)]
pub struct ApplyResponse {
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
    /// Whether this response describes a dry run (no mutation occurred).
    pub dry_run: bool,
}

impl ApplyResponse {
    fn record(&mut self, path: &str, decision: &ApplyDecision) {
        match decision {
            ApplyDecision::Created => self.created.push(path.to_string()),
            ApplyDecision::Updated => self.updated.push(path.to_string()),
            ApplyDecision::Unchanged => {}
            ApplyDecision::SkippedNonDeclarativeChange { .. } => self.skipped.push(path.to_string()),
            ApplyDecision::Reloaded => self.reloaded.push(path.to_string()),
            ApplyDecision::Approved => self.approved.push(path.to_string()),
            ApplyDecision::Promoted => self.promoted.push(path.to_string()),
        }
    }
}

/// Converges declared apps onto a [`Registry`] (spec.md §4.5).
pub struct ApplyEngine<'a> {
    registry: &'a Registry,
}

impl<'a> ApplyEngine<'a> {
    /// Wraps a registry for one or more apply runs.
    #[must_use]
    pub const fn new(registry: &'a Registry) -> Self {
        Self { registry }
    }

    /// Applies every declaration in `file` matched by
    /// `options.app_path_glob`, identified for baseline bookkeeping as
    /// having come from `file_path`, then runs the reload/approve/promote
    /// phases `options.reload`/`options.approve`/`options.promote`
    /// select.
    ///
    /// # Errors
    /// Returns [`ApplyError::InvalidPathSpec`] if `options.app_path_glob`
    /// does not parse, and [`ApplyError::Registry`] if a create, update,
    /// or reload fails for a reason other than a detected non-declarative
    /// change (which is reported in the outcome list instead of failing
    /// the whole run).
    pub fn apply(
        &self,
        file_path: &str,
        file: &ApplyFile,
        options: &ApplyOptions,
    ) -> Result<(Vec<ApplyOutcome>, ApplyResponse), ApplyError> {
        let spec = PathSpec::parse(&options.app_path_glob)
            .map_err(|err| ApplyError::InvalidPathSpec(err.to_string()))?;
        let matched: Vec<&DeclaredApp> = file
            .apps
            .iter()
            .filter(|d| spec.matches(&d.domain, &d.path))
            .collect();

        let mut response = ApplyResponse { dry_run: options.dry_run, ..ApplyResponse::default() };
        let mut outcomes = Vec::with_capacity(matched.len());
        for declared in &matched {
            let outcome = self.apply_one(file_path, declared, options)?;
            response.record(&outcome.path, &outcome.decision);
            outcomes.push(outcome);
        }

        if options.reload != ReloadPolicy::None && !options.dry_run {
            let create_decisions: Vec<ApplyDecision> =
                outcomes.iter().map(|o| o.decision.clone()).collect();
            let mut reload_outcomes = Vec::new();
            for (declared, decision) in matched.iter().zip(create_decisions.iter()) {
                let should_reload = match options.reload {
                    ReloadPolicy::None => false,
                    ReloadPolicy::Updated => {
                        matches!(decision, ApplyDecision::Created | ApplyDecision::Updated)
                    }
                    ReloadPolicy::Matched => true,
                };
                if !should_reload {
                    continue;
                }
                reload_outcomes.extend(self.reload_one(declared, options)?);
            }
            for reload_outcome in reload_outcomes {
                response.record(&reload_outcome.path, &reload_outcome.decision);
                outcomes.push(reload_outcome);
            }
        }

        Ok((outcomes, response))
    }

    /// Reloads the app that actually carries a declared app's latest
    /// content: the stage sibling for prod declarations (since
    /// [`Registry::stage_metadata_update`] lands create/update there),
    /// the dev app itself for dev declarations.
    fn reload_one(
        &self,
        declared: &DeclaredApp,
        options: &ApplyOptions,
    ) -> Result<Vec<ApplyOutcome>, ApplyError> {
        let mut outcomes = Vec::new();
        let target = if declared.is_dev {
            self.registry
                .get_app_by_path(&declared.domain, &declared.path, VariantKind::Dev)?
        } else {
            let stage_path = format!("{}{STAGE_SUFFIX}", declared.path);
            self.registry
                .get_app_by_path(&declared.domain, &stage_path, VariantKind::Stage)?
        };

        if options.approve {
            let declared_loads: std::collections::BTreeSet<String> =
                target.metadata.loads.iter().cloned().collect();
            self.registry
                .store()
                .set_approved_surface(&target.id, &declared_loads, &target.metadata.permissions)?;
            outcomes.push(ApplyOutcome {
                path: declared.path.clone(),
                decision: ApplyDecision::Approved,
            });
        }

        let promote_after = options.promote && !declared.is_dev;
        let reloaded = self.registry.reload(
            &target,
            declared.branch.as_deref(),
            declared.commit.as_deref(),
            options.approve,
            promote_after,
            None,
        )?;
        info!(path = %declared.path, version = reloaded.version, "apply reloaded app");
        outcomes.push(ApplyOutcome {
            path: declared.path.clone(),
            decision: ApplyDecision::Reloaded,
        });
        if promote_after {
            outcomes.push(ApplyOutcome {
                path: declared.path.clone(),
                decision: ApplyDecision::Promoted,
            });
        }
        Ok(outcomes)
    }

    fn apply_one(
        &self,
        file_path: &str,
        declared: &DeclaredApp,
        options: &ApplyOptions,
    ) -> Result<ApplyOutcome, ApplyError> {
        let kind = if declared.is_dev { VariantKind::Dev } else { VariantKind::Prod };
        let existing = self
            .registry
            .get_app_by_path(&declared.domain, &declared.path, kind)
            .ok();

        let Some(existing) = existing else {
            if options.dry_run {
                return Ok(ApplyOutcome {
                    path: declared.path.clone(),
                    decision: ApplyDecision::Created,
                });
            }
            let metadata = Self::build_metadata(declared);
            if declared.is_dev {
                self.registry.create_dev_app(
                    &declared.domain,
                    &declared.path,
                    &declared.source_url,
                    Settings::default(),
                    metadata,
                )?;
            } else {
                self.registry.create_prod_app(
                    &declared.domain,
                    &declared.path,
                    &declared.source_url,
                    Settings::default(),
                    metadata,
                )?;
            }
            self.record_all_baselines(file_path, declared)?;
            info!(path = %declared.path, "apply created app");
            return Ok(ApplyOutcome {
                path: declared.path.clone(),
                decision: ApplyDecision::Created,
            });
        };

        for (key, value) in &declared.app_config {
            let live_value = existing.metadata.app_config.get(key).cloned().unwrap_or_default();
            if live_value == *value {
                continue;
            }
            let drifted = baseline::is_non_declarative_change(
                self.registry.store(),
                file_path,
                &declared.domain,
                &declared.path,
                key,
                &live_value,
            )?;
            if drifted && !options.clobber {
                return Ok(ApplyOutcome {
                    path: declared.path.clone(),
                    decision: ApplyDecision::SkippedNonDeclarativeChange { field: key.clone() },
                });
            }
        }

        let mut next_metadata = existing.metadata.clone();
        let mut changed = false;
        for (key, value) in &declared.app_config {
            if next_metadata.app_config.get(key) != Some(value) {
                next_metadata.app_config.insert(key.clone(), value.clone());
                changed = true;
            }
        }

        if !changed {
            return Ok(ApplyOutcome {
                path: declared.path.clone(),
                decision: ApplyDecision::Unchanged,
            });
        }

        if options.dry_run {
            return Ok(ApplyOutcome {
                path: declared.path.clone(),
                decision: ApplyDecision::Updated,
            });
        }

        self.registry
            .stage_metadata_update(&existing, next_metadata, options.approve, None)?;
        self.record_all_baselines(file_path, declared)?;
        info!(path = %declared.path, "apply updated app");
        Ok(ApplyOutcome {
            path: declared.path.clone(),
            decision: ApplyDecision::Updated,
        })
    }

    fn record_all_baselines(&self, file_path: &str, declared: &DeclaredApp) -> Result<(), ApplyError> {
        for (key, value) in &declared.app_config {
            baseline::record_baseline(
                self.registry.store(),
                file_path,
                &declared.domain,
                &declared.path,
                key,
                value,
            )?;
        }
        Ok(())
    }

    fn build_metadata(declared: &DeclaredApp) -> Metadata {
        let mut metadata = Metadata::initial("declared", "proxy");
        metadata.app_config = declared.app_config.clone();
        metadata
    }
}

#[cfg(test)]
mod tests {
    use clace_registry::Registry;
    use clace_store_sqlite::MetadataStore;

    use super::ApplyDecision;
    use super::ApplyEngine;
    use super::ApplyFile;
    use super::ApplyOptions;

    fn registry() -> Registry {
        Registry::new(MetadataStore::open_in_memory().unwrap())
    }

    #[test]
    fn first_apply_creates_declared_apps() {
        let registry = registry();
        let file = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"
            app_config.greeting = "hi"
            "#,
        )
        .unwrap();
        let (outcomes, response) = ApplyEngine::new(&registry)
            .apply("apps.toml", &file, &ApplyOptions::default())
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].decision, ApplyDecision::Created);
        assert_eq!(response.created, vec!["/a".to_string()]);
        assert!(!response.dry_run);
    }

    #[test]
    fn second_identical_apply_is_a_no_op() {
        let registry = registry();
        let file = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"
            app_config.greeting = "hi"
            "#,
        )
        .unwrap();
        let engine = ApplyEngine::new(&registry);
        engine.apply("apps.toml", &file, &ApplyOptions::default()).unwrap();
        let (outcomes, response) = engine.apply("apps.toml", &file, &ApplyOptions::default()).unwrap();
        assert_eq!(outcomes[0].decision, ApplyDecision::Unchanged);
        assert!(response.updated.is_empty());
    }

    #[test]
    fn out_of_band_change_blocks_update_without_clobber() {
        let registry = registry();
        let file = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"
            app_config.greeting = "hi"
            "#,
        )
        .unwrap();
        let engine = ApplyEngine::new(&registry);
        engine.apply("apps.toml", &file, &ApplyOptions::default()).unwrap();

        let app = registry
            .get_app_by_path("", "/a", clace_core::VariantKind::Prod)
            .unwrap();
        let mut manual = app.metadata.clone();
        manual.app_config.insert("greeting".to_string(), "manually edited".to_string());
        registry.stage_metadata_update(&app, manual, true, None).unwrap();

        let file2 = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"
            app_config.greeting = "updated by file"
            "#,
        )
        .unwrap();
        let (outcomes, response) = engine.apply("apps.toml", &file2, &ApplyOptions::default()).unwrap();
        assert!(matches!(
            outcomes[0].decision,
            ApplyDecision::SkippedNonDeclarativeChange { .. }
        ));
        assert_eq!(response.skipped, vec!["/a".to_string()]);

        let (outcomes_clobber, _) = engine
            .apply(
                "apps.toml",
                &file2,
                &ApplyOptions { clobber: true, ..ApplyOptions::default() },
            )
            .unwrap();
        assert_eq!(outcomes_clobber[0].decision, ApplyDecision::Updated);
    }

    #[test]
    fn dry_run_does_not_mutate() {
        let registry = registry();
        let file = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"
            "#,
        )
        .unwrap();
        ApplyEngine::new(&registry)
            .apply("apps.toml", &file, &ApplyOptions { dry_run: true, ..ApplyOptions::default() })
            .unwrap();
        assert!(registry.list_apps().unwrap().is_empty());
    }

    #[test]
    fn app_path_glob_filters_declarations() {
        let registry = registry();
        let file = ApplyFile::parse(
            r#"
            [[app]]
            path = "/a"
            source_url = "https://example.com/a.git"

            [[app]]
            path = "/b"
            source_url = "https://example.com/b.git"
            "#,
        )
        .unwrap();
        let (outcomes, response) = ApplyEngine::new(&registry)
            .apply(
                "apps.toml",
                &file,
                &ApplyOptions { app_path_glob: "*:/a".to_string(), ..ApplyOptions::default() },
            )
            .unwrap();
        assert_eq!(outcomes.len(), 1);
        assert_eq!(response.created, vec!["/a".to_string()]);
    }

    #[test]
    fn reload_updated_policy_reloads_a_declared_dev_app() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("app.star"), "x").unwrap();
        let registry = registry();
        let file = ApplyFile::parse(&format!(
            r#"
            [[app]]
            path = "/a"
            source_url = "{}"
            is_dev = true
            "#,
            dir.path().to_str().unwrap().replace('\\', "/")
        ))
        .unwrap();
        let (outcomes, response) = ApplyEngine::new(&registry)
            .apply(
                "apps.toml",
                &file,
                &ApplyOptions { reload: clace_core::ReloadPolicy::Updated, ..ApplyOptions::default() },
            )
            .unwrap();
        assert!(outcomes.iter().any(|o| o.decision == ApplyDecision::Reloaded));
        assert_eq!(response.reloaded, vec!["/a".to_string()]);
    }
}
