// crates/clace-apply/src/baseline.rs
// ============================================================================
// Module: Non-Declarative Change Detection
// Description: Per-(file, app, field) baseline tracking used to tell a
//              field changed by a prior apply of the same file apart from
//              one changed out of band (SPEC_FULL.md §4 decision).
// Purpose: Let the apply engine refuse to clobber a manual change unless
//          the operator explicitly passes `clobber`.
// Dependencies: clace-store-sqlite
// ============================================================================

//! ## Overview
//! The store records, per `(file_path, domain, app_path, field_name)`,
//! the value that field held immediately after the last *successful*
//! apply of that file. A field is "non-declaratively changed" when a
//! baseline exists and the live value no longer matches it — meaning
//! something other than this apply file moved it since. A field with no
//! recorded baseline (first apply, or a field this file has never
//! declared before) is always treated as declarative: there is nothing to
//! protect yet.

use clace_store_sqlite::MetadataStore;
use clace_store_sqlite::StoreError;

/// Checks whether `field_name` drifted out of band since the last
/// successful apply of `file_path` against this app.
///
/// # Errors
/// Returns [`StoreError`] on a store engine error.
pub fn is_non_declarative_change(
    store: &MetadataStore,
    file_path: &str,
    domain: &str,
    app_path: &str,
    field_name: &str,
    live_value: &str,
) -> Result<bool, StoreError> {
    let baseline = store.get_apply_baseline(file_path, domain, app_path, field_name)?;
    Ok(match baseline {
        Some(baseline) => baseline != live_value,
        None => false,
    })
}

/// Records `declared_value` as the new baseline for `field_name` after a
/// successful apply.
///
/// # Errors
/// Returns [`StoreError`] on a store engine error.
pub fn record_baseline(
    store: &MetadataStore,
    file_path: &str,
    domain: &str,
    app_path: &str,
    field_name: &str,
    declared_value: &str,
) -> Result<(), StoreError> {
    store.set_apply_baseline(file_path, domain, app_path, field_name, declared_value)
}

#[cfg(test)]
mod tests {
    use clace_store_sqlite::MetadataStore;

    use super::is_non_declarative_change;
    use super::record_baseline;

    #[test]
    fn first_apply_has_no_baseline_and_is_declarative() {
        let store = MetadataStore::open_in_memory().unwrap();
        let drifted = is_non_declarative_change(&store, "apps.toml", "", "/a", "source_url", "live").unwrap();
        assert!(!drifted);
    }

    #[test]
    fn unchanged_since_last_apply_is_declarative() {
        let store = MetadataStore::open_in_memory().unwrap();
        record_baseline(&store, "apps.toml", "", "/a", "source_url", "https://x").unwrap();
        let drifted =
            is_non_declarative_change(&store, "apps.toml", "", "/a", "source_url", "https://x").unwrap();
        assert!(!drifted);
    }

    #[test]
    fn changed_out_of_band_is_non_declarative() {
        let store = MetadataStore::open_in_memory().unwrap();
        record_baseline(&store, "apps.toml", "", "/a", "source_url", "https://x").unwrap();
        let drifted =
            is_non_declarative_change(&store, "apps.toml", "", "/a", "source_url", "https://manually-edited").unwrap();
        assert!(drifted);
    }
}
