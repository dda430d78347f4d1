// crates/clace-core/src/ids.rs
// ============================================================================
// Module: Clace Identifiers
// Description: Typed, prefix-tagged identifiers for the four app variants.
// Purpose: Let callers recover a variant's kind from its id alone.
// Dependencies: data-encoding, rand, serde
// ============================================================================

//! ## Overview
//! Every app variant row is named by an [`AppId`]. The id's prefix encodes
//! its [`VariantKind`] so the audit gate and registry never need a side
//! channel (or a database round trip) to tell a prod row from a stage row.
//!
//! # Invariants
//! - `AppId::kind` is total: every id produced by this module's
//!   constructors carries a recognized prefix.
//! - Two ids produced by the same constructor are never equal (random
//!   payload), even for [`AppId::new_preview`] called twice with the same
//!   commit.

use data_encoding::BASE32_NOPAD;
use rand::RngCore;
use rand::rngs::OsRng;
use serde::Deserialize;
use serde::Serialize;

const PROD_PREFIX: &str = "app_prd_";
const STAGE_PREFIX: &str = "app_stg_";
const DEV_PREFIX: &str = "app_dev_";
const PREVIEW_PREFIX: &str = "app_pre_";
const RANDOM_PAYLOAD_BYTES: usize = 16;

/// The kind of app variant an [`AppId`] names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VariantKind {
    /// Serves the public path.
    Prod,
    /// Shadow variant carrying staged metadata for its prod sibling.
    Stage,
    /// Ephemeral variant pinned to a git commit.
    Preview,
    /// Local-disk-only flavor of prod with no stage/preview siblings.
    Dev,
}

impl VariantKind {
    /// Returns the id prefix this kind is tagged with.
    #[must_use]
    pub const fn prefix(self) -> &'static str {
        match self {
            Self::Prod => PROD_PREFIX,
            Self::Stage => STAGE_PREFIX,
            Self::Preview => PREVIEW_PREFIX,
            Self::Dev => DEV_PREFIX,
        }
    }
}

/// Opaque, prefix-tagged app variant identifier.
///
/// # Invariants
/// - Serializes as its string form; never round-trips through a numeric
///   representation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AppId(String);

fn random_payload() -> String {
    let mut bytes = [0_u8; RANDOM_PAYLOAD_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE32_NOPAD.encode(&bytes).to_lowercase()
}

/// Commits embedded in a preview id are sanitized to this charset so the id
/// stays a single path-safe token.
fn sanitize_commit(commit: &str) -> String {
    commit
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .take(12)
        .collect()
}

impl AppId {
    /// Generates a fresh prod variant id.
    #[must_use]
    pub fn new_prod() -> Self {
        Self(format!("{PROD_PREFIX}{}", random_payload()))
    }

    /// Generates a fresh stage variant id.
    #[must_use]
    pub fn new_stage() -> Self {
        Self(format!("{STAGE_PREFIX}{}", random_payload()))
    }

    /// Generates a fresh dev variant id.
    #[must_use]
    pub fn new_dev() -> Self {
        Self(format!("{DEV_PREFIX}{}", random_payload()))
    }

    /// Generates a fresh preview variant id pinned to `commit`. Two calls
    /// with the same commit never collide.
    #[must_use]
    pub fn new_preview(commit: &str) -> Self {
        Self(format!(
            "{PREVIEW_PREFIX}{}_{}",
            sanitize_commit(commit),
            random_payload()
        ))
    }

    /// Wraps a raw id string read back from storage.
    #[must_use]
    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Returns the id as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the variant kind from the id's prefix.
    #[must_use]
    pub fn kind(&self) -> Option<VariantKind> {
        if self.0.starts_with(PROD_PREFIX) {
            Some(VariantKind::Prod)
        } else if self.0.starts_with(STAGE_PREFIX) {
            Some(VariantKind::Stage)
        } else if self.0.starts_with(PREVIEW_PREFIX) {
            Some(VariantKind::Preview)
        } else if self.0.starts_with(DEV_PREFIX) {
            Some(VariantKind::Dev)
        } else {
            None
        }
    }

    /// Returns the embedded commit fragment for a preview id.
    #[must_use]
    pub fn preview_commit(&self) -> Option<&str> {
        let rest = self.0.strip_prefix(PREVIEW_PREFIX)?;
        rest.split('_').next()
    }
}

impl std::fmt::Display for AppId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::AppId;
    use super::VariantKind;

    #[test]
    fn kind_recoverable_from_prefix() {
        assert_eq!(AppId::new_prod().kind(), Some(VariantKind::Prod));
        assert_eq!(AppId::new_stage().kind(), Some(VariantKind::Stage));
        assert_eq!(AppId::new_dev().kind(), Some(VariantKind::Dev));
        assert_eq!(
            AppId::new_preview("abc123").kind(),
            Some(VariantKind::Preview)
        );
    }

    #[test]
    fn preview_ids_for_same_commit_are_distinct() {
        let a = AppId::new_preview("deadbeef");
        let b = AppId::new_preview("deadbeef");
        assert_ne!(a, b);
        assert_eq!(a.preview_commit(), Some("deadbeef"));
        assert_eq!(b.preview_commit(), Some("deadbeef"));
    }

    #[test]
    fn unknown_prefix_has_no_kind() {
        let id = AppId::from_raw("not_a_real_id");
        assert_eq!(id.kind(), None);
    }
}
