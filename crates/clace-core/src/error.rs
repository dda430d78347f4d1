// crates/clace-core/src/error.rs
// ============================================================================
// Module: Clace Error Kinds
// Description: The error enum every Clace operation ultimately resolves to.
// Purpose: Give the HTTP front a single place to map kind -> status code.
// Dependencies: thiserror
// ============================================================================

//! ## Overview
//! Every public operation across the metadata store, audit gate, registry,
//! apply engine, and sync scheduler returns `Result<T, ClaceError>` (or a
//! crate-local error that carries a `From` conversion into it). This keeps
//! the §7 kind-to-HTTP-status mapping in one place: [`clace_server`].
//!
//! # Invariants
//! - Variants are stable for programmatic handling; callers match on kind,
//!   not on the rendered message.

use thiserror::Error;

/// Convenience alias used throughout the Clace crates.
pub type ClaceResult<T> = Result<T, ClaceError>;

/// The error kinds named in the spec's error-handling design.
#[derive(Debug, Error)]
pub enum ClaceError {
    /// No matching app, version, or sync entry.
    #[error("not found: {0}")]
    NotFound(String),

    /// Creating a variant that already exists.
    #[error("duplicate: {0}")]
    Duplicate(String),

    /// Malformed path spec, invalid auth type, missing required param.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Audit diff requires operator approval; the delta is attached.
    #[error("needs approval: {0} new load(s), {1} new permission(s)")]
    NeedsApproval(usize, usize),

    /// Git or disk fetch failed.
    #[error("source fetch failed: {0}")]
    SourceFetch(String),

    /// Optimistic-lock conflict after retries exhausted.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Plugin call attempted a method or secret outside the approved set.
    #[error("permission denied: {0}")]
    PermissionDenied(String),

    /// Downstream plugin or metadata-store I/O error.
    #[error("dependency failed: {0}")]
    DependencyFailed(String),

    /// Invariant violation; fatal at request scope.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ClaceError {
    /// Short machine-stable name for the variant, used in JSON error bodies
    /// and log fields.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "not_found",
            Self::Duplicate(_) => "duplicate",
            Self::InvalidArgument(_) => "invalid_argument",
            Self::NeedsApproval(_, _) => "needs_approval",
            Self::SourceFetch(_) => "source_fetch",
            Self::Conflict(_) => "conflict",
            Self::PermissionDenied(_) => "permission_denied",
            Self::DependencyFailed(_) => "dependency_failed",
            Self::Internal(_) => "internal",
        }
    }
}
