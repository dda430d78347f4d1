// crates/clace-core/src/plugin.rs
// ============================================================================
// Module: Clace Plugin Seam
// Description: The interface boundary to the scripting runtime and plugins.
// Purpose: Let the registry hold a handler without knowing how it executes.
// Dependencies: none
// ============================================================================

//! ## Overview
//! The in-app scripting language and the plugin runtime that executes
//! storage/HTTP/filesystem side effects are explicitly out of scope
//! (spec.md §1). This module defines only the seam: an opaque handler the
//! registry stores per variant, and the secret-access interface the audit
//! gate's permission model is checked against (spec.md §9).
//!
//! The core never inspects a handler's body and never executes one; audit
//! introspects declared `loads`/`permissions` data only.

use std::sync::Arc;

/// An opaque request handler owned by an app variant.
///
/// The core treats this as inert data: it is stored in the variant handle
/// and handed to the HTTP front for dispatch, never invoked by the
/// registry, router, apply engine, or audit gate.
pub type Handler = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// A single segment of a secret key path; either a literal or, when it
/// starts with `regex:`, a pattern to test candidate segments against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretPathSegment {
    /// Matches exactly this literal segment.
    Literal(String),
    /// Matches any segment the regex accepts.
    Regex(String),
}

impl SecretPathSegment {
    /// Parses a single path segment, recognizing the `regex:` prefix.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        match raw.strip_prefix("regex:") {
            Some(pattern) => Self::Regex(pattern.to_string()),
            None => Self::Literal(raw.to_string()),
        }
    }
}

/// Interface a handler uses to request a secret value.
///
/// Implementations live in the secret backends (environment, Vault, cloud
/// secret managers) named in spec.md §1 as external collaborators; this
/// core only defines the request shape so the audit gate's declared
/// `secrets` spec can be checked against it before a call reaches a
/// backend. Secret values themselves never touch the metadata store.
pub trait SecretProvider: Send + Sync {
    /// Fetches the value at `namespace`/`key_path`, or `None` if absent.
    fn get(&self, namespace: &str, key_path: &[String]) -> Option<String>;
}

#[cfg(test)]
mod tests {
    use super::SecretPathSegment;

    #[test]
    fn parses_regex_prefix() {
        assert_eq!(
            SecretPathSegment::parse("regex:^prod-.*$"),
            SecretPathSegment::Regex("^prod-.*$".to_string())
        );
        assert_eq!(
            SecretPathSegment::parse("db_password"),
            SecretPathSegment::Literal("db_password".to_string())
        );
    }
}
