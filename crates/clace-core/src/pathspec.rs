// crates/clace-core/src/pathspec.rs
// ============================================================================
// Module: Clace Path-Spec Grammar
// Description: Parsing and matching for `domain:path-glob` selectors.
// Purpose: Give list/delete/approve/reload a single, testable glob engine.
// Dependencies: none (pure)
// ============================================================================

//! ## Overview
//! Path specs select one or many apps for a bulk operation. The grammar is
//! defined in spec.md §6.2:
//!
//! ```text
//! spec   ::= "all" | [domain] [":"] path-glob
//! domain ::= segment { "." segment } | "*"
//! path-glob ::= segment { "/" segment } where segment in {literal, "*", "**"}
//! ```
//!
//! `*` matches one path segment (no `/`); `**` matches any run of segments
//! including zero. The shortcut `all` is exactly `*:**`.

use crate::error::ClaceError;

/// A single path-glob segment.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    /// Matches exactly this literal segment.
    Literal(String),
    /// Matches exactly one segment of any content.
    Star,
    /// Matches any number of segments, including zero.
    DoubleStar,
}

/// A parsed domain matcher.
#[derive(Debug, Clone, PartialEq, Eq)]
enum DomainMatch {
    /// Matches only the empty domain (no-domain apps).
    Empty,
    /// Matches any domain, including empty.
    Any,
    /// Matches this exact domain string.
    Exact(String),
}

/// A parsed `domain:path-glob` selector.
///
/// # Invariants
/// - `"all"` parses identically to `"*:**"`.
/// - An empty left-hand side before `:` matches only the empty domain.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathSpec {
    domain: DomainMatch,
    segments: Vec<Segment>,
}

impl PathSpec {
    /// Parses a path-spec string per spec.md §6.2.
    ///
    /// # Errors
    /// Returns [`ClaceError::InvalidArgument`] if the domain or path glob
    /// contains characters the grammar forbids (an empty path segment from
    /// a doubled `/`, for instance).
    pub fn parse(raw: &str) -> Result<Self, ClaceError> {
        if raw == "all" {
            return Self::parse("*:**");
        }
        let (domain_part, path_part) = match raw.split_once(':') {
            Some((d, p)) => (d, p),
            None => ("", raw),
        };
        let domain = match domain_part {
            "" => DomainMatch::Empty,
            "*" => DomainMatch::Any,
            other => DomainMatch::Exact(other.to_string()),
        };
        if !path_part.starts_with('/') && path_part != "**" && !path_part.starts_with("**/") {
            return Err(ClaceError::InvalidArgument(format!(
                "path glob must start with '/' or '**': {path_part}"
            )));
        }
        let trimmed = path_part.trim_start_matches('/');
        let mut segments = Vec::new();
        if !trimmed.is_empty() {
            for raw_segment in trimmed.split('/') {
                if raw_segment.is_empty() {
                    return Err(ClaceError::InvalidArgument(format!(
                        "empty path segment in glob: {path_part}"
                    )));
                }
                segments.push(match raw_segment {
                    "*" => Segment::Star,
                    "**" => Segment::DoubleStar,
                    lit => Segment::Literal(lit.to_string()),
                });
            }
        }
        Ok(Self { domain, segments })
    }

    /// Reports whether `(domain, path)` is accepted by this spec.
    #[must_use]
    pub fn matches(&self, domain: &str, path: &str) -> bool {
        let domain_ok = match &self.domain {
            DomainMatch::Empty => domain.is_empty(),
            DomainMatch::Any => true,
            DomainMatch::Exact(expected) => expected == domain,
        };
        if !domain_ok {
            return false;
        }
        let candidate: Vec<&str> = path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();
        segments_match(&self.segments, &candidate)
    }
}

fn segments_match(pattern: &[Segment], candidate: &[&str]) -> bool {
    match pattern.first() {
        None => candidate.is_empty(),
        Some(Segment::Literal(lit)) => {
            !candidate.is_empty() && candidate[0] == lit && segments_match(&pattern[1..], &candidate[1..])
        }
        Some(Segment::Star) => {
            !candidate.is_empty() && segments_match(&pattern[1..], &candidate[1..])
        }
        Some(Segment::DoubleStar) => {
            // `**` may consume zero or more segments; try every split point.
            (0..=candidate.len()).any(|n| segments_match(&pattern[1..], &candidate[n..]))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::PathSpec;

    fn matches(spec: &str, domain: &str, path: &str) -> bool {
        PathSpec::parse(spec).unwrap().matches(domain, path)
    }

    #[test]
    fn all_matches_everything() {
        assert!(matches("all", "", "/a"));
        assert!(matches("all", "example.com", "/a/b"));
        assert!(matches("all", "", "/"));
    }

    #[test]
    fn empty_domain_selectors_match_only_no_domain_apps() {
        assert!(matches(":**", "", "/a"));
        assert!(!matches(":**", "example.com", "/a"));
        assert!(matches("**", "", "/a"));
    }

    #[test]
    fn star_does_not_cross_slash() {
        assert!(matches("*:/a/*", "", "/a/b"));
        assert!(!matches("*:/a/*", "", "/a/b/c"));
    }

    #[test]
    fn double_star_crosses_slash() {
        assert!(matches("*:/a/**", "", "/a/b/c"));
        assert!(matches("*:/a/**", "", "/a"));
    }

    #[test]
    fn exact_domain_must_match_literally() {
        assert!(matches("example.com:/a", "example.com", "/a"));
        assert!(!matches("example.com:/a", "other.com", "/a"));
    }

    #[test]
    fn rejects_path_missing_leading_slash() {
        assert!(PathSpec::parse(":a/b").is_err());
    }

    #[test]
    fn rejects_doubled_slash() {
        assert!(PathSpec::parse(":/a//b").is_err());
    }
}
