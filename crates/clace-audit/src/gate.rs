// crates/clace-audit/src/gate.rs
// ============================================================================
// Module: Audit Gate Evaluation
// Description: Set-membership and regex matching for loads/permissions.
// Purpose: Decide needs_approval and report the delta (spec.md §4.2).
// Dependencies: clace-core, regex
// ============================================================================

use std::collections::BTreeSet;

use clace_core::Perm;
use regex::Regex;
use thiserror::Error;

/// Errors raised while evaluating an audit diff.
#[derive(Debug, Error)]
pub enum AuditError {
    /// An approved entry declared `regex:` with an invalid pattern.
    #[error("invalid regex in approved entry: {0}")]
    InvalidRegex(String),
}

/// Declared vs. approved surfaces to diff.
#[derive(Debug, Clone)]
pub struct AuditInput<'a> {
    /// Plugin identifiers the app declares it loads.
    pub declared_loads: &'a BTreeSet<String>,
    /// Permissions the app declares it needs.
    pub declared_permissions: &'a [Perm],
    /// Plugin identifiers previously approved for this app.
    pub approved_loads: &'a BTreeSet<String>,
    /// Permissions previously approved for this app.
    pub approved_permissions: &'a [Perm],
}

/// Result of an audit evaluation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditDecision {
    /// Loads declared but not in the approved set.
    pub new_loads_added: Vec<String>,
    /// Permissions declared but not matched by any approved permission.
    pub new_perms_added: Vec<Perm>,
    /// Whether an operator must approve before this declaration activates.
    pub needs_approval: bool,
}

/// Matches one declared element against one approved element, honoring the
/// `regex:` prefix convention. A `regex:`-prefixed declared element can
/// only be satisfied by an identical approved element: a regex is never
/// auto-approved against a literal.
fn element_matches(declared: &str, approved: &str) -> Result<bool, AuditError> {
    if declared.starts_with("regex:") {
        return Ok(declared == approved);
    }
    match approved.strip_prefix("regex:") {
        Some(pattern) => {
            let re = Regex::new(pattern)
                .map_err(|err| AuditError::InvalidRegex(format!("{pattern}: {err}")))?;
            Ok(re.is_match(declared))
        }
        None => Ok(declared == approved),
    }
}

/// Matches a pair of equal-length ordered element lists.
fn list_matches(declared: &[String], approved: &[String]) -> Result<bool, AuditError> {
    if declared.len() != approved.len() {
        return Ok(false);
    }
    for (d, a) in declared.iter().zip(approved.iter()) {
        if !element_matches(d, a)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Matches a declared permission against one approved permission.
fn perm_matches(declared: &Perm, approved: &Perm) -> Result<bool, AuditError> {
    if declared.plugin != approved.plugin
        || declared.method != approved.method
        || declared.is_read != approved.is_read
    {
        return Ok(false);
    }
    if !list_matches(&declared.arguments, &approved.arguments)? {
        return Ok(false);
    }
    if declared.secrets.len() != approved.secrets.len() {
        return Ok(false);
    }
    for (d, a) in declared.secrets.iter().zip(approved.secrets.iter()) {
        if !list_matches(d, a)? {
            return Ok(false);
        }
    }
    Ok(true)
}

/// Evaluates whether `input.declared_*` is covered by `input.approved_*`.
///
/// # Errors
/// Returns [`AuditError::InvalidRegex`] if an approved entry's `regex:`
/// pattern fails to compile.
pub fn evaluate(input: AuditInput<'_>) -> Result<AuditDecision, AuditError> {
    let new_loads_added: Vec<String> = input
        .declared_loads
        .difference(input.approved_loads)
        .cloned()
        .collect();

    let mut new_perms_added = Vec::new();
    for declared in input.declared_permissions {
        let mut covered = false;
        for approved in input.approved_permissions {
            if perm_matches(declared, approved)? {
                covered = true;
                break;
            }
        }
        if !covered {
            new_perms_added.push(declared.clone());
        }
    }

    let needs_approval = !new_loads_added.is_empty() || !new_perms_added.is_empty();

    Ok(AuditDecision {
        new_loads_added,
        new_perms_added,
        needs_approval,
    })
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use clace_core::Perm;

    use super::AuditInput;
    use super::evaluate;

    fn perm(plugin: &str, method: &str, args: &[&str]) -> Perm {
        Perm {
            plugin: plugin.to_string(),
            method: method.to_string(),
            arguments: args.iter().map(|s| (*s).to_string()).collect(),
            is_read: Some(true),
            secrets: Vec::new(),
        }
    }

    #[test]
    fn subset_of_approved_needs_no_approval() {
        let declared_loads: BTreeSet<String> = ["fs".to_string()].into_iter().collect();
        let approved_loads = declared_loads.clone();
        let declared_perms = vec![perm("fs", "read", &["/tmp"])];
        let approved_perms = declared_perms.clone();
        let decision = evaluate(AuditInput {
            declared_loads: &declared_loads,
            declared_permissions: &declared_perms,
            approved_loads: &approved_loads,
            approved_permissions: &approved_perms,
        })
        .unwrap();
        assert!(!decision.needs_approval);
        assert!(decision.new_loads_added.is_empty());
        assert!(decision.new_perms_added.is_empty());
    }

    #[test]
    fn new_load_triggers_approval() {
        let declared_loads: BTreeSet<String> =
            ["fs".to_string(), "http".to_string()].into_iter().collect();
        let approved_loads: BTreeSet<String> = ["fs".to_string()].into_iter().collect();
        let decision = evaluate(AuditInput {
            declared_loads: &declared_loads,
            declared_permissions: &[],
            approved_loads: &approved_loads,
            approved_permissions: &[],
        })
        .unwrap();
        assert!(decision.needs_approval);
        assert_eq!(decision.new_loads_added, vec!["http".to_string()]);
    }

    #[test]
    fn approved_regex_auto_approves_matching_literal() {
        let empty = BTreeSet::new();
        let declared_perms = vec![perm("http", "get", &["https://example.com/a"])];
        let approved_perms = vec![perm("http", "get", &["regex:^https://example\\.com/.*$"])];
        let decision = evaluate(AuditInput {
            declared_loads: &empty,
            declared_permissions: &declared_perms,
            approved_loads: &empty,
            approved_permissions: &approved_perms,
        })
        .unwrap();
        assert!(!decision.needs_approval);
    }

    #[test]
    fn declared_regex_is_never_auto_approved_against_literal() {
        let empty = BTreeSet::new();
        let declared_perms = vec![perm("http", "get", &["regex:^https://.*$"])];
        let approved_perms = vec![perm("http", "get", &["https://example.com/a"])];
        let decision = evaluate(AuditInput {
            declared_loads: &empty,
            declared_permissions: &declared_perms,
            approved_loads: &empty,
            approved_permissions: &approved_perms,
        })
        .unwrap();
        assert!(decision.needs_approval);
        assert_eq!(decision.new_perms_added.len(), 1);
    }

    #[test]
    fn argument_count_mismatch_is_not_a_match() {
        let empty = BTreeSet::new();
        let declared_perms = vec![perm("fs", "read", &["/a", "/b"])];
        let approved_perms = vec![perm("fs", "read", &["/a"])];
        let decision = evaluate(AuditInput {
            declared_loads: &empty,
            declared_permissions: &declared_perms,
            approved_loads: &empty,
            approved_permissions: &approved_perms,
        })
        .unwrap();
        assert!(decision.needs_approval);
    }
}
