// crates/clace-config/src/substitute.rs
// ============================================================================
// Module: Environment Substitution
// Description: Expands `${VAR}` and `$VAR` references inside config string
//              values against the process environment (spec.md §6.4).
// Purpose: Let operators keep secrets and per-host values out of the
//          checked-in config file.
// Dependencies: std::env
// ============================================================================

/// Expands every `${VAR}` or `$VAR` reference in `input` using
/// `lookup`. An unset variable expands to the empty string; this matches
/// shell `sh` semantics for unset variables under default options.
#[must_use]
pub fn substitute_env(input: &str) -> String {
    substitute_with(input, |name| std::env::var(name).ok())
}

/// Same as [`substitute_env`] but with an injectable variable source, for
/// testing without mutating the process environment.
#[must_use]
pub fn substitute_with(input: &str, lookup: impl Fn(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.char_indices().peekable();
    while let Some((_, c)) = chars.next() {
        if c != '$' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some((_, '{')) => {
                chars.next();
                let mut name = String::new();
                let mut closed = false;
                for (_, c2) in chars.by_ref() {
                    if c2 == '}' {
                        closed = true;
                        break;
                    }
                    name.push(c2);
                }
                if closed {
                    out.push_str(&lookup(&name).unwrap_or_default());
                } else {
                    out.push_str("${");
                    out.push_str(&name);
                }
            }
            Some((_, c2)) if c2.is_ascii_alphabetic() || c2 == '_' => {
                let mut name = String::new();
                while let Some((_, c2)) = chars.peek().copied() {
                    if c2.is_ascii_alphanumeric() || c2 == '_' {
                        name.push(c2);
                        chars.next();
                    } else {
                        break;
                    }
                }
                out.push_str(&lookup(&name).unwrap_or_default());
            }
            _ => out.push('$'),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::substitute_with;

    fn env(name: &str) -> Option<String> {
        match name {
            "HOME_DIR" => Some("/srv/clace".to_string()),
            "PORT" => Some("5222".to_string()),
            _ => None,
        }
    }

    #[test]
    fn braced_and_bare_forms_both_expand() {
        assert_eq!(substitute_with("${HOME_DIR}/db", env), "/srv/clace/db");
        assert_eq!(substitute_with("port=$PORT", env), "port=5222");
    }

    #[test]
    fn unset_variable_expands_to_empty() {
        assert_eq!(substitute_with("[$MISSING]", env), "[]");
    }

    #[test]
    fn unclosed_brace_is_left_verbatim() {
        assert_eq!(substitute_with("${HOME_DIR", env), "${HOME_DIR");
    }

    #[test]
    fn lone_dollar_is_preserved() {
        assert_eq!(substitute_with("$5 fee", env), "$5 fee");
    }
}
