//! Path normalization for server/agent identifiers (spec §3.1, §4.C3).

use crate::error::GatewayError;
use regex::Regex;
use std::sync::OnceLock;

static PATH_RE: OnceLock<Regex> = OnceLock::new();

fn path_re() -> &'static Regex {
    PATH_RE.get_or_init(|| Regex::new(r"^/[^/]+(/[^/]+)*$").expect("valid path regex"))
}

/// Normalizes a path to its canonical form: leading `/`, no trailing `/`
/// (except root), and validates it against `^/[^/]+(/[^/]+)*$`.
///
/// Accepts input with or without a leading/trailing slash so that `/x/` and
/// `/x` are treated as the same entity (spec §8 boundary behavior).
pub fn normalize_path(input: &str) -> Result<String, GatewayError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(GatewayError::invalid("path must not be empty"));
    }

    let with_leading = if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    };

    let canonical = if with_leading.len() > 1 {
        let stripped = with_leading.trim_end_matches('/');
        if stripped.is_empty() {
            "/".to_string()
        } else {
            stripped.to_string()
        }
    } else {
        with_leading
    };

    if canonical == "/" || path_re().is_match(&canonical) {
        Ok(canonical)
    } else {
        Err(GatewayError::invalid(format!(
            "path '{input}' does not match the required shape"
        )))
    }
}

/// The "other" form of a canonical path, tried as a fallback lookup key
/// (canonical-with-trailing-slash), per spec §4.C3 "Lookups try the
/// canonical form first, then the other form."
pub fn alternate_form(canonical: &str) -> String {
    if canonical == "/" {
        canonical.to_string()
    } else {
        format!("{canonical}/")
    }
}

/// `safe_path`: `/` collapsed to `_`, leading/trailing `_` trimmed (glossary).
pub fn safe_path(path: &str) -> String {
    path.replace('/', "_").trim_matches('_').to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_leading_and_trailing_slash_variants() {
        assert_eq!(normalize_path("/x").unwrap(), "/x");
        assert_eq!(normalize_path("/x/").unwrap(), "/x");
        assert_eq!(normalize_path("x").unwrap(), "/x");
        assert_eq!(normalize_path("x/").unwrap(), "/x");
    }

    #[test]
    fn normalizes_nested_paths() {
        assert_eq!(normalize_path("/a/b/c/").unwrap(), "/a/b/c");
    }

    #[test]
    fn rejects_empty_segments() {
        assert!(normalize_path("//a").is_err());
        assert!(normalize_path("").is_err());
    }

    #[test]
    fn safe_path_strips_and_collapses() {
        assert_eq!(safe_path("/a/b"), "a_b");
        assert_eq!(safe_path("/a/b/"), "a_b");
    }
}
