//! Glob patterns for repository and organization rules

use glob::MatchOptions;
use log::error;

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: false,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A compiled rule pattern
///
/// `*` alone matches everything, a pattern without wildcards is an exact
/// comparison, anything else is a shell-style glob. All comparisons ignore
/// case.
#[derive(Debug, Clone)]
pub enum Pattern {
    Any,
    Exact(String),
    Glob(glob::Pattern),
}

impl Pattern {
    pub fn compile(pattern: &str) -> Self {
        if pattern == "*" {
            return Pattern::Any;
        }
        if !pattern.contains(['*', '?', '[']) {
            return Pattern::Exact(pattern.to_lowercase());
        }

        match glob::Pattern::new(pattern) {
            Ok(glob) => Pattern::Glob(glob),
            Err(e) => {
                // Compared literally instead, so the rule still means something
                error!("Invalid glob pattern '{}': {}", pattern, e);
                Pattern::Exact(pattern.to_lowercase())
            }
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Exact(expected) => value.to_lowercase() == *expected,
            Pattern::Glob(glob) => glob.matches_with(value, MATCH_OPTIONS),
        }
    }
}

/// One-off match without keeping the compiled pattern
pub fn glob_matches(pattern: &str, value: &str) -> bool {
    Pattern::compile(pattern).matches(value)
}
