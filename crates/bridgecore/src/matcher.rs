//! Pattern matching for trigger rules
//!
//! One rule, one line, one answer. All patterns come from end users, so a
//! pattern that fails to compile is treated as "no match" instead of an error.

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

/// How a trigger pattern is interpreted against a line of game text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum MatchType {
    /// Case-insensitive full-string equality
    Exact,
    /// Case-insensitive substring search
    Contains,
    /// Case-insensitive prefix test
    StartsWith,
    /// Case-insensitive suffix test
    EndsWith,
    /// Regular expression, compiled case-insensitive, no implicit anchoring
    Regex,
}

/// Compile a user-supplied regex pattern
///
/// The pattern is used exactly as supplied. Malformed patterns yield `None`
/// so that one bad rule never aborts evaluation of the rest.
pub fn compile(pattern: &str) -> Option<Regex> {
    RegexBuilder::new(pattern)
        .case_insensitive(true)
        .build()
        .ok()
}

/// Test a line against a plain-text pattern
///
/// `Regex` is handled separately via [`compile`] + [`capture_groups`] because
/// callers cache the compiled form; passing `MatchType::Regex` here compiles
/// on the fly and discards captures.
pub fn matches(line: &str, pattern: &str, match_type: MatchType) -> bool {
    match match_type {
        MatchType::Exact => line.to_lowercase() == pattern.to_lowercase(),
        MatchType::Contains => line.to_lowercase().contains(&pattern.to_lowercase()),
        MatchType::StartsWith => line.to_lowercase().starts_with(&pattern.to_lowercase()),
        MatchType::EndsWith => line.to_lowercase().ends_with(&pattern.to_lowercase()),
        MatchType::Regex => compile(pattern)
            .map(|re| re.is_match(line))
            .unwrap_or(false),
    }
}

/// Run a compiled regex against a line, returning capture groups on match
///
/// Group 0 is the whole match. Groups that did not participate render as
/// empty strings so `$N` substitution can index them uniformly.
pub fn capture_groups(line: &str, regex: &Regex) -> Option<Vec<String>> {
    let captures = regex.captures(line)?;
    Some(
        (0..captures.len())
            .map(|i| {
                captures
                    .get(i)
                    .map(|m| m.as_str().to_string())
                    .unwrap_or_default()
            })
            .collect(),
    )
}
