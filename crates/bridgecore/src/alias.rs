//! Command aliases
//!
//! Rewrites a single outbound command by matching its first word against the
//! session's alias set. First match in set order wins, and the substituted
//! result is never re-scanned, so one alias fires per command at most.

use serde::{Deserialize, Serialize};

fn default_enabled() -> bool {
    true
}

/// A single alias rule
///
/// `pattern` is compared case-insensitively against the first
/// whitespace-delimited token of the command. `replacement` may contain `$*`
/// (everything after the first token) and `$1..$N` (individual tokens of the
/// remainder, 1-indexed).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alias {
    pub pattern: String,
    pub replacement: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

impl Alias {
    pub fn new(pattern: impl Into<String>, replacement: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            replacement: replacement.into(),
            enabled: true,
        }
    }
}

/// An ordered alias set, replaced wholesale by the client
#[derive(Debug, Clone, Default)]
pub struct AliasSet {
    aliases: Vec<Alias>,
}

impl AliasSet {
    pub fn new(aliases: Vec<Alias>) -> Self {
        Self { aliases }
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }

    /// Apply the first matching alias to a command
    ///
    /// Returns the command unchanged when no enabled alias matches its first
    /// word. This is a single substitution step, not a macro-expansion loop.
    pub fn apply(&self, command: &str) -> String {
        let trimmed = command.trim_start();
        // rest is carried verbatim so $* preserves interior spacing
        let (head, rest) = match trimmed.split_once(char::is_whitespace) {
            Some((head, rest)) => (head, rest),
            None => (trimmed, ""),
        };

        if head.is_empty() {
            return command.to_string();
        }

        for alias in &self.aliases {
            if !alias.enabled {
                continue;
            }
            if alias.pattern.to_lowercase() == head.to_lowercase() {
                return expand_template(&alias.replacement, rest);
            }
        }

        command.to_string()
    }
}

/// Substitute `$*` and `$1..$N` in a replacement template
///
/// Unresolved placeholders render empty rather than literal. The result is
/// trimmed of leading and trailing whitespace.
fn expand_template(template: &str, rest: &str) -> String {
    let args: Vec<&str> = rest.split_whitespace().collect();
    let mut result = String::with_capacity(template.len() + rest.len());
    let mut chars = template.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
            Some('*') => {
                chars.next();
                result.push_str(rest);
            }
            Some(d) if d.is_ascii_digit() => {
                let mut index = 0usize;
                while let Some(&d) = chars.peek() {
                    if let Some(v) = d.to_digit(10) {
                        index = index * 10 + v as usize;
                        chars.next();
                    } else {
                        break;
                    }
                }
                // 1-indexed; $0 and out-of-range tokens render empty
                if index >= 1 {
                    if let Some(arg) = args.get(index - 1) {
                        result.push_str(arg);
                    }
                }
            }
            _ => result.push('$'),
        }
    }

    result.trim().to_string()
}
