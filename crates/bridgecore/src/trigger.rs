//! Trigger rules for inbound game text
//!
//! Every enabled trigger in the set is evaluated against every complete line
//! from the upstream. Matches accumulate into one [`Evaluation`] per line:
//! gag is a cumulative-or, highlight and sound are last-match-wins, and
//! derived commands collect in match order. Evaluation never stops early, so
//! a gagged line can still drive automation from later triggers.

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::matcher::{self, MatchType};

fn default_enabled() -> bool {
    true
}

/// One side effect of a matching trigger
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Suppress the line from the client
    Gag,
    /// Tag the line with a display color
    Highlight { color: String },
    /// Emit a command back toward the upstream; `$0..$N` reference regex
    /// capture groups when the owning trigger is regex-matched
    Command { text: String },
    /// Tag the line with a notification sound; older front-ends send the
    /// field as `sound` instead of `name`
    Sound {
        #[serde(alias = "sound")]
        name: String,
    },
}

/// A single trigger rule
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Trigger {
    pub pattern: String,
    pub match_type: MatchType,
    #[serde(default)]
    pub actions: Vec<Action>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Storage sort key only; live evaluation runs in received-set order
    #[serde(default)]
    pub priority: i64,
    /// Cached compiled form of a regex pattern; `None` when the pattern is
    /// plain text or failed to compile
    #[serde(skip)]
    compiled_regex: Option<Regex>,
}

impl Trigger {
    pub fn new(pattern: impl Into<String>, match_type: MatchType) -> Self {
        let mut trigger = Self {
            pattern: pattern.into(),
            match_type,
            actions: Vec::new(),
            enabled: true,
            priority: 0,
            compiled_regex: None,
        };
        trigger.compile();
        trigger
    }

    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Compile the regex pattern, if any
    ///
    /// A malformed pattern leaves `compiled_regex` as `None` and the trigger
    /// simply never matches.
    pub fn compile(&mut self) {
        self.compiled_regex = match self.match_type {
            MatchType::Regex => matcher::compile(&self.pattern),
            _ => None,
        };
    }

    /// Match this trigger against a line
    ///
    /// Returns `None` when disabled or not matching, `Some(captures)` on a
    /// regex match, and `Some(empty)` for plain-text matches.
    fn try_match(&self, line: &str) -> Option<Vec<String>> {
        if !self.enabled {
            return None;
        }
        match self.match_type {
            MatchType::Regex => {
                let regex = self.compiled_regex.as_ref()?;
                matcher::capture_groups(line, regex)
            }
            ty => {
                if matcher::matches(line, &self.pattern, ty) {
                    Some(Vec::new())
                } else {
                    None
                }
            }
        }
    }
}

/// The accumulated result of evaluating one line against a trigger set
///
/// The line itself is never rewritten; it is only suppressed or tagged.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Evaluation {
    pub suppressed: bool,
    pub highlight: Option<String>,
    pub commands: Vec<String>,
    pub sound: Option<String>,
}

/// An ordered trigger set, replaced wholesale by the client
#[derive(Debug, Clone, Default)]
pub struct TriggerSet {
    triggers: Vec<Trigger>,
}

impl TriggerSet {
    /// Build a set, compiling every regex pattern once up front
    pub fn new(mut triggers: Vec<Trigger>) -> Self {
        for trigger in &mut triggers {
            trigger.compile();
        }
        Self { triggers }
    }

    pub fn len(&self) -> usize {
        self.triggers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.triggers.is_empty()
    }

    /// Evaluate one inbound line against every trigger in set order
    pub fn evaluate(&self, line: &str) -> Evaluation {
        let mut evaluation = Evaluation::default();

        for trigger in &self.triggers {
            let Some(captures) = trigger.try_match(line) else {
                continue;
            };

            for action in &trigger.actions {
                match action {
                    Action::Gag => evaluation.suppressed = true,
                    Action::Highlight { color } => {
                        evaluation.highlight = Some(color.clone());
                    }
                    Action::Command { text } => {
                        let command = if trigger.match_type == MatchType::Regex {
                            substitute_captures(text, &captures)
                        } else {
                            text.clone()
                        };
                        evaluation.commands.push(command);
                    }
                    Action::Sound { name } => {
                        evaluation.sound = Some(name.clone());
                    }
                }
            }
        }

        evaluation
    }
}

/// Replace `$0..$N` in a command action with regex capture groups
///
/// Indices past the capture list render empty.
fn substitute_captures(text: &str, captures: &[String]) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '$' {
            result.push(c);
            continue;
        }
        match chars.peek() {
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
                if let Some(capture) = captures.get(index) {
                    result.push_str(capture);
                }
            }
            _ => result.push('$'),
        }
    }

    result
}
