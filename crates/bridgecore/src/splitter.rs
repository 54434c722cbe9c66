//! Command splitting
//!
//! One input buffer from the client may hold several commands separated by
//! `;`. A backslash escapes the next character (including a separator) and is
//! dropped from the output. Empty commands are not forwarded upstream, so
//! they are dropped here.

/// Separator between commands in a single input buffer
pub const SEPARATOR: char = ';';

/// Split an input buffer into discrete, non-empty commands
pub fn split_commands(input: &str) -> Vec<String> {
    let mut commands = Vec::new();
    let mut current = String::new();
    let mut escaped = false;

    for c in input.chars() {
        if escaped {
            current.push(c);
            escaped = false;
        } else if c == '\\' {
            escaped = true;
        } else if c == SEPARATOR {
            if !current.is_empty() {
                commands.push(std::mem::take(&mut current));
            }
        } else {
            current.push(c);
        }
    }

    if !current.is_empty() {
        commands.push(current);
    }

    commands
}
