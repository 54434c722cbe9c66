//! MUD Bridge Core Library
//!
//! Core functionality for the web-to-MUD gateway:
//! - `matcher`: pattern matching for trigger rules
//! - `alias`: outbound command rewriting
//! - `trigger`: inbound line evaluation and side effects
//! - `splitter`: separator-based command splitting
//! - `linebuf`: line assembly across partial reads
//! - `telnet`: IAC negotiation stripping
//! - `upstream`: the per-session game server connection

pub mod alias;
pub mod linebuf;
pub mod matcher;
pub mod splitter;
pub mod telnet;
pub mod trigger;
pub mod upstream;

pub use alias::{Alias, AliasSet};
pub use linebuf::LineBuffer;
pub use matcher::MatchType;
pub use splitter::split_commands;
pub use trigger::{Action, Evaluation, Trigger, TriggerSet};
pub use upstream::{ReadOutcome, UpstreamConfig, UpstreamConnection, UpstreamError};
