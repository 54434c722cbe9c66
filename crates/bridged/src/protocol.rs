//! Client wire protocol
//!
//! JSON objects with a `type` discriminator in both directions. An unknown
//! inbound `type` is a deliberate no-op so older front-ends stay usable.

use bridgecore::{Alias, Trigger};
use serde::{Deserialize, Serialize};

/// Messages from the browser client
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A command line to rewrite, split, and forward upstream
    Command { command: String },
    /// Full replacement of the session's trigger set
    SetTriggers { triggers: Vec<Trigger> },
    /// Full replacement of the session's alias set
    SetAliases { aliases: Vec<Alias> },
    /// Liveness probe, answered immediately
    Keepalive,
    /// Tear down and re-dial the upstream connection
    Reconnect,
    /// Anything this gateway does not understand
    #[serde(other)]
    Unknown,
}

/// Messages to the browser client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection lifecycle notice
    System { message: String },
    /// Not-connected or dial-failure notice
    Error { message: String },
    /// One non-suppressed line of game text with its trigger metadata
    Mud {
        line: String,
        highlight: Option<String>,
        sound: Option<String>,
    },
    /// Answer to a keepalive
    KeepaliveAck,
}
