//! MUD Bridge Daemon
//!
//! Accepts browser WebSocket sessions, applies per-session alias and
//! trigger rules, and proxies each session to the legacy game server:
//! - `config`: runtime configuration
//! - `protocol`: the client JSON message protocol
//! - `session`: per-client state
//! - `gateway`: the single-task event loop and tick

pub mod config;
pub mod gateway;
pub mod protocol;
pub mod session;

pub use config::GatewayConfig;
pub use gateway::GatewayServer;
pub use protocol::{ClientMessage, ServerMessage};
pub use session::{Session, SessionId, SessionStatus};
