//! Per-client session state
//!
//! One Session per open client channel: the rule sets currently in effect,
//! the upstream connection, and the partial-line receive buffer. All state
//! is owned exclusively by the gateway task; sessions never touch each
//! other.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use bridgecore::{AliasSet, LineBuffer, TriggerSet, UpstreamConfig, UpstreamConnection};
use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::ServerMessage;

/// Opaque session identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(u64);

impl SessionId {
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Upstream connection state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    /// Upstream dial in flight
    Connecting,
    /// Upstream connected, traffic flowing
    Open,
    /// Upstream gone; only `reconnect` leaves this state
    Closed,
}

/// One bridged player
pub struct Session {
    pub id: SessionId,
    pub status: SessionStatus,
    pub upstream: UpstreamConnection,
    pub line_buffer: LineBuffer,
    pub aliases: AliasSet,
    pub triggers: TriggerSet,
    client_tx: mpsc::UnboundedSender<ServerMessage>,
}

impl Session {
    pub fn new(
        id: SessionId,
        client_tx: mpsc::UnboundedSender<ServerMessage>,
        upstream_config: UpstreamConfig,
    ) -> Self {
        Self {
            id,
            status: SessionStatus::Connecting,
            upstream: UpstreamConnection::new(upstream_config),
            line_buffer: LineBuffer::new(),
            aliases: AliasSet::default(),
            triggers: TriggerSet::default(),
            client_tx,
        }
    }

    /// Queue a message for the client
    ///
    /// A send failure means the channel writer is gone; the gateway will see
    /// the disconnect event shortly, so the message is just dropped.
    pub fn send(&self, msg: ServerMessage) {
        if self.client_tx.send(msg).is_err() {
            debug!("session {} client channel gone", self.id);
        }
    }

    /// Lifecycle notice
    pub fn system(&self, message: impl Into<String>) {
        self.send(ServerMessage::System {
            message: message.into(),
        });
    }

    /// Not-connected / dial-failure notice
    pub fn error(&self, message: impl Into<String>) {
        self.send(ServerMessage::Error {
            message: message.into(),
        });
    }

    /// Tear down the upstream side, e.g. when the client channel closed
    pub fn close_upstream(&mut self) {
        self.upstream.disconnect();
        self.line_buffer.clear();
        self.status = SessionStatus::Closed;
    }
}
