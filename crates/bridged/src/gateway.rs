//! The gateway event loop
//!
//! A single task owns every session and drives all of them from one
//! `select` loop: new client channels, client messages, dial results, and
//! the periodic I/O tick. Per-connection reader/writer tasks only shuttle
//! frames between the WebSocket and this task's channels; they hold no
//! session state. Within a tick each upstream gets one bounded non-blocking
//! read and one non-blocking write flush, so a slow, chatty, or stalled
//! connection cannot starve the rest.

use std::collections::HashMap;
use std::io;
use std::net::SocketAddr;

use bridgecore::{
    split_commands, AliasSet, ReadOutcome, TriggerSet, UpstreamConnection, UpstreamError,
};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use crate::config::GatewayConfig;
use crate::protocol::{ClientMessage, ServerMessage};
use crate::session::{Session, SessionId, SessionStatus};

/// Events delivered to the gateway task
enum GatewayEvent {
    /// A client channel opened
    Connected {
        id: SessionId,
        client_tx: mpsc::UnboundedSender<ServerMessage>,
    },
    /// A parsed message from a client
    Message { id: SessionId, msg: ClientMessage },
    /// A client channel closed
    Disconnected { id: SessionId },
    /// An upstream dial finished
    DialDone {
        id: SessionId,
        result: Result<UpstreamConnection, UpstreamError>,
    },
}

/// Session table plus everything needed to mutate it
struct Gateway {
    config: GatewayConfig,
    sessions: HashMap<SessionId, Session>,
    events_tx: mpsc::UnboundedSender<GatewayEvent>,
}

impl Gateway {
    fn new(config: GatewayConfig, events_tx: mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self {
            config,
            sessions: HashMap::new(),
            events_tx,
        }
    }

    /// Kick off an upstream dial without blocking the event loop
    fn start_dial(&self, id: SessionId) {
        let host = self.config.upstream_host.clone();
        let port = self.config.upstream_port;
        let upstream_config = self.config.upstream.clone();
        let events = self.events_tx.clone();

        tokio::spawn(async move {
            let mut conn = UpstreamConnection::new(upstream_config);
            let result = conn.connect(&host, port).await.map(|_| conn);
            let _ = events.send(GatewayEvent::DialDone { id, result });
        });
    }

    fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Connected { id, client_tx } => {
                info!("session {} opened", id);
                let session = Session::new(id, client_tx, self.config.upstream.clone());
                self.sessions.insert(id, session);
                self.start_dial(id);
            }
            GatewayEvent::Message { id, msg } => {
                if matches!(msg, ClientMessage::Reconnect) {
                    let Some(session) = self.sessions.get_mut(&id) else {
                        return;
                    };
                    info!(
                        "session {} reconnecting to {}:{}",
                        id, self.config.upstream_host, self.config.upstream_port
                    );
                    session.upstream.disconnect();
                    session.line_buffer.clear();
                    session.status = SessionStatus::Connecting;
                    self.start_dial(id);
                    return;
                }
                let Some(session) = self.sessions.get_mut(&id) else {
                    return;
                };
                match msg {
                    ClientMessage::Command { command } => {
                        forward_command(session, &command);
                    }
                    ClientMessage::SetTriggers { triggers } => {
                        debug!("session {} replacing {} triggers", id, triggers.len());
                        session.triggers = TriggerSet::new(triggers);
                    }
                    ClientMessage::SetAliases { aliases } => {
                        debug!("session {} replacing {} aliases", id, aliases.len());
                        session.aliases = AliasSet::new(aliases);
                    }
                    ClientMessage::Keepalive => {
                        session.send(ServerMessage::KeepaliveAck);
                    }
                    ClientMessage::Reconnect | ClientMessage::Unknown => {}
                }
            }
            GatewayEvent::Disconnected { id } => {
                if let Some(mut session) = self.sessions.remove(&id) {
                    session.close_upstream();
                    info!("session {} closed", id);
                }
            }
            GatewayEvent::DialDone { id, result } => {
                let host = &self.config.upstream_host;
                let port = self.config.upstream_port;
                let Some(session) = self.sessions.get_mut(&id) else {
                    return; // client went away while dialing
                };
                if session.status != SessionStatus::Connecting {
                    return; // superseded by a disconnect or another reconnect
                }
                match result {
                    Ok(conn) => {
                        session.upstream = conn;
                        session.status = SessionStatus::Open;
                        session.system(format!("Connected to {}:{}.", host, port));
                    }
                    Err(e) => {
                        warn!("session {} dial failed: {}", id, e);
                        session.status = SessionStatus::Closed;
                        session.error(format!("Could not connect to {}:{}: {}", host, port, e));
                    }
                }
            }
        }
    }

    /// One cooperative pass over every open session
    fn tick(&mut self) {
        for session in self.sessions.values_mut() {
            if session.status != SessionStatus::Open {
                continue;
            }

            // retry outbound bytes the socket could not take earlier
            if let Err(e) = session.upstream.flush_pending() {
                warn!("session {} upstream write failed: {}", session.id, e);
                session.status = SessionStatus::Closed;
                session.system(format!("Connection to the game server lost: {}", e));
                continue;
            }

            match session.upstream.poll_read() {
                Ok(ReadOutcome::Idle) => {}
                Ok(ReadOutcome::Data(bytes)) => {
                    let lines = session.line_buffer.push_bytes(&bytes);
                    deliver_lines(session, lines);
                }
                Ok(ReadOutcome::Closed) => {
                    info!("session {} upstream closed", session.id);
                    session.status = SessionStatus::Closed;
                    session.system("Connection to the game server closed.");
                }
                Err(e) => {
                    warn!("session {} upstream error: {}", session.id, e);
                    session.status = SessionStatus::Closed;
                    session.system(format!("Connection to the game server lost: {}", e));
                }
            }
        }
    }
}

/// Evaluate and deliver one batch of complete inbound lines
///
/// Stops as soon as the session leaves `Open`: once the lost-connection
/// notice has gone out, no further `mud` frames or per-command errors
/// follow for the rest of the batch.
fn deliver_lines(session: &mut Session, lines: Vec<String>) {
    for line in lines {
        let evaluation = session.triggers.evaluate(&line);
        if !evaluation.suppressed {
            session.send(ServerMessage::Mud {
                line,
                highlight: evaluation.highlight,
                sound: evaluation.sound,
            });
        }
        // derived commands re-enter the outbound path before the next
        // inbound line is processed
        for command in &evaluation.commands {
            forward_command(session, command);
            if session.status != SessionStatus::Open {
                break;
            }
        }
        if session.status != SessionStatus::Open {
            break;
        }
    }
}

/// Rewrite, split, and forward one client command
///
/// Alias substitution happens once, then each non-empty sub-command is
/// written in order. A session that is not `Open` gets an error notice
/// instead of a silent drop.
fn forward_command(session: &mut Session, raw: &str) {
    if session.status != SessionStatus::Open {
        session.error("Not connected to the game server.");
        return;
    }

    let rewritten = session.aliases.apply(raw);
    for command in split_commands(&rewritten) {
        if let Err(e) = session.upstream.send_line(&command) {
            warn!("session {} upstream write failed: {}", session.id, e);
            session.status = SessionStatus::Closed;
            session.upstream.disconnect();
            session.system(format!("Connection to the game server lost: {}", e));
            return;
        }
    }
}

/// The bound-but-not-yet-running gateway
pub struct GatewayServer {
    listener: TcpListener,
    config: GatewayConfig,
}

impl GatewayServer {
    /// Bind the WebSocket listener
    pub async fn bind(config: GatewayConfig) -> io::Result<Self> {
        let listener = TcpListener::bind(&config.listen_addr).await?;
        Ok(Self { listener, config })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Run the accept loop, the event loop, and the periodic tick
    pub async fn run(self) {
        let (events_tx, mut events_rx) = mpsc::unbounded_channel();
        let mut gateway = Gateway::new(self.config.clone(), events_tx.clone());
        let mut ticker = tokio::time::interval(self.config.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(
            "gateway listening on {} for upstream {}:{}",
            self.config.listen_addr, self.config.upstream_host, self.config.upstream_port
        );

        loop {
            tokio::select! {
                accepted = self.listener.accept() => {
                    match accepted {
                        Ok((stream, peer)) => {
                            tokio::spawn(serve_channel(stream, peer, events_tx.clone()));
                        }
                        Err(e) => warn!("accept failed: {}", e),
                    }
                }
                Some(event) = events_rx.recv() => {
                    gateway.handle_event(event);
                }
                _ = ticker.tick() => {
                    gateway.tick();
                }
            }
        }
    }
}

/// Bridge one WebSocket to the gateway task
///
/// The reader half runs here; a spawned writer half drains the session's
/// outbound queue. Malformed frames are ignored (the protocol is
/// fail-silent) and any termination path emits exactly one `Disconnected`.
async fn serve_channel(
    stream: TcpStream,
    peer: SocketAddr,
    events: mpsc::UnboundedSender<GatewayEvent>,
) {
    let ws = match tokio_tungstenite::accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("handshake with {} failed: {}", peer, e);
            return;
        }
    };
    let (mut sink, mut frames) = ws.split();

    let id = SessionId::new();
    let (client_tx, mut client_rx) = mpsc::unbounded_channel::<ServerMessage>();
    if events.send(GatewayEvent::Connected { id, client_tx }).is_err() {
        return;
    }
    debug!("session {} from {}", id, peer);

    // writer: ends when the gateway drops the session's sender
    tokio::spawn(async move {
        while let Some(msg) = client_rx.recv().await {
            let Ok(text) = serde_json::to_string(&msg) else {
                continue;
            };
            if sink.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = frames.next().await {
        match frame {
            Ok(Message::Text(text)) => {
                // unroutable messages are ignored by design
                if let Ok(msg) = serde_json::from_str::<ClientMessage>(&text) {
                    if events.send(GatewayEvent::Message { id, msg }).is_err() {
                        break;
                    }
                }
            }
            Ok(Message::Close(_)) | Err(_) => break,
            Ok(_) => {} // binary/ping/pong frames carry nothing for us
        }
    }

    let _ = events.send(GatewayEvent::Disconnected { id });
}
