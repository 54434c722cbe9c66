//! Upstream MUD connection
//!
//! One TCP connection per session to the legacy game server. Both
//! directions are non-blocking: reads are bounded to one chunk per call so
//! a chatty upstream can never monopolize the gateway tick, and writes go
//! through a capped outbound buffer so an upstream that stops reading can
//! never stall the caller.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::{debug, info};

use crate::telnet;

/// Unconsumed negotiation bytes kept across reads before the pending
/// sequence is abandoned; a server that opens a subnegotiation and never
/// closes it must not grow memory forever
const MAX_PENDING_NEGOTIATION: usize = 4096;

/// Upstream connection error
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("connection failed: {0}")]
    ConnectionFailed(#[from] io::Error),

    #[error("connection timed out")]
    Timeout,

    #[error("not connected")]
    NotConnected,

    #[error("DNS resolution failed: {0}")]
    DnsResolutionFailed(String),

    #[error("outbound backlog limit exceeded")]
    WriteBacklog,
}

/// Upstream connection configuration
#[derive(Debug, Clone)]
pub struct UpstreamConfig {
    /// Dial timeout
    pub connect_timeout: Duration,
    /// Per-call read cap; also the per-tick budget for one session
    pub read_chunk_size: usize,
    /// Cap on buffered outbound bytes awaiting socket readiness; exceeding
    /// it drops the connection rather than queueing without bound
    pub max_pending_writes: usize,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            read_chunk_size: 8192,
            max_pending_writes: 64 * 1024,
        }
    }
}

/// Outcome of one bounded non-blocking read attempt
#[derive(Debug, PartialEq)]
pub enum ReadOutcome {
    /// Game text bytes, already stripped of Telnet negotiation
    Data(Vec<u8>),
    /// Nothing to read this tick
    Idle,
    /// The server closed the connection
    Closed,
}

/// A session's connection to the game server
///
/// `None` stream means disconnected; the owner decides when to re-dial.
pub struct UpstreamConnection {
    stream: Option<TcpStream>,
    config: UpstreamConfig,
    /// Raw bytes holding an incomplete Telnet sequence across reads
    raw_buffer: Vec<u8>,
    /// Outbound bytes the socket could not take yet
    write_buffer: Vec<u8>,
}

impl UpstreamConnection {
    pub fn new(config: UpstreamConfig) -> Self {
        Self {
            stream: None,
            config,
            raw_buffer: Vec::new(),
            write_buffer: Vec::new(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    /// Dial the game server
    pub async fn connect(&mut self, host: &str, port: u16) -> Result<(), UpstreamError> {
        let addr = format!("{}:{}", host, port);
        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host(&addr)
            .await
            .map_err(|e| UpstreamError::DnsResolutionFailed(e.to_string()))?
            .collect();

        if socket_addrs.is_empty() {
            return Err(UpstreamError::DnsResolutionFailed(format!(
                "no addresses for {}",
                host
            )));
        }

        let stream = timeout(
            self.config.connect_timeout,
            TcpStream::connect(&socket_addrs[0]),
        )
        .await
        .map_err(|_| UpstreamError::Timeout)?
        .map_err(UpstreamError::ConnectionFailed)?;

        stream.set_nodelay(true)?;

        info!("connected to {}:{}", host, port);
        self.raw_buffer.clear();
        self.write_buffer.clear();
        self.stream = Some(stream);
        Ok(())
    }

    /// Close the connection immediately
    pub fn disconnect(&mut self) {
        if self.stream.take().is_some() {
            debug!("upstream disconnected");
        }
        self.raw_buffer.clear();
        self.write_buffer.clear();
    }

    /// Queue one CRLF-terminated text line and flush as far as the socket
    /// allows
    ///
    /// Never blocks. Bytes the socket cannot take yet stay buffered and are
    /// retried by [`flush_pending`](Self::flush_pending) on the next tick.
    pub fn send_line(&mut self, line: &str) -> Result<(), UpstreamError> {
        if self.stream.is_none() {
            return Err(UpstreamError::NotConnected);
        }

        self.write_buffer.reserve(line.len() + 2);
        self.write_buffer.extend_from_slice(line.as_bytes());
        self.write_buffer.extend_from_slice(b"\r\n");
        debug!("queued: {}", line);

        self.flush_pending()
    }

    /// Write buffered outbound bytes without blocking
    ///
    /// A backlog past `max_pending_writes` drops the connection: the
    /// upstream has stopped reading and queueing more would only grow
    /// memory.
    pub fn flush_pending(&mut self) -> Result<(), UpstreamError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        let stream = self.stream.as_mut().ok_or(UpstreamError::NotConnected)?;

        while !self.write_buffer.is_empty() {
            match stream.try_write(&self.write_buffer) {
                Ok(0) => {
                    self.reset_buffers();
                    return Err(UpstreamError::ConnectionFailed(io::Error::new(
                        io::ErrorKind::WriteZero,
                        "socket accepted no bytes",
                    )));
                }
                Ok(n) => {
                    self.write_buffer.drain(..n);
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) => {
                    self.reset_buffers();
                    return Err(UpstreamError::ConnectionFailed(e));
                }
            }
        }

        if self.write_buffer.len() > self.config.max_pending_writes {
            self.reset_buffers();
            return Err(UpstreamError::WriteBacklog);
        }
        Ok(())
    }

    fn reset_buffers(&mut self) {
        self.stream = None;
        self.raw_buffer.clear();
        self.write_buffer.clear();
    }

    /// One bounded non-blocking read attempt
    ///
    /// Never blocks and reads at most `read_chunk_size` bytes, so the caller
    /// can poll every session within a single tick. EOF and I/O errors drop
    /// the stream; negotiation replies are written back best-effort.
    pub fn poll_read(&mut self) -> Result<ReadOutcome, UpstreamError> {
        let stream = self.stream.as_mut().ok_or(UpstreamError::NotConnected)?;

        let mut chunk = vec![0u8; self.config.read_chunk_size];
        match stream.try_read(&mut chunk) {
            Ok(0) => {
                self.reset_buffers();
                Ok(ReadOutcome::Closed)
            }
            Ok(n) => {
                self.raw_buffer.extend_from_slice(&chunk[..n]);
                let stripped = telnet::strip_negotiation(&self.raw_buffer);
                self.raw_buffer.drain(..stripped.consumed);
                if self.raw_buffer.len() > MAX_PENDING_NEGOTIATION {
                    debug!("discarding unterminated negotiation sequence");
                    self.raw_buffer.clear();
                }

                if !stripped.replies.is_empty() {
                    // refusals are advisory; a full write buffer just drops them
                    let _ = stream.try_write(&stripped.replies);
                }

                Ok(ReadOutcome::Data(stripped.text))
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => Ok(ReadOutcome::Idle),
            Err(e) => {
                self.reset_buffers();
                Err(UpstreamError::ConnectionFailed(e))
            }
        }
    }
}

impl Default for UpstreamConnection {
    fn default() -> Self {
        Self::new(UpstreamConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;
    use tokio::net::TcpListener;
    use tokio_test::assert_ok;

    #[test]
    fn test_config_default() {
        let config = UpstreamConfig::default();
        assert_eq!(config.connect_timeout, Duration::from_secs(10));
        assert_eq!(config.read_chunk_size, 8192);
    }

    #[test]
    fn test_send_without_connection() {
        let mut conn = UpstreamConnection::default();
        assert!(matches!(
            conn.send_line("test"),
            Err(UpstreamError::NotConnected)
        ));
    }

    #[test]
    fn test_poll_read_without_connection() {
        let mut conn = UpstreamConnection::default();
        assert!(matches!(
            conn.poll_read(),
            Err(UpstreamError::NotConnected)
        ));
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let mut conn = UpstreamConnection::default();
        let result = conn.connect("127.0.0.1", port).await;
        assert!(result.is_err());
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_send_line_appends_crlf() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = UpstreamConnection::default();
        assert_ok!(conn.connect("127.0.0.1", addr.port()).await);
        let (mut server, _) = listener.accept().await.unwrap();

        assert_ok!(conn.send_line("kill orc"));

        let mut buf = vec![0u8; 64];
        let n = server.read(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"kill orc\r\n");
    }

    #[tokio::test]
    async fn test_send_line_never_blocks_and_caps_backlog() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = UpstreamConnection::new(UpstreamConfig {
            max_pending_writes: 1024,
            ..UpstreamConfig::default()
        });
        assert_ok!(conn.connect("127.0.0.1", addr.port()).await);
        // the server never reads, so the kernel buffers fill and then the
        // backlog cap trips instead of the sender stalling
        let (server, _) = listener.accept().await.unwrap();

        let line = "x".repeat(4096);
        let mut result = Ok(());
        for _ in 0..100_000 {
            result = conn.send_line(&line);
            if result.is_err() {
                break;
            }
        }

        assert!(matches!(result, Err(UpstreamError::WriteBacklog)));
        assert!(!conn.is_connected());
        drop(server);
    }

    #[tokio::test]
    async fn test_poll_read_idle_then_data_then_closed() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = UpstreamConnection::default();
        conn.connect("127.0.0.1", addr.port()).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        assert_eq!(conn.poll_read().unwrap(), ReadOutcome::Idle);

        tokio::io::AsyncWriteExt::write_all(&mut server, b"hello\r\n")
            .await
            .unwrap();
        // give the kernel a moment to deliver
        tokio::time::sleep(Duration::from_millis(50)).await;
        match conn.poll_read().unwrap() {
            ReadOutcome::Data(bytes) => assert_eq!(bytes, b"hello\r\n"),
            other => panic!("expected data, got {:?}", other),
        }

        drop(server);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(conn.poll_read().unwrap(), ReadOutcome::Closed);
        assert!(!conn.is_connected());
    }

    #[tokio::test]
    async fn test_poll_read_strips_negotiation() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = UpstreamConnection::default();
        conn.connect("127.0.0.1", addr.port()).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        let mut payload = vec![telnet::IAC, 251, 86]; // IAC WILL MCCP2
        payload.extend_from_slice(b"text\n");
        tokio::io::AsyncWriteExt::write_all(&mut server, &payload)
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;

        match conn.poll_read().unwrap() {
            ReadOutcome::Data(bytes) => assert_eq!(bytes, b"text\n"),
            other => panic!("expected data, got {:?}", other),
        }

        // the refusal reaches the server
        let mut buf = vec![0u8; 8];
        let n = tokio::io::AsyncReadExt::read(&mut server, &mut buf)
            .await
            .unwrap();
        assert_eq!(&buf[..n], &[telnet::IAC, 254, 86]); // IAC DONT MCCP2
    }

    #[tokio::test]
    async fn test_unterminated_subnegotiation_is_bounded() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let mut conn = UpstreamConnection::default();
        conn.connect("127.0.0.1", addr.port()).await.unwrap();
        let (mut server, _) = listener.accept().await.unwrap();

        // IAC SB with no closing IAC SE, padded well past the cap
        let mut payload = vec![telnet::IAC, 250, 24];
        payload.extend_from_slice(&vec![1u8; 2 * MAX_PENDING_NEGOTIATION]);
        tokio::io::AsyncWriteExt::write_all(&mut server, &payload)
            .await
            .unwrap();

        // drain the flood; the pending sequence gets discarded, not hoarded
        for _ in 0..10 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let _ = conn.poll_read();
        }
        assert!(conn.raw_buffer.len() <= MAX_PENDING_NEGOTIATION);
        assert!(conn.is_connected());
    }
}
