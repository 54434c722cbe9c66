//! End-to-end gateway tests against a mock game server
//!
//! Each test runs a real gateway on an ephemeral port, a plain TCP listener
//! standing in for the MUD, and a real WebSocket client.

use std::net::SocketAddr;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use bridged::{GatewayConfig, GatewayServer};

type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

async fn start_gateway(upstream_port: u16) -> SocketAddr {
    let config = GatewayConfig {
        listen_addr: "127.0.0.1:0".to_string(),
        upstream_host: "127.0.0.1".to_string(),
        upstream_port,
        tick_interval: Duration::from_millis(10),
        ..Default::default()
    };
    let server = GatewayServer::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    tokio::spawn(server.run());
    addr
}

async fn ws_connect(addr: SocketAddr) -> WsClient {
    let (ws, _) = connect_async(format!("ws://{}", addr)).await.unwrap();
    ws
}

/// Next JSON frame from the gateway
async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let frame = timeout(WAIT, ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("connection closed")
            .expect("websocket error");
        if let Message::Text(text) = frame {
            return serde_json::from_str(&text).unwrap();
        }
    }
}

async fn send_json(ws: &mut WsClient, value: Value) {
    ws.send(Message::Text(value.to_string())).await.unwrap();
}

/// Accept the gateway's upstream dial on the mock MUD listener
async fn accept_mud(listener: &TcpListener) -> (BufReader<OwnedReadHalf>, OwnedWriteHalf) {
    let (stream, _) = timeout(WAIT, listener.accept()).await.unwrap().unwrap();
    let (read, write) = stream.into_split();
    (BufReader::new(read), write)
}

/// One CRLF-terminated line as received by the mock MUD
async fn mud_read_line(reader: &mut BufReader<OwnedReadHalf>) -> String {
    let mut line = String::new();
    timeout(WAIT, reader.read_line(&mut line))
        .await
        .expect("timed out waiting for an upstream line")
        .unwrap();
    line
}

#[tokio::test]
async fn alias_rewrites_command_end_to_end() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (mut mud_read, _mud_write) = accept_mud(&mud).await;

    let notice = next_json(&mut ws).await;
    assert_eq!(notice["type"], "system");

    send_json(
        &mut ws,
        json!({"type": "set_aliases",
               "aliases": [{"pattern": "k", "replacement": "kill $*"}]}),
    )
    .await;
    send_json(&mut ws, json!({"type": "command", "command": "k orc"})).await;

    assert_eq!(mud_read_line(&mut mud_read).await, "kill orc\r\n");
}

#[tokio::test]
async fn splitter_forwards_sub_commands_in_order() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (mut mud_read, _mud_write) = accept_mud(&mud).await;
    next_json(&mut ws).await; // connected notice

    send_json(
        &mut ws,
        json!({"type": "command", "command": "n;open door;;say hi\\;bye"}),
    )
    .await;

    assert_eq!(mud_read_line(&mut mud_read).await, "n\r\n");
    assert_eq!(mud_read_line(&mut mud_read).await, "open door\r\n");
    assert_eq!(mud_read_line(&mut mud_read).await, "say hi;bye\r\n");
}

#[tokio::test]
async fn trigger_metadata_reaches_client() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (_mud_read, mut mud_write) = accept_mud(&mud).await;
    next_json(&mut ws).await; // connected notice

    send_json(
        &mut ws,
        json!({"type": "set_triggers", "triggers": [
            {"pattern": "You have been slain", "matchType": "contains",
             "actions": [{"type": "highlight", "color": "#ff0000"},
                         {"type": "sound", "name": "alert"}]}
        ]}),
    )
    .await;
    // a keepalive round-trip guarantees the rule set is installed
    send_json(&mut ws, json!({"type": "keepalive"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "keepalive_ack");

    mud_write
        .write_all(b"You have been slain by a troll.\r\n")
        .await
        .unwrap();

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "mud");
    assert_eq!(msg["line"], "You have been slain by a troll.");
    assert_eq!(msg["highlight"], "#ff0000");
    assert_eq!(msg["sound"], "alert");
}

#[tokio::test]
async fn gag_suppresses_and_regex_trigger_derives_command() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (mut mud_read, mut mud_write) = accept_mud(&mud).await;
    next_json(&mut ws).await; // connected notice

    send_json(
        &mut ws,
        json!({"type": "set_triggers", "triggers": [
            {"pattern": "spam", "matchType": "contains",
             "actions": [{"type": "gag"}]},
            {"pattern": "hits? you", "matchType": "regex",
             "actions": [{"type": "command", "text": "flee"}]}
        ]}),
    )
    .await;
    send_json(&mut ws, json!({"type": "keepalive"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "keepalive_ack");

    mud_write
        .write_all(b"pure spam line\r\nThe orc hits you!\r\n")
        .await
        .unwrap();

    // the gagged line never arrives; the next mud frame is the hit line
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "mud");
    assert_eq!(msg["line"], "The orc hits you!");

    // the derived command reaches the upstream
    assert_eq!(mud_read_line(&mut mud_read).await, "flee\r\n");
}

#[tokio::test]
async fn dial_failure_then_command_reports_errors() {
    // a port with nothing listening on it
    let unused = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = unused.local_addr().unwrap().port();
    drop(unused);

    let addr = start_gateway(port).await;
    let mut ws = ws_connect(addr).await;

    let notice = next_json(&mut ws).await;
    assert_eq!(notice["type"], "error");

    send_json(&mut ws, json!({"type": "command", "command": "look"})).await;
    let reply = next_json(&mut ws).await;
    assert_eq!(reply["type"], "error");
}

#[tokio::test]
async fn upstream_eof_notifies_once_and_reconnect_redials() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (mud_read, mud_write) = accept_mud(&mud).await;
    assert_eq!(next_json(&mut ws).await["type"], "system");

    drop(mud_read);
    drop(mud_write);

    let notice = next_json(&mut ws).await;
    assert_eq!(notice["type"], "system");
    assert!(notice["message"].as_str().unwrap().contains("closed"));

    // no further frames until we ask for a reconnect; keepalive proves the
    // channel is quiet apart from its ack
    send_json(&mut ws, json!({"type": "keepalive"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "keepalive_ack");

    send_json(&mut ws, json!({"type": "reconnect"})).await;
    let (_read2, mut write2) = accept_mud(&mud).await;
    assert_eq!(next_json(&mut ws).await["type"], "system");

    write2.write_all(b"back online\r\n").await.unwrap();
    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "mud");
    assert_eq!(msg["line"], "back online");
}

#[tokio::test]
async fn unknown_message_type_is_ignored() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (_mud_read, _mud_write) = accept_mud(&mud).await;
    next_json(&mut ws).await; // connected notice

    send_json(&mut ws, json!({"type": "discord_relay", "payload": 1})).await;
    send_json(&mut ws, json!({"not even": "routable"})).await;

    // the session is still alive and answering
    send_json(&mut ws, json!({"type": "keepalive"})).await;
    assert_eq!(next_json(&mut ws).await["type"], "keepalive_ack");
}

#[tokio::test]
async fn partial_line_is_held_until_complete() {
    let mud = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = start_gateway(mud.local_addr().unwrap().port()).await;

    let mut ws = ws_connect(addr).await;
    let (_mud_read, mut mud_write) = accept_mud(&mud).await;
    next_json(&mut ws).await; // connected notice

    mud_write.write_all(b"You are stand").await.unwrap();
    mud_write.flush().await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;
    mud_write.write_all(b"ing in a field.\r\n").await.unwrap();

    let msg = next_json(&mut ws).await;
    assert_eq!(msg["type"], "mud");
    assert_eq!(msg["line"], "You are standing in a field.");
}
