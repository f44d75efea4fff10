//! End-to-end tests over real TCP sockets.

#![allow(clippy::panic)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use relay_gateway::api;
use relay_gateway::app_state::AppState;
use relay_gateway::config::RelayConfig;
use relay_gateway::domain::RelayEvent;
use relay_gateway::protocol::handshake::accept_token;
use relay_gateway::service::RelayServer;

const READ_TIMEOUT: Duration = Duration::from_secs(5);

fn config() -> RelayConfig {
    RelayConfig {
        listen_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        ..RelayConfig::default()
    }
}

async fn start(config: RelayConfig) -> (Arc<RelayServer>, SocketAddr) {
    let relay = Arc::new(RelayServer::new(config));
    let Ok(addr) = relay.start().await else {
        panic!("relay failed to start");
    };
    (relay, addr)
}

async fn connect(addr: SocketAddr) -> TcpStream {
    let Ok(stream) = TcpStream::connect(addr).await else {
        panic!("connect to {addr} failed");
    };
    stream
}

async fn send(stream: &mut TcpStream, bytes: &[u8]) {
    let Ok(()) = stream.write_all(bytes).await else {
        panic!("client write failed");
    };
}

async fn read_exact_text(stream: &mut TcpStream, len: usize) -> String {
    let mut buf = vec![0u8; len];
    match tokio::time::timeout(READ_TIMEOUT, stream.read_exact(&mut buf)).await {
        Ok(Ok(_)) => String::from_utf8_lossy(&buf).into_owned(),
        Ok(Err(e)) => panic!("read failed: {e}"),
        Err(_) => panic!("timed out waiting for {len} bytes"),
    }
}

fn upgrade_request(key: &str) -> String {
    format!(
        "GET / HTTP/1.1\r\n\
         Host: 127.0.0.1\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: {key}\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n"
    )
}

fn expected_response(key: &str) -> String {
    format!(
        "HTTP/1.1 101 Switching Protocols\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Accept: {}\r\n\r\n",
        accept_token(key)
    )
}

async fn handshake(addr: SocketAddr, key: &str) -> TcpStream {
    let mut stream = connect(addr).await;
    send(&mut stream, upgrade_request(key).as_bytes()).await;
    let expected = expected_response(key);
    assert_eq!(read_exact_text(&mut stream, expected.len()).await, expected);
    stream
}

#[tokio::test]
async fn two_clients_both_receive_a_message() {
    let (relay, addr) = start(config()).await;
    let mut a = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;
    let mut b = handshake(addr, "x3JJHMbDL1EzLkh9GBhXDw==").await;

    send(&mut a, b"hello").await;
    assert_eq!(read_exact_text(&mut a, 5).await, "hello");
    assert_eq!(read_exact_text(&mut b, 5).await, "hello");

    send(&mut b, b"world").await;
    assert_eq!(read_exact_text(&mut a, 5).await, "world");
    assert_eq!(read_exact_text(&mut b, 5).await, "world");

    let texts: Vec<String> = relay
        .message_log()
        .snapshot()
        .await
        .into_iter()
        .map(|m| m.text)
        .collect();
    assert_eq!(texts, ["hello", "world"]);
    relay.stop().await;
}

#[tokio::test]
async fn exclude_sender_keeps_echo_off() {
    let (relay, addr) = start(RelayConfig {
        exclude_sender: true,
        ..config()
    })
    .await;
    let mut a = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;
    let mut b = handshake(addr, "x3JJHMbDL1EzLkh9GBhXDw==").await;

    send(&mut a, b"one").await;
    assert_eq!(read_exact_text(&mut b, 3).await, "one");
    send(&mut b, b"two").await;
    // The first thing A sees is B's message, not its own echo.
    assert_eq!(read_exact_text(&mut a, 3).await, "two");
    relay.stop().await;
}

#[tokio::test]
async fn plain_client_is_relayed_without_handshake_response() {
    let (relay, addr) = start(config()).await;
    let mut upgraded = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;
    let mut plain = connect(addr).await;

    send(&mut plain, b"no handshake here").await;
    assert_eq!(read_exact_text(&mut plain, 17).await, "no handshake here");
    assert_eq!(read_exact_text(&mut upgraded, 17).await, "no handshake here");
    relay.stop().await;
}

#[tokio::test]
async fn bad_handshake_closes_only_that_connection() {
    let (relay, addr) = start(config()).await;
    let mut good = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;
    let mut bad = connect(addr).await;

    send(&mut bad, b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await;
    let mut buf = [0u8; 16];
    match tokio::time::timeout(READ_TIMEOUT, bad.read(&mut buf)).await {
        Ok(Ok(0)) => {}
        Ok(Ok(n)) => panic!("rejected client received {n} bytes"),
        Ok(Err(_)) => {}
        Err(_) => panic!("rejected client was not closed"),
    }

    send(&mut good, b"still up").await;
    assert_eq!(read_exact_text(&mut good, 8).await, "still up");
    assert_eq!(relay.registry().len().await, 1);
    relay.stop().await;
}

#[tokio::test]
async fn stop_disconnects_everyone() {
    let (relay, addr) = start(config()).await;
    let mut a = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;
    let mut events = relay.event_bus().subscribe();

    assert_eq!(relay.stop().await, 1);
    assert!(relay.registry().is_empty().await);
    assert_eq!(relay.broadcast(b"late").await.attempted, 0);

    let mut buf = [0u8; 4];
    match tokio::time::timeout(READ_TIMEOUT, a.read(&mut buf)).await {
        Ok(Ok(0) | Err(_)) => {}
        Ok(Ok(n)) => panic!("received {n} bytes after stop"),
        Err(_) => panic!("client not closed by stop"),
    }

    let Ok(Ok(event)) = tokio::time::timeout(READ_TIMEOUT, events.recv()).await else {
        panic!("no disconnect event");
    };
    assert!(matches!(event, RelayEvent::ClientDisconnected { .. }));
    assert!(TcpStream::connect(addr).await.is_err());
}

#[tokio::test]
async fn admin_api_reports_live_connections() {
    let (relay, addr) = start(config()).await;
    let _a = handshake(addr, "dGhlIHNhbXBsZSBub25jZQ==").await;

    let Ok(admin) = tokio::net::TcpListener::bind("127.0.0.1:0").await else {
        panic!("admin bind failed");
    };
    let Ok(admin_addr) = admin.local_addr() else {
        panic!("no admin addr");
    };
    let app = api::app(AppState {
        relay: Arc::clone(&relay),
    });
    let server = tokio::spawn(async move { axum::serve(admin, app).await });

    let Ok(response) = reqwest::get(format!("http://{admin_addr}/api/v1/connections")).await else {
        panic!("admin request failed");
    };
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let Ok(body) = response.json::<serde_json::Value>().await else {
        panic!("admin body is not json");
    };
    assert_eq!(body["total"], 1);
    assert_eq!(body["data"][0]["handshake_state"], "upgraded");

    let Ok(health) = reqwest::get(format!("http://{admin_addr}/health")).await else {
        panic!("health request failed");
    };
    let Ok(health) = health.json::<serde_json::Value>().await else {
        panic!("health body is not json");
    };
    assert_eq!(health["status"], "healthy");
    assert_eq!(health["active_connections"], 1);

    server.abort();
    relay.stop().await;
}
