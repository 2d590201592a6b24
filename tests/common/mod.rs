//! Common utilities for integration tests
//!
//! Starts an in-process relay on an ephemeral port and provides small
//! helpers for driving it with real WebSocket clients.
#![allow(dead_code)] // Not every test file uses every helper

use assert_cmd::Command;
use futures_util::{SinkExt, StreamExt};
use signal_relay::config::ServerConfig;
use signal_relay::signaling::{Registry, SignalingServer, SIGNALING_PATH};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// How long a test waits for a frame before deciding none is coming
pub const RECV_TIMEOUT: Duration = Duration::from_secs(2);

/// Relay running inside the test process
pub struct TestServer {
    pub addr: SocketAddr,
    pub registry: Registry,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<anyhow::Result<()>>>,
}

impl TestServer {
    pub async fn start() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind test listener");
        let addr = listener.local_addr().unwrap();

        let config = ServerConfig {
            port: addr.port(),
            ..ServerConfig::default()
        };
        let server = SignalingServer::new(config);
        let registry = server.registry();

        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let handle = tokio::spawn(server.serve(listener, async move {
            let _ = shutdown_rx.await;
        }));

        Self {
            addr,
            registry,
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn http_url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn ws_url(&self) -> String {
        format!("ws://{}{}", self.addr, SIGNALING_PATH)
    }

    pub async fn connect(&self) -> WsClient {
        let (ws, _) = connect_async(self.ws_url())
            .await
            .expect("Failed to connect to signaling endpoint");
        ws
    }

    /// Connect and register, returning once the registry has the binding
    pub async fn connect_registered(&self, id: &str) -> WsClient {
        let mut ws = self.connect().await;
        send_text(&mut ws, &format!(r#"{{"type":"register","id":"{}"}}"#, id)).await;
        self.wait_for_client(id).await;
        ws
    }

    pub async fn wait_for_client(&self, id: &str) {
        for _ in 0..100 {
            if self.registry.lookup(id).await.is_some() {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("client '{}' never registered", id);
    }

    pub async fn wait_for_active_count(&self, expected: usize) {
        for _ in 0..100 {
            if self.registry.active_count().await == expected {
                return;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!(
            "active connection count stuck at {}, expected {}",
            self.registry.active_count().await,
            expected
        );
    }

    pub async fn stop(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            // Upgraded sockets are detached from the server, so this is normally quick
            if let Ok(joined) = tokio::time::timeout(Duration::from_secs(5), handle).await {
                joined
                    .expect("server task panicked")
                    .expect("server returned an error");
            }
        }
    }
}

pub async fn send_text(ws: &mut WsClient, text: &str) {
    ws.send(Message::Text(text.to_string()))
        .await
        .expect("Failed to send text frame");
}

/// Next text frame, skipping control frames. `None` on timeout, close or error.
pub async fn next_text(ws: &mut WsClient) -> Option<String> {
    loop {
        match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => return Some(text),
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            _ => return None,
        }
    }
}

/// Assert nothing but control frames arrive within a short window
pub async fn assert_silent(ws: &mut WsClient) {
    let window = Duration::from_millis(200);
    loop {
        match tokio::time::timeout(window, ws.next()).await {
            Err(_) => return,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(other) => panic!("expected no message, got {:?}", other),
        }
    }
}

/// Whether the server closes the stream (close frame, end of stream or reset)
pub async fn expect_closed(ws: &mut WsClient) -> bool {
    loop {
        match tokio::time::timeout(RECV_TIMEOUT, ws.next()).await {
            Ok(Some(Ok(Message::Close(_)))) | Ok(None) | Ok(Some(Err(_))) => return true,
            Ok(Some(Ok(Message::Ping(_)))) | Ok(Some(Ok(Message::Pong(_)))) => continue,
            Ok(Some(Ok(_))) | Err(_) => return false,
        }
    }
}

/// Get the path to the `signal-relay` binary
#[allow(deprecated)] // cargo_bin() is deprecated but needed for fallback
pub fn relay_binary() -> PathBuf {
    std::env::var("CARGO_BIN_EXE_signal-relay")
        .map(PathBuf::from)
        .unwrap_or_else(|_| assert_cmd::cargo::cargo_bin("signal-relay"))
}

/// Create a Command for `signal-relay` with a clean relay environment
pub fn relay_command() -> Command {
    let mut cmd = Command::new(relay_binary());
    for key in [
        "SIGNAL_RELAY_HOST",
        "SIGNAL_RELAY_PORT",
        "SIGNAL_RELAY_ALLOWED_ORIGINS",
        "SIGNAL_RELAY_HEARTBEAT_SECS",
        "RUST_LOG",
    ] {
        cmd.env_remove(key);
    }
    cmd
}
