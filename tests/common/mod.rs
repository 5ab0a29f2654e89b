//! Shared integration-test harness: CLI spawning, fixtures, and an
//! in-process server with a WebSocket client.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde_json::Value;
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tokio_util::sync::CancellationToken;

use skirmish::config::GameConfig;
use skirmish::error::SkirmishError;
use skirmish::server::{Server, ServerOptions};

/// Default timeout for reading a single frame.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Timeout for waiting on a whole round.
pub const ROUND_TIMEOUT: Duration = Duration::from_secs(30);

/// Runs the binary to completion with the given arguments.
#[allow(clippy::missing_panics_doc)]
pub fn spawn_command(args: &[&str]) -> std::process::Output {
    let bin = env!("CARGO_BIN_EXE_skirmish");
    std::process::Command::new(bin)
        .args(args)
        .env_remove("SKIRMISH_CONFIG")
        .env_remove("SKIRMISH_LOG_FORMAT")
        .output()
        .expect("failed to run skirmish")
}

/// Absolute path of a file under `tests/fixtures/`.
pub fn fixture_path(name: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(name)
}

/// Fast, seeded configuration on an ephemeral port with the ledger off.
pub fn fast_config() -> GameConfig {
    let mut config = GameConfig::default();
    config.server.bind = "127.0.0.1:0".to_string();
    config.round.betting_seconds = 1;
    config.round.start_delay = Duration::from_millis(100);
    config.battle.tick_interval = Duration::from_millis(50);
    config.battle.damage.min = 40;
    config.battle.damage.max = 60;
    config.battle.seed = Some(11);
    config.players.starting_balance = 500.0;
    config.ledger.enabled = false;
    config
}

/// An in-process server running on a background task.
pub struct TestServer {
    pub addr: SocketAddr,
    pub cancel: CancellationToken,
    task: JoinHandle<Result<(), SkirmishError>>,
}

impl TestServer {
    /// Binds and starts a server with `config`.
    #[allow(clippy::missing_panics_doc)]
    pub async fn start(config: GameConfig) -> Self {
        let cancel = CancellationToken::new();
        let server = Server::bind(ServerOptions::new(Arc::new(config), cancel.clone()))
            .await
            .expect("server should bind");
        let addr = server.local_addr();
        let task = tokio::spawn(server.run());
        Self { addr, cancel, task }
    }

    /// Opens a WebSocket connection to `/ws`.
    pub async fn connect(&self) -> WsClient {
        WsClient::connect(self.addr).await
    }

    /// Cancels the server and waits for it to finish.
    #[allow(clippy::missing_panics_doc)]
    pub async fn shutdown(self) -> Result<(), SkirmishError> {
        self.cancel.cancel();
        tokio::time::timeout(DEFAULT_TIMEOUT, self.task)
            .await
            .expect("server did not stop in time")
            .expect("server task panicked")
    }
}

/// A WebSocket participant.
pub struct WsClient {
    stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl WsClient {
    #[allow(clippy::missing_panics_doc)]
    pub async fn connect(addr: SocketAddr) -> Self {
        let (stream, _) = connect_async(format!("ws://{addr}/ws"))
            .await
            .expect("websocket handshake failed");
        Self { stream }
    }

    /// Sends a raw text frame.
    #[allow(clippy::missing_panics_doc)]
    pub async fn send_text(&mut self, text: &str) {
        self.stream
            .send(Message::Text(text.into()))
            .await
            .expect("send failed");
    }

    /// Sends `{"event": event, "data": data}`.
    pub async fn send_event(&mut self, event: &str, data: Value) {
        let frame = serde_json::json!({ "event": event, "data": data });
        self.send_text(&frame.to_string()).await;
    }

    /// Reads the next JSON text frame, skipping control frames.
    ///
    /// Panics on close, error, or timeout.
    #[allow(clippy::missing_panics_doc)]
    pub async fn next_frame(&mut self, timeout: Duration) -> Value {
        tokio::time::timeout(timeout, async {
            loop {
                match self.stream.next().await {
                    Some(Ok(Message::Text(text))) => {
                        return serde_json::from_str::<Value>(text.as_str())
                            .expect("server sent invalid JSON");
                    }
                    Some(Ok(Message::Close(_))) | None => panic!("connection closed"),
                    Some(Ok(_)) => {}
                    Some(Err(e)) => panic!("websocket error: {e}"),
                }
            }
        })
        .await
        .expect("timed out waiting for a frame")
    }

    /// Reads frames until one with `event` arrives and returns it.
    pub async fn expect_event(&mut self, event: &str, timeout: Duration) -> Value {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
            let frame = self.next_frame(remaining).await;
            if frame["event"] == event {
                return frame;
            }
        }
    }

    /// Reads the three frames every new connection receives and returns
    /// the `game_state` one.
    #[allow(clippy::missing_panics_doc)]
    pub async fn handshake(&mut self) -> Value {
        let state = self.next_frame(DEFAULT_TIMEOUT).await;
        assert_eq!(state["event"], "game_state", "first frame: {state}");
        let players = self.next_frame(DEFAULT_TIMEOUT).await;
        assert_eq!(players["event"], "player_list", "second frame: {players}");
        let bets = self.next_frame(DEFAULT_TIMEOUT).await;
        assert_eq!(bets["event"], "bets_update", "third frame: {bets}");
        state
    }

    /// Sends a close frame.
    pub async fn close(mut self) {
        let _ = self.stream.close(None).await;
    }
}
