//! WebSocket transport using axum.
//!
//! `GET /ws` upgrades to a participant connection; `GET /health` reports
//! liveness. Every connection runs one task that multiplexes its outbound
//! queue, inbound frames and the heartbeat.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::body::Bytes;
use axum::extract::State;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use futures_util::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::hub::BroadcastHub;
use super::protocol::{ClientCommand, parse_command};
use super::{Result, sanitize_for_log};
use crate::engine::{EngineHandle, Notification, Notifier};
use crate::error::{CommandError, TransportError};
use crate::observability::metrics;
use crate::players::{PlayerId, PlayerRegistry};

/// Shared state for every connection.
#[derive(Debug)]
pub struct AppState {
    /// Round engine
    pub engine: EngineHandle,
    /// Player table
    pub players: Arc<PlayerRegistry>,
    /// Outbound fan-out
    pub hub: Arc<BroadcastHub>,
    /// Ping interval
    pub heartbeat: Duration,
    /// Largest accepted inbound frame
    pub max_frame_size: usize,
    /// Closes every connection when cancelled
    pub cancel: CancellationToken,
}

/// Builds the router.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .with_state(state)
}

/// Parses `addr` and binds a listener.
///
/// # Errors
///
/// `InvalidAddress` if `addr` is not `host:port`, `Bind` if the socket
/// cannot be bound.
pub async fn bind(addr: &str) -> Result<TcpListener> {
    let parsed: SocketAddr = addr
        .parse()
        .map_err(|_| TransportError::InvalidAddress(addr.to_string()))?;
    TcpListener::bind(parsed)
        .await
        .map_err(|source| TransportError::Bind {
            addr: addr.to_string(),
            source,
        })
}

/// Serves until `state.cancel` fires.
///
/// # Errors
///
/// Returns an I/O error if the listener fails.
pub async fn serve(listener: TcpListener, state: Arc<AppState>) -> Result<()> {
    let addr = listener.local_addr()?;
    let cancel = state.cancel.clone();
    info!(%addr, "websocket transport listening");
    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { cancel.cancelled().await })
        .await?;
    debug!("websocket transport shut down");
    Ok(())
}

async fn ws_handler(ws: WebSocketUpgrade, State(state): State<Arc<AppState>>) -> Response {
    ws.max_message_size(state.max_frame_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "connections": state.hub.len(),
        "players": state.players.list().len(),
    }))
}

async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let player = state.players.register();
    let id = player.id;
    let mut outbound = state.hub.register(id);
    metrics::set_connections_active(state.hub.len());
    info!(player = %id, name = %player.name, "player connected");

    if let Some(snapshot) = state.engine.snapshot().await {
        state.hub.send_to(id, &Notification::GameState(snapshot.state));
        broadcast_players(&state);
        state.hub.send_to(id, &Notification::BetsUpdate(snapshot.bets));
    }

    let (mut sink, mut stream) = socket.split();
    let mut heartbeat = tokio::time::interval_at(Instant::now() + state.heartbeat, state.heartbeat);
    heartbeat.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut awaiting_pong = false;

    loop {
        tokio::select! {
            () = state.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                break;
            }
            frame = outbound.recv() => {
                let Some(frame) = frame else { break };
                if sink.send(Message::Text(frame)).await.is_err() {
                    break;
                }
            }
            _ = heartbeat.tick() => {
                if awaiting_pong {
                    warn!(player = %id, "no pong since last ping; closing");
                    break;
                }
                awaiting_pong = true;
                if sink.send(Message::Ping(Bytes::new())).await.is_err() {
                    break;
                }
            }
            inbound = stream.next() => match inbound {
                Some(Ok(Message::Text(text))) => handle_frame(&state, id, text.as_str()).await,
                Some(Ok(Message::Pong(_))) => awaiting_pong = false,
                Some(Ok(Message::Close(_)) | Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
        }
    }

    state.hub.unregister(id);
    state.players.set_connected(id, false);
    metrics::set_connections_active(state.hub.len());
    broadcast_players(&state);
    info!(player = %id, "player disconnected");
}

async fn handle_frame(state: &AppState, id: PlayerId, text: &str) {
    let command = match parse_command(text) {
        Ok(command) => command,
        Err(e) => {
            debug!(player = %id, frame = %sanitize_for_log(text, 200), code = e.code(), "unparseable frame");
            reject(state, id, &e);
            return;
        }
    };
    metrics::record_command(command.name());

    match command {
        ClientCommand::StartRound => {
            state.engine.start_round(Some(id));
        }
        ClientCommand::PlaceBet { side, amount } => {
            state.engine.place_bet(id, side, amount);
        }
        ClientCommand::Identify { name } => match state.players.rename(id, &name) {
            Ok(name) => {
                info!(player = %id, %name, "player renamed");
                broadcast_players(state);
                if let Some(snapshot) = state.engine.snapshot().await {
                    state.hub.send_to(id, &Notification::GameState(snapshot.state));
                }
            }
            Err(e) => reject(state, id, &e),
        },
    }
}

fn reject(state: &AppState, id: PlayerId, err: &CommandError) {
    metrics::record_command_rejected(err);
    state.hub.send_to(id, &Notification::error(err));
}

fn broadcast_players(state: &AppState) {
    state.hub.broadcast(&Notification::PlayerList {
        players: state.players.list(),
    });
}
