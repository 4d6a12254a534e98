//! WebSocket handler for real-time client communication.
//!
//! Clients receive an `INITIAL_STATE` snapshot on connect, then every
//! [`BroadcastEvent`] as an `EVENT` message. Control commands sent by the
//! client are answered with `COMMAND_RESULT`.

use axum::extract::ws::{Message, WebSocket};
use axum::extract::{State, WebSocketUpgrade};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use futures::sink::SinkExt;
use futures::stream::StreamExt;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;

use crate::api::response::api_error;
use crate::api::{origin_allowed, AppState};
use crate::control::{ControlCommand, ControlOutcome};
use crate::events::BroadcastEvent;
use crate::ingest::ConnectionState;
use crate::playback::PlaybackSettings;
use crate::queue::QueueSnapshot;
use crate::stores::SongRequestSnapshot;

// ─────────────────────────────────────────────────────────────────────────────
// WebSocket Message Types
// ─────────────────────────────────────────────────────────────────────────────

/// Incoming WebSocket message: a control command or a session message.
#[derive(Deserialize)]
#[serde(untagged)]
enum WsIncoming {
    Command(ControlCommand),
    Session(WsSessionMessage),
}

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsSessionMessage {
    Heartbeat,
    GetState,
}

/// Outgoing WebSocket messages.
#[derive(Serialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
enum WsOutgoing {
    InitialState { payload: InitialStatePayload },
    Event { payload: BroadcastEvent },
    CommandResult { payload: ControlOutcome },
    HeartbeatAck,
    Error { message: String },
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InitialStatePayload {
    queue: QueueSnapshot,
    settings: PlaybackSettings,
    connection: ConnectionState,
    songs: SongRequestSnapshot,
    unread_notifications: usize,
}

impl WsOutgoing {
    /// Serializes the message to a WebSocket text message.
    fn to_message(&self) -> Option<Message> {
        serde_json::to_string(self)
            .ok()
            .map(|s| Message::Text(s.into()))
    }
}

fn initial_state(state: &AppState) -> WsOutgoing {
    WsOutgoing::InitialState {
        payload: InitialStatePayload {
            queue: state.controller.snapshot(),
            settings: state.controller.settings(),
            connection: state.channel.state(),
            songs: state.songs.snapshot(),
            unread_notifications: state.notifications.unread_count(),
        },
    }
}

fn handle_text(state: &AppState, text: &str) -> WsOutgoing {
    match serde_json::from_str::<WsIncoming>(text) {
        Ok(WsIncoming::Command(command)) => WsOutgoing::CommandResult {
            payload: state.control.execute(command),
        },
        Ok(WsIncoming::Session(WsSessionMessage::Heartbeat)) => WsOutgoing::HeartbeatAck,
        Ok(WsIncoming::Session(WsSessionMessage::GetState)) => initial_state(state),
        Err(e) => {
            log::debug!("[Api] Unrecognized WebSocket message: {}", e);
            WsOutgoing::Error {
                message: format!("unrecognized message: {}", text),
            }
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connection Loop
// ─────────────────────────────────────────────────────────────────────────────

/// Upgrades to a WebSocket session.
///
/// Browsers do not apply CORS to WebSocket handshakes, so a request carrying
/// an `Origin` outside the trusted list is refused here. Clients that send no
/// `Origin` (non-browser tools) are accepted.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    headers: HeaderMap,
    State(state): State<AppState>,
) -> Response {
    if let Some(origin) = headers.get(header::ORIGIN) {
        let origin = origin.to_str().unwrap_or("");
        if !origin_allowed(&state.config.trusted_origins, origin) {
            log::warn!("[Api] Rejected WebSocket upgrade from origin {:?}", origin);
            return api_error(
                StatusCode::FORBIDDEN,
                "origin_not_allowed",
                format!("origin not allowed: {}", origin),
            )
            .into_response();
        }
    }
    ws.on_upgrade(move |socket| handle_ws(socket, state))
}

async fn handle_ws(socket: WebSocket, state: AppState) {
    let (mut sender, mut receiver) = socket.split();
    let mut broadcast_rx = state.event_bridge.subscribe();
    let cancel = state.cancel.clone();

    log::info!("[Api] WebSocket client connected");

    if let Some(msg) = initial_state(&state).to_message() {
        if sender.send(msg).await.is_err() {
            log::warn!("[Api] Failed to send initial state, client disconnected");
            return;
        }
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let _ = sender.send(Message::Close(None)).await;
                break;
            }
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let reply = handle_text(&state, text.as_str());
                        if let Some(msg) = reply.to_message() {
                            if sender.send(msg).await.is_err() {
                                break;
                            }
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        log::debug!("[Api] WebSocket read error: {}", e);
                        break;
                    }
                }
            }
            event = broadcast_rx.recv() => {
                let outgoing = match event {
                    Ok(event) => WsOutgoing::Event { payload: event },
                    Err(RecvError::Lagged(skipped)) => {
                        log::warn!("[Api] WebSocket client lagged by {} events, resyncing", skipped);
                        initial_state(&state)
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Some(msg) = outgoing.to_message() {
                    if sender.send(msg).await.is_err() {
                        break;
                    }
                }
            }
        }
    }

    log::info!("[Api] WebSocket client disconnected");
}
