//! HTTP route handlers.
//!
//! All handlers are thin - they delegate to the control surface, the queue
//! controller or the stores.

use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::{Path, State},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;

use crate::api::response::{api_ok, api_success};
use crate::api::ws::ws_handler;
use crate::api::AppState;
use crate::control::{ControlCommand, ControlOutcome};
use crate::error::{ChatvoxError, ChatvoxResult};
use crate::playback::PlaybackSettingsPatch;
use crate::protocol_constants::SERVICE_ID;
use crate::queue::EntryId;

// ─────────────────────────────────────────────────────────────────────────────
// Request Types
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
struct ForwardRequest {
    #[serde(default)]
    interrupt: bool,
}

#[derive(Debug, Default, Deserialize)]
struct MarkReadRequest {
    /// Marks only notifications with this content; all when absent.
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RemoveNotificationRequest {
    content: String,
}

#[derive(Debug, Deserialize)]
struct SendRequest {
    text: String,
}

// ─────────────────────────────────────────────────────────────────────────────
// Router
// ─────────────────────────────────────────────────────────────────────────────

/// Creates the Axum router with all routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/api/connection", get(get_connection))
        .route("/api/queue", get(get_queue))
        .route("/api/queue/pause", post(pause))
        .route("/api/queue/resume", post(resume))
        .route("/api/queue/skip", post(skip))
        .route("/api/queue/clear", post(clear))
        .route("/api/queue/replay-current", post(replay_current))
        .route("/api/queue/{id}/replay", post(replay_entry))
        .route("/api/queue/{id}/forward", post(forward_to_entry))
        .route("/api/queue/{id}", axum::routing::delete(remove_entry))
        .route(
            "/api/playback/settings",
            get(get_settings).put(update_settings),
        )
        .route("/api/playback/voices", get(list_voices))
        .route(
            "/api/notifications",
            get(list_notifications).delete(remove_notification),
        )
        .route("/api/notifications/read", post(mark_notifications_read))
        .route("/api/songs", get(get_songs))
        .route("/api/songs/next", post(play_next_song))
        .route("/api/send", post(send_message))
        .route("/ws", get(ws_handler))
        .with_state(state)
}

// ─────────────────────────────────────────────────────────────────────────────
// Outcome Mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Converts a control outcome into an API response.
///
/// Only explicit id lookups can produce `NotFound`; `Rejected` becomes 409.
fn outcome_response(outcome: ControlOutcome, id: Option<EntryId>) -> ChatvoxResult<Response> {
    match outcome {
        ControlOutcome::NotFound => Err(ChatvoxError::EntryNotFound(
            id.map(|id| id.to_string()).unwrap_or_default(),
        )),
        ControlOutcome::Rejected => Err(ChatvoxError::Conflict(
            "another entry is being narrated; set interrupt to replace it".into(),
        )),
        other => Ok(api_success(other).into_response()),
    }
}

fn execute(state: &AppState, command: ControlCommand) -> ChatvoxResult<Response> {
    outcome_response(state.control.execute(command), None)
}

type IdPath = Result<Path<u64>, PathRejection>;
type JsonBody<T> = Result<Json<T>, JsonRejection>;
type OptionalJsonBody<T> = Result<Option<Json<T>>, JsonRejection>;

fn entry_id(path: IdPath) -> ChatvoxResult<EntryId> {
    let Path(id) = path?;
    Ok(EntryId(id))
}

// ─────────────────────────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────────────────────────

/// Liveness probe.
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.controller.snapshot();
    api_success(json!({
        "status": "ok",
        "service": SERVICE_ID,
        "connection": state.channel.state(),
        "engine": state.engine.name(),
        "queue": {
            "capacity": state.controller.capacity(),
            "pending": snapshot.pending.len(),
            "paused": snapshot.paused,
        }
    }))
}

async fn get_connection(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "state": state.channel.state(),
        "url": state.config.channel_url,
    }))
}

async fn get_queue(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.controller.snapshot())
}

async fn pause(State(state): State<AppState>) -> ChatvoxResult<Response> {
    execute(&state, ControlCommand::Pause)
}

async fn resume(State(state): State<AppState>) -> ChatvoxResult<Response> {
    execute(&state, ControlCommand::Resume)
}

async fn skip(State(state): State<AppState>) -> ChatvoxResult<Response> {
    execute(&state, ControlCommand::Skip)
}

async fn clear(State(state): State<AppState>) -> ChatvoxResult<Response> {
    execute(&state, ControlCommand::Clear)
}

async fn replay_current(State(state): State<AppState>) -> ChatvoxResult<Response> {
    execute(&state, ControlCommand::ReplayCurrent)
}

async fn replay_entry(
    path: IdPath,
    State(state): State<AppState>,
) -> ChatvoxResult<Response> {
    let id = entry_id(path)?;
    outcome_response(state.control.execute(ControlCommand::Replay(id)), Some(id))
}

/// POST /api/queue/{id}/forward
///
/// Body is optional; `{ "interrupt": true }` replaces the current entry.
async fn forward_to_entry(
    path: IdPath,
    State(state): State<AppState>,
    payload: OptionalJsonBody<ForwardRequest>,
) -> ChatvoxResult<Response> {
    let id = entry_id(path)?;
    let Json(request) = payload?.unwrap_or_default();
    let outcome = state.control.execute(ControlCommand::ForwardTo {
        id,
        interrupt: request.interrupt,
    });
    outcome_response(outcome, Some(id))
}

async fn remove_entry(
    path: IdPath,
    State(state): State<AppState>,
) -> ChatvoxResult<Response> {
    let id = entry_id(path)?;
    outcome_response(state.control.execute(ControlCommand::Remove(id)), Some(id))
}

async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.controller.settings())
}

/// PUT /api/playback/settings
///
/// Partial update; out-of-range values are clamped.
async fn update_settings(
    State(state): State<AppState>,
    payload: JsonBody<PlaybackSettingsPatch>,
) -> ChatvoxResult<Response> {
    let Json(patch) = payload?;
    execute(&state, ControlCommand::UpdateSettings(patch))
}

async fn list_voices(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "engine": state.engine.name(),
        "voices": state.engine.voices(),
    }))
}

// ─────────────────────────────────────────────────────────────────────────────
// Notification / Song Handlers
// ─────────────────────────────────────────────────────────────────────────────

async fn list_notifications(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({
        "notifications": state.notifications.list(),
        "unread": state.notifications.unread_count(),
    }))
}

async fn mark_notifications_read(
    State(state): State<AppState>,
    payload: OptionalJsonBody<MarkReadRequest>,
) -> ChatvoxResult<Response> {
    let Json(request) = payload?.unwrap_or_default();
    let marked = state.notifications.mark_read(request.content.as_deref());
    Ok(api_success(json!({ "marked": marked })).into_response())
}

async fn remove_notification(
    State(state): State<AppState>,
    payload: JsonBody<RemoveNotificationRequest>,
) -> ChatvoxResult<Response> {
    let Json(request) = payload?;
    let removed = state.notifications.remove(&request.content);
    Ok(api_success(json!({ "removed": removed })).into_response())
}

async fn get_songs(State(state): State<AppState>) -> impl IntoResponse {
    api_success(state.songs.snapshot())
}

async fn play_next_song(State(state): State<AppState>) -> impl IntoResponse {
    api_success(json!({ "current": state.songs.play_next() }))
}

/// POST /api/send
///
/// Forwards text to the chat event source. Fails while disconnected;
/// nothing is buffered for later.
async fn send_message(
    State(state): State<AppState>,
    payload: JsonBody<SendRequest>,
) -> ChatvoxResult<Response> {
    let Json(request) = payload?;
    let text = request.text.trim();
    if text.is_empty() {
        return Err(ChatvoxError::InvalidRequest("text must not be empty".into()));
    }
    state.channel.send(text)?;
    Ok(api_ok().into_response())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::test_support::{request, spawn_test_server, TestServer};
    use crate::queue::Message;
    use axum::http::StatusCode;

    #[test]
    fn not_found_and_rejected_map_to_errors() {
        let err = outcome_response(ControlOutcome::NotFound, Some(EntryId(4))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
        assert!(err.to_string().contains("#4"));

        let err = outcome_response(ControlOutcome::Rejected, Some(EntryId(4))).unwrap_err();
        assert_eq!(err.status_code(), StatusCode::CONFLICT);

        assert!(outcome_response(ControlOutcome::Unchanged, None).is_ok());
    }

    #[test]
    fn forward_body_defaults_interrupt_off() {
        let req: ForwardRequest = serde_json::from_str("{}").unwrap();
        assert!(!req.interrupt);
    }

    #[tokio::test]
    async fn queue_routes_drive_the_controller() {
        let TestServer { addr, state, .. } = spawn_test_server().await;
        let a = state.controller.enqueue(Message::new(1, "a", "", "one"));
        let b = state.controller.enqueue(Message::new(2, "b", "", "two"));

        let (status, body) = request(addr, "GET", "/api/queue", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["success"], true);
        assert_eq!(body["data"]["current"]["id"], a.0);

        let path = format!("/api/queue/{}/forward", b.0);
        let (status, body) = request(addr, "POST", &path, None).await;
        assert_eq!(status, 409);
        assert_eq!(body["error"], "conflict");

        let (status, _) = request(addr, "POST", &path, Some(r#"{"interrupt":true}"#)).await;
        assert_eq!(status, 200);
        assert_eq!(state.controller.snapshot().current.map(|e| e.id), Some(b));

        let (status, body) = request(addr, "DELETE", "/api/queue/99", None).await;
        assert_eq!(status, 404);
        assert_eq!(body["error"], "entry_not_found");

        let (status, body) = request(addr, "POST", "/api/queue/pause", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["outcome"], "paused");
        assert!(state.controller.snapshot().paused);
    }

    #[tokio::test]
    async fn settings_are_patched_and_clamped() {
        let TestServer { addr, state, .. } = spawn_test_server().await;

        let (status, body) =
            request(addr, "PUT", "/api/playback/settings", Some(r#"{"rate":9.0}"#)).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["value"]["rate"], 2.0);
        assert_eq!(state.controller.settings().rate, 2.0);
    }

    #[tokio::test]
    async fn send_requires_a_connected_channel() {
        let TestServer { addr, .. } = spawn_test_server().await;

        let (status, body) = request(addr, "POST", "/api/send", Some(r#"{"text":"hi"}"#)).await;
        assert_eq!(status, 503);
        assert_eq!(body["error"], "channel_unavailable");

        let (status, _) = request(addr, "POST", "/api/send", Some(r#"{"text":"  "}"#)).await;
        assert_eq!(status, 400);
    }

    #[tokio::test]
    async fn notifications_can_be_read_and_removed() {
        let TestServer { addr, state, .. } = spawn_test_server().await;
        state.notifications.add("ann joined the stream!");
        state.notifications.add("bo left the stream!");

        let (_, body) = request(addr, "GET", "/api/notifications", None).await;
        assert_eq!(body["data"]["unread"], 2);

        let (_, body) = request(addr, "POST", "/api/notifications/read", None).await;
        assert_eq!(body["data"]["marked"], 2);

        let (_, body) = request(
            addr,
            "DELETE",
            "/api/notifications",
            Some(r#"{"content":"bo left the stream!"}"#),
        )
        .await;
        assert_eq!(body["data"]["removed"], 1);
        assert_eq!(state.notifications.list().len(), 1);
    }

    #[tokio::test]
    async fn health_reports_service_and_connection() {
        let TestServer { addr, .. } = spawn_test_server().await;
        let (status, body) = request(addr, "GET", "/health", None).await;
        assert_eq!(status, 200);
        assert_eq!(body["data"]["service"], "chatvox");
        assert_eq!(body["data"]["connection"], "DISCONNECTED");
        assert_eq!(body["data"]["engine"], "silent");
    }

    #[tokio::test]
    async fn malformed_requests_get_json_errors() {
        let TestServer { addr, .. } = spawn_test_server().await;

        let (status, body) = request(addr, "DELETE", "/api/queue/abc", None).await;
        assert_eq!(status, 400);
        assert_eq!(body["success"], false);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) =
            request(addr, "PUT", "/api/playback/settings", Some(r#"{"rate":"fast"}"#)).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = request(addr, "POST", "/api/send", Some("not json")).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_request");

        let (status, body) = request(addr, "POST", "/api/queue/1/forward", Some("{")).await;
        assert_eq!(status, 400);
        assert_eq!(body["error"], "invalid_request");
    }
}
