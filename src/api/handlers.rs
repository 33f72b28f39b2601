//! API request handlers.

use std::convert::Infallible;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use futures::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};

use crate::chat::{Chat, MessageEvent, MessageRole};

use super::error::{ApiError, ApiResult};
use super::state::AppState;

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

// ============================================================================
// Chat Handlers
// ============================================================================

/// Request to create a chat.
#[derive(Debug, Deserialize)]
pub struct CreateChatRequest {
    pub name: String,
}

/// One message in a chat's history.
#[derive(Debug, Serialize)]
pub struct MessageView {
    pub id: i64,
    pub sender: MessageRole,
    pub text: String,
}

/// List all chats.
#[instrument(skip(state))]
pub async fn list_chats(State(state): State<AppState>) -> ApiResult<Json<Vec<Chat>>> {
    let chats = state.repo.list_chats().await?;
    Ok(Json(chats))
}

/// Create a new chat.
#[instrument(skip(state))]
pub async fn create_chat(
    State(state): State<AppState>,
    Json(request): Json<CreateChatRequest>,
) -> ApiResult<(StatusCode, Json<Chat>)> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(ApiError::bad_request("chat name must not be blank"));
    }

    let chat = state.repo.create_chat(name).await?;
    info!(chat_id = %chat.id, "Created chat");
    Ok((StatusCode::CREATED, Json(chat)))
}

/// Delete a chat and its history.
#[instrument(skip(state))]
pub async fn delete_chat(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<StatusCode> {
    if state.registry.is_active(&chat_id) {
        return Err(ApiError::conflict(
            "cannot delete a chat with an active generation, cancel it first",
        ));
    }

    if !state.repo.delete_chat(&chat_id).await? {
        return Err(ApiError::not_found(format!("chat {}", chat_id)));
    }
    state.hub.remove(&chat_id);

    info!(chat_id = %chat_id, "Deleted chat");
    Ok(StatusCode::NO_CONTENT)
}

/// Get a chat's message history in order.
#[instrument(skip(state))]
pub async fn list_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<Json<Vec<MessageView>>> {
    state
        .repo
        .get_chat(&chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("chat {}", chat_id)))?;

    let messages = state.repo.list_messages(&chat_id).await?;
    let views = messages
        .into_iter()
        .map(|m| MessageView {
            id: m.id,
            sender: m.sender,
            text: m.text,
        })
        .collect();
    Ok(Json(views))
}

// ============================================================================
// Streaming Handlers
// ============================================================================

/// Request to submit a prompt.
#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub text: String,
}

/// Query parameters for live attachment.
#[derive(Debug, Deserialize)]
pub struct AttachQuery {
    #[serde(rename = "lastSeenMessageId")]
    pub last_seen_message_id: Option<i64>,
}

/// Submit a prompt and stream the reply.
///
/// The response is a server-push stream of `{id, sender, text, isFinal}`
/// events in publish order, terminated after the `isFinal: true` event.
#[instrument(skip(state, request))]
pub async fn send_message(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Json(request): Json<SendMessageRequest>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let receipt = state.coordinator.submit(&chat_id, &request.text).await?;

    // Tail events from just past the prompt: the reply's deltas and its
    // terminal event.
    let events = state
        .subscribers
        .attach(&chat_id, Some(receipt.user_message_id))
        .await?;

    info!(
        chat_id = %chat_id,
        message_id = receipt.assistant_message_id,
        "Started generation"
    );
    Ok(Sse::new(to_sse(events)).keep_alive(KeepAlive::default()))
}

/// Attach to a chat's live event stream.
///
/// With `lastSeenMessageId`, replays persisted messages past the marker
/// before tailing live events; with no active generation the stream ends
/// after the persisted tail.
#[instrument(skip(state))]
pub async fn attach_events(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    Query(query): Query<AttachQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let events = state
        .subscribers
        .attach(&chat_id, query.last_seen_message_id)
        .await?;

    info!(chat_id = %chat_id, "Attached to chat event stream");
    Ok(Sse::new(to_sse(events)).keep_alive(KeepAlive::default()))
}

/// Request cancellation of a chat's in-flight generation.
///
/// Accepted immediately and idempotent: cancelling a chat with no active
/// generation (or one that just completed) is a no-op.
#[instrument(skip(state))]
pub async fn cancel_generation(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
) -> ApiResult<StatusCode> {
    state
        .repo
        .get_chat(&chat_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("chat {}", chat_id)))?;

    state.cancellations.cancel(&chat_id);
    info!(chat_id = %chat_id, "Requested generation cancel");
    Ok(StatusCode::ACCEPTED)
}

/// Convert a message event stream into SSE frames.
fn to_sse(
    events: impl Stream<Item = MessageEvent> + Send + 'static,
) -> impl Stream<Item = Result<Event, Infallible>> + Send + 'static {
    events.map(|event| match serde_json::to_string(&event) {
        Ok(json) => Ok(Event::default().data(json)),
        Err(e) => {
            warn!("Failed to serialize stream event: {}", e);
            Ok(Event::default().data(format!(r#"{{"error":"{}"}}"#, e)))
        }
    })
}
