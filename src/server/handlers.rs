//! HTTP handlers.
//!
//! Every pre-stream failure maps to the `{code, message}` error body
//! via `ChatError`; once a stream is open, failures travel in-band.

use axum::{
    Json,
    body::Bytes,
    extract::{Path, Query, State},
    http::HeaderMap,
    response::sse::{Event, KeepAlive, Sse},
};
use futures::Stream;
use serde::Deserialize;
use serde_json::json;
use std::convert::Infallible;
use tokio::sync::mpsc;

use crate::api::{ChatError, ChatResult};
use crate::auth::{Session, authenticate};
use crate::chat::{ChatEvent, TurnRequest, prompts::RequestHints, run_turn};
use crate::store::{Chat, Visibility};

use super::AppState;

async fn session_for(state: &AppState, headers: &HeaderMap) -> ChatResult<Session> {
    authenticate(headers, state.store.pool()).await
}

/// Owner may always read; public chats are readable by anyone
fn check_read_access(chat: &Chat, session: &Session) -> ChatResult<()> {
    if chat.user_id == session.user_id || chat.visibility == Visibility::Public {
        Ok(())
    } else {
        Err(ChatError::forbidden("chat belongs to another user"))
    }
}

fn check_ownership(chat: &Chat, session: &Session) -> ChatResult<()> {
    if chat.user_id == session.user_id {
        Ok(())
    } else {
        Err(ChatError::forbidden("chat belongs to another user"))
    }
}

fn envelope(event: &ChatEvent) -> Event {
    match serde_json::to_string(event) {
        Ok(json) => Event::default().data(json),
        // ChatEvent serialization is infallible in practice
        Err(_) => Event::default().data("{\"type\":\"error\"}"),
    }
}

// ---------------------------------------------------------------------------
// POST /api/chat
// ---------------------------------------------------------------------------

pub async fn submit_turn(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> ChatResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    // schema validation precedes authorization
    let request: TurnRequest = serde_json::from_slice(&body)
        .map_err(|e| ChatError::bad_request(format!("invalid request body: {e}")))?;

    let session = session_for(&state, &headers).await?;

    let hints = RequestHints::from_headers(&headers);
    let rx = run_turn(state.turn_deps(), session, hints, request).await?;

    Ok(event_stream(rx))
}

fn event_stream(
    mut rx: mpsc::Receiver<ChatEvent>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let stream = async_stream::stream! {
        while let Some(event) = rx.recv().await {
            let done = matches!(event, ChatEvent::Done);
            yield Ok(envelope(&event));
            if done {
                break;
            }
        }
    };
    Sse::new(stream).keep_alive(KeepAlive::default())
}

// ---------------------------------------------------------------------------
// GET /api/chat/{id}/stream
// ---------------------------------------------------------------------------

pub async fn resume_stream(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
) -> ChatResult<Sse<impl Stream<Item = Result<Event, Infallible>>>> {
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&chat_id).await?;
    check_read_access(&chat, &session)?;

    let registry = state
        .registry
        .as_ref()
        .ok_or_else(|| ChatError::not_found("stream resumption is not enabled"))?;

    let stream_id = state
        .store
        .latest_stream_id(&chat_id)
        .await?
        .ok_or_else(|| ChatError::not_found("no stream for this chat"))?;

    let subscription = registry
        .subscribe(&stream_id)
        .ok_or_else(|| ChatError::not_found("stream no longer available"))?;

    let stream = async_stream::stream! {
        let mut finished = false;
        for event in &subscription.replay {
            if matches!(event, ChatEvent::Done) {
                finished = true;
            }
            yield Ok(envelope(event));
        }
        if finished {
            return;
        }
        if let Some(mut live) = subscription.live {
            loop {
                match live.recv().await {
                    Ok(event) => {
                        let done = matches!(event, ChatEvent::Done);
                        yield Ok(envelope(&event));
                        if done {
                            break;
                        }
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Lagged(skipped)) => {
                        // the client must learn about the gap
                        yield Ok(envelope(&ChatEvent::Error {
                            code: "stream_lagged:chat".to_string(),
                            message: format!(
                                "{skipped} events were dropped while resuming; reload the chat for full history"
                            ),
                        }));
                        continue;
                    }
                    Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

// ---------------------------------------------------------------------------
// DELETE /api/chat?id=…
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct IdQuery {
    pub id: Option<String>,
}

pub async fn delete_chat(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IdQuery>,
) -> ChatResult<Json<Chat>> {
    let id = query
        .id
        .ok_or_else(|| ChatError::bad_request("missing chat id"))?;
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&id).await?;
    check_ownership(&chat, &session)?;

    let deleted = state.store.delete_chat(&id).await?;
    Ok(Json(deleted))
}

// ---------------------------------------------------------------------------
// GET /api/chat/{id}/messages
// ---------------------------------------------------------------------------

pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
) -> ChatResult<Json<serde_json::Value>> {
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&chat_id).await?;
    check_read_access(&chat, &session)?;

    let messages = state.store.get_messages(&chat_id).await?;
    Ok(Json(json!(messages)))
}

// ---------------------------------------------------------------------------
// PATCH /api/chat/{id}/visibility
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
pub struct VisibilityBody {
    pub visibility: String,
}

pub async fn update_visibility(
    State(state): State<AppState>,
    Path(chat_id): Path<String>,
    headers: HeaderMap,
    Json(body): Json<VisibilityBody>,
) -> ChatResult<Json<serde_json::Value>> {
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&chat_id).await?;
    check_ownership(&chat, &session)?;

    let visibility = Visibility::parse(&body.visibility)
        .ok_or_else(|| ChatError::bad_request("invalid visibility type"))?;
    state.store.update_visibility(&chat_id, visibility).await?;
    Ok(Json(json!({ "id": chat_id, "visibility": visibility.as_str() })))
}

// ---------------------------------------------------------------------------
// GET /api/vote?chatId=… and PATCH /api/vote
// ---------------------------------------------------------------------------

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteQuery {
    pub chat_id: Option<String>,
}

pub async fn get_votes(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<VoteQuery>,
) -> ChatResult<Json<serde_json::Value>> {
    let chat_id = query
        .chat_id
        .ok_or_else(|| ChatError::bad_request("missing chatId"))?;
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&chat_id).await?;
    check_read_access(&chat, &session)?;

    let votes = state.store.votes_for_chat(&chat_id).await?;
    Ok(Json(json!(votes)))
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VoteBody {
    pub chat_id: String,
    pub message_id: String,
    /// "up" or "down"
    pub r#type: String,
}

pub async fn patch_vote(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<VoteBody>,
) -> ChatResult<Json<serde_json::Value>> {
    let session = session_for(&state, &headers).await?;
    let chat = state.store.get_chat(&body.chat_id).await?;
    check_ownership(&chat, &session)?;

    let is_upvoted = match body.r#type.as_str() {
        "up" => true,
        "down" => false,
        _ => return Err(ChatError::bad_request("vote type must be 'up' or 'down'")),
    };
    state
        .store
        .upsert_vote(&body.chat_id, &body.message_id, is_upvoted)
        .await?;
    Ok(Json(json!({ "message": "vote recorded" })))
}

// ---------------------------------------------------------------------------
// DELETE /api/message?id=…  (trailing truncation for edit/regenerate)
// ---------------------------------------------------------------------------

pub async fn delete_trailing(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<IdQuery>,
) -> ChatResult<Json<serde_json::Value>> {
    let id = query
        .id
        .ok_or_else(|| ChatError::bad_request("missing message id"))?;
    let session = session_for(&state, &headers).await?;

    let message = state.store.get_message(&id).await?;
    let chat = state.store.get_chat(&message.chat_id).await?;
    check_ownership(&chat, &session)?;

    let deleted = state
        .store
        .delete_trailing_messages(&message.chat_id, message.created_at)
        .await?;
    Ok(Json(json!({ "deleted": deleted })))
}

// ---------------------------------------------------------------------------
// GET /api/status
// ---------------------------------------------------------------------------

pub async fn status() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "version": env!("CARGO_PKG_VERSION") }))
}
