use axum::{debug_handler, extract::{Path, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    convo::ConversationKey,
    session::current_user,
    store::{Message, Store},
    AppError, AppResult,
};

use super::chat::Conversation;

/// A message about to be written, with the name snapshots it will carry.
#[derive(Debug, Clone)]
pub struct Outgoing {
    pub key: ConversationKey,
    pub sender_id: String,
    pub recipient_id: String,
    pub body: String,
    pub sender_name: String,
    pub recipient_name: Option<String>,
}

/// Writes the message and then clears the sender's typing flag.
///
/// A blank body writes nothing and yields `None`. The two writes are
/// independent: if clearing the flag fails the message still stands.
pub async fn send(store: &Store, out: Outgoing) -> AppResult<Option<Message>> {
    if out.body.trim().is_empty() {
        return Ok(None);
    }

    if out.key != ConversationKey::between(&out.sender_id, &out.recipient_id) {
        return Err(AppError::bad_request(format!(
            "{} is not the conversation of {} and {}",
            out.key, out.sender_id, out.recipient_id
        )));
    }

    let message = store
        .insert_message(
            &out.key,
            &out.sender_id,
            &out.recipient_id,
            &out.body,
            &out.sender_name,
            out.recipient_name.as_deref(),
        )
        .await?;

    if let Err(e) = store.set_typing(&out.key, &out.sender_id, false).await {
        tracing::warn!(key = %out.key, "message sent but typing flag not cleared: {e}");
    }

    Ok(Some(message))
}

/// Replaces the body and stamps the edit time. Blank bodies are ignored.
pub async fn edit(store: &Store, key: &ConversationKey, id: &str, body: &str) -> AppResult<bool> {
    if body.trim().is_empty() {
        return Ok(false);
    }
    store.edit_message(key, id, body).await?;
    Ok(true)
}

pub async fn delete(store: &Store, key: &ConversationKey, id: &str) -> AppResult<()> {
    store.delete_message(key, id).await
}

#[derive(Deserialize)]
pub(crate) struct BodyQuery {
    body: String,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn send_msg(
    Path(peer_id): Path<String>,
    State(store): State<Store>,
    session: Session,
    Json(BodyQuery { body }): Json<BodyQuery>,
) -> AppResult<Response> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    Ok(match send(&store, convo.outgoing(body)).await? {
        Some(message) => (StatusCode::CREATED, Json(message)).into_response(),
        None => StatusCode::NO_CONTENT.into_response(),
    })
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn edit_msg(
    Path((peer_id, id)): Path<(String, String)>,
    State(store): State<Store>,
    session: Session,
    Json(BodyQuery { body }): Json<BodyQuery>,
) -> AppResult<StatusCode> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    edit(&store, &convo.key, &id, &body).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn delete_msg(
    Path((peer_id, id)): Path<(String, String)>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<StatusCode> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    delete(&store, &convo.key, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}
