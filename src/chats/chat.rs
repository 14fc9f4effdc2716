use axum::{debug_handler, extract::{Path, State}, Json};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    convo::ConversationKey,
    session::current_user,
    store::{Message, Profile, Store, TypingRecord},
    AppError, AppResult,
};

use super::msg::Outgoing;

/// The viewer's side of a conversation with one peer.
#[derive(Debug, Clone)]
pub struct Conversation {
    pub key: ConversationKey,
    pub me: String,
    pub my_name: String,
    pub peer: Profile,
}

impl Conversation {
    /// The peer must have a profile; keys are only derived from known ids.
    pub async fn open(store: &Store, me: &str, peer_id: &str) -> AppResult<Conversation> {
        let Some(peer) = store.profile(peer_id).await? else {
            return Err(AppError::not_found(format!("no user {peer_id}")));
        };

        let mine = store.profile(me).await?;
        let my_name = mine
            .as_ref()
            .and_then(Profile::label)
            .unwrap_or("User")
            .to_owned();

        Ok(Conversation {
            key: ConversationKey::between(me, peer_id),
            me: me.to_owned(),
            my_name,
            peer,
        })
    }

    pub fn outgoing(&self, body: impl Into<String>) -> Outgoing {
        Outgoing {
            key: self.key.clone(),
            sender_id: self.me.clone(),
            recipient_id: self.peer.uid.clone(),
            body: body.into(),
            sender_name: self.my_name.clone(),
            recipient_name: self.peer.label().map(str::to_owned),
        }
    }

    pub fn peer_typing(&self, record: &TypingRecord) -> bool {
        record.get(&self.peer.uid).copied().unwrap_or(false)
    }
}

#[derive(Debug, Serialize)]
pub struct ChatSnapshot {
    pub key: ConversationKey,
    pub peer: Profile,
    pub messages: Vec<Message>,
    pub typing: TypingRecord,
    pub peer_typing: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat(
    Path(peer_id): Path<String>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<ChatSnapshot>> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    let messages = store.messages(&convo.key).await?;
    let typing = store.typing(&convo.key).await?;

    Ok(Json(ChatSnapshot {
        peer_typing: convo.peer_typing(&typing),
        key: convo.key,
        peer: convo.peer,
        messages,
        typing,
    }))
}
