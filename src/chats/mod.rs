mod chat;
mod msg;
mod typing;
mod ws;

use axum::{routing::{get, patch, post, put}, Router};

use crate::AppState;

pub use chat::{ChatSnapshot, Conversation};
pub use msg::{delete, edit, send, Outgoing};
pub use typing::{set_typing, TypingDebouncer};
pub use ws::{ClientFrame, ServerFrame};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{peer}", get(chat::chat))
        .route("/{peer}/messages", post(msg::send_msg))
        .route("/{peer}/messages/{id}", patch(msg::edit_msg).delete(msg::delete_msg))
        .route("/{peer}/typing", put(typing::put_typing))
        .route("/{peer}/ws", get(ws::chat_ws))
}
