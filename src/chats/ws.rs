use std::time::Duration;

use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, Path, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
};
use futures_util::{stream, Sink, SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::{sync::mpsc, task::JoinHandle};
use tower_sessions::Session;

use crate::{
    live,
    session::current_user,
    store::{Message, Store, TypingRecord},
    AppResult, Settings,
};

use super::{chat::Conversation, msg, typing::TypingDebouncer};

/// Pushed to the client. Snapshots are always complete.
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    Messages { messages: Vec<Message> },
    Typing { peer_typing: bool, record: TypingRecord },
    Error { message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Send { body: String },
    Edit { id: String, body: String },
    Delete { id: String },
    Keystroke,
    StopTyping,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn chat_ws(
    Path(peer_id): Path<String>,
    State(store): State<Store>,
    State(settings): State<Settings>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    tracing::debug!(key = %convo.key, "chat socket opening");
    Ok(ws
        .on_upgrade(move |socket| run(socket, store, convo, settings.typing_idle))
        .into_response())
}

async fn run(socket: WebSocket, store: Store, convo: Conversation, idle: Duration) {
    let (sender, mut receiver) = socket.split();
    let (err_tx, err_rx) = mpsc::channel::<String>(16);
    let mut push_task = push(&store, &convo, sender, err_rx);

    let mut debouncer = TypingDebouncer::new(store.clone(), convo.key.clone(), convo.me.clone(), idle);
    let pushed_out = loop {
        let msg = tokio::select! {
            msg = receiver.next() => msg,
            _ = &mut push_task => break true,
        };
        let Some(Ok(msg)) = msg else {
            break false;
        };

        let frame = match msg {
            WsMessage::Text(text) => serde_json::from_str::<ClientFrame>(text.as_str()),
            WsMessage::Close(_) => break false,
            _ => continue,
        };
        let result = match frame {
            Ok(frame) => apply(&store, &convo, &mut debouncer, frame).await,
            Err(e) => Err(crate::AppError::bad_request(format!("unreadable command: {e}"))),
        };
        if let Err(e) = result {
            tracing::debug!(key = %convo.key, "command failed: {e}");
            let _ = err_tx.send(e.error.to_string()).await;
        }
    };

    hang_up(&store, &convo, &mut debouncer, (!pushed_out).then_some(push_task)).await;
}

/// Forwards message and typing snapshots, plus command errors, to `sink`
/// until the sink goes away.
fn push<S>(store: &Store, convo: &Conversation, mut sink: S, mut err_rx: mpsc::Receiver<String>) -> JoinHandle<()>
where
    S: Sink<WsMessage> + Unpin + Send + 'static,
{
    let peer_id = convo.peer.uid.clone();
    let mut snapshots = stream::select(
        live::messages(store.clone(), convo.key.clone())
            .map(|snap| snap.map(|messages| ServerFrame::Messages { messages })),
        live::typing(store.clone(), convo.key.clone()).map(move |snap| {
            snap.map(|record| ServerFrame::Typing {
                peer_typing: record.get(&peer_id).copied().unwrap_or(false),
                record,
            })
        }),
    );

    tokio::spawn(async move {
        loop {
            let frame = tokio::select! {
                Some(snap) = snapshots.next() => match snap {
                    Ok(frame) => frame,
                    Err(e) => {
                        tracing::warn!("snapshot read failed: {e}");
                        ServerFrame::Error { message: e.error.to_string() }
                    }
                },
                Some(message) = err_rx.recv() => ServerFrame::Error { message },
                else => break,
            };

            let Ok(text) = serde_json::to_string(&frame) else {
                continue;
            };
            if sink.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    })
}

/// Lowers our typing flag and drops both subscriptions. `push_task` is
/// `None` when it already finished on its own.
async fn hang_up(store: &Store, convo: &Conversation, debouncer: &mut TypingDebouncer, push_task: Option<JoinHandle<()>>) {
    if let Err(e) = debouncer.stop().await {
        tracing::warn!(key = %convo.key, "typing flag left raised on disconnect: {e}");
    }
    if let Some(push_task) = push_task {
        push_task.abort();
        // resolves once the task, and the streams it owns, are gone
        let _ = push_task.await;
    }
    tracing::debug!(key = %convo.key, subscribers = store.subscriber_count(), "chat socket closed");
}

async fn apply(
    store: &Store,
    convo: &Conversation,
    debouncer: &mut TypingDebouncer,
    frame: ClientFrame,
) -> AppResult<()> {
    match frame {
        ClientFrame::Send { body } => {
            if msg::send(store, convo.outgoing(body)).await?.is_some() {
                debouncer.sent();
            }
        }
        ClientFrame::Edit { id, body } => {
            msg::edit(store, &convo.key, &id, &body).await?;
        }
        ClientFrame::Delete { id } => {
            msg::delete(store, &convo.key, &id).await?;
        }
        ClientFrame::Keystroke => debouncer.keystroke().await?,
        ClientFrame::StopTyping => debouncer.stop().await?,
    }
    Ok(())
}
