use axum::{
    debug_handler,
    extract::{ws::{Message as WsMessage, WebSocket}, Query, State, WebSocketUpgrade},
    response::{IntoResponse, Response},
    Json,
};
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{live, session::current_user, store::{Profile, Store}, AppResult};

/// Everyone except the viewer, as shown in a contact list.
pub fn contacts(profiles: Vec<Profile>, viewer: &str) -> Vec<Profile> {
    profiles.into_iter().filter(|p| p.uid != viewer).collect()
}

#[derive(Deserialize)]
pub(crate) struct RosterQuery {
    #[serde(default)]
    all: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn users(
    Query(RosterQuery { all }): Query<RosterQuery>,
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Vec<Profile>>> {
    let me = current_user(&session).await?;
    let profiles = store.profiles().await?;

    Ok(Json(if all { profiles } else { contacts(profiles, &me) }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn users_ws(
    Query(RosterQuery { all }): Query<RosterQuery>,
    State(store): State<Store>,
    session: Session,
    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let me = current_user(&session).await?;

    Ok(ws
        .on_upgrade(move |socket| stream_roster(socket, store, me, all))
        .into_response())
}

async fn stream_roster(socket: WebSocket, store: Store, me: String, all: bool) {
    let (mut sender, mut receiver) = socket.split();
    let mut snapshots = live::roster(store);

    let mut push_task = tokio::spawn(async move {
        while let Some(snap) = snapshots.next().await {
            let profiles = match snap {
                Ok(profiles) if all => profiles,
                Ok(profiles) => contacts(profiles, &me),
                Err(e) => {
                    tracing::warn!("roster read failed: {e}");
                    continue;
                }
            };
            let Ok(text) = serde_json::to_string(&profiles) else {
                continue;
            };
            if sender.send(WsMessage::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    // the client has nothing to say; we only wait for it to leave
    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(WsMessage::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => continue,
            },
            _ = &mut push_task => return,
        }
    }
    push_task.abort();
}
