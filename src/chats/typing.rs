use std::time::Duration;

use axum::{debug_handler, extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use tokio::task::JoinHandle;
use tower_sessions::Session;

use crate::{convo::ConversationKey, session::current_user, store::Store, AppResult};

use super::chat::Conversation;

pub async fn set_typing(store: &Store, key: &ConversationKey, user_id: &str, is_typing: bool) -> AppResult<()> {
    store.set_typing(key, user_id, is_typing).await
}

/// Turns keystrokes into typing flags for one user in one conversation.
///
/// Each keystroke raises the flag and restarts the idle timer; when the
/// timer runs out the flag is lowered. Dropping the debouncer cancels a
/// pending timer without writing.
pub struct TypingDebouncer {
    store: Store,
    key: ConversationKey,
    user_id: String,
    idle: Duration,
    pending: Option<JoinHandle<()>>,
}

impl TypingDebouncer {
    pub fn new(store: Store, key: ConversationKey, user_id: impl Into<String>, idle: Duration) -> TypingDebouncer {
        TypingDebouncer {
            store,
            key,
            user_id: user_id.into(),
            idle,
            pending: None,
        }
    }

    /// The timer is restarted even when raising the flag fails, so a flag
    /// left up by an earlier keystroke still comes down after `idle`.
    pub async fn keystroke(&mut self) -> AppResult<()> {
        let raised = self.store.set_typing(&self.key, &self.user_id, true).await;

        let (store, key, user_id, idle) = (self.store.clone(), self.key.clone(), self.user_id.clone(), self.idle);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Err(e) = store.set_typing(&key, &user_id, false).await {
                tracing::warn!(%key, %user_id, "could not lower typing flag: {e}");
            }
        });
        if let Some(old) = self.pending.replace(timer) {
            old.abort();
        }
        raised
    }

    /// After a send; the send already lowered the flag.
    pub fn sent(&mut self) {
        self.cancel();
    }

    /// Lowers the flag now and forgets any pending timer.
    pub async fn stop(&mut self) -> AppResult<()> {
        self.cancel();
        self.store.set_typing(&self.key, &self.user_id, false).await
    }

    pub fn is_pending(&self) -> bool {
        self.pending.as_ref().is_some_and(|t| !t.is_finished())
    }

    fn cancel(&mut self) {
        if let Some(timer) = self.pending.take() {
            timer.abort();
        }
    }
}

impl Drop for TypingDebouncer {
    fn drop(&mut self) {
        self.cancel();
    }
}

#[derive(Deserialize)]
pub(crate) struct TypingQuery {
    is_typing: bool,
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn put_typing(
    Path(peer_id): Path<String>,
    State(store): State<Store>,
    session: Session,
    Json(TypingQuery { is_typing }): Json<TypingQuery>,
) -> AppResult<StatusCode> {
    let me = current_user(&session).await?;
    let convo = Conversation::open(&store, &me, &peer_id).await?;

    set_typing(&store, &convo.key, &me, is_typing).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use tokio::time::sleep;

    use super::*;

    const IDLE: Duration = Duration::from_millis(80);

    async fn flag(store: &Store, key: &ConversationKey) -> Option<bool> {
        store.typing(key).await.unwrap().get("u1").copied()
    }

    #[tokio::test]
    async fn true_then_false_settles_false() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        set_typing(&store, &key, "u1", true).await.unwrap();
        set_typing(&store, &key, "u1", false).await.unwrap();
        assert_eq!(flag(&store, &key).await, Some(false));
    }

    #[tokio::test]
    async fn idle_timer_lowers_flag() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        let mut debouncer = TypingDebouncer::new(store.clone(), key.clone(), "u1", IDLE);

        debouncer.keystroke().await.unwrap();
        assert_eq!(flag(&store, &key).await, Some(true));

        sleep(IDLE * 4).await;
        assert_eq!(flag(&store, &key).await, Some(false));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn keystrokes_restart_the_timer() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        let mut debouncer = TypingDebouncer::new(store.clone(), key.clone(), "u1", Duration::from_millis(300));

        for _ in 0..4 {
            debouncer.keystroke().await.unwrap();
            sleep(Duration::from_millis(100)).await;
        }
        // 400ms since the first keystroke, only 100ms since the last
        assert_eq!(flag(&store, &key).await, Some(true));
        assert!(debouncer.is_pending());

        debouncer.stop().await.unwrap();
        assert_eq!(flag(&store, &key).await, Some(false));
        assert!(!debouncer.is_pending());
    }

    #[tokio::test]
    async fn failed_keystroke_keeps_a_timer() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        let mut debouncer = TypingDebouncer::new(store.clone(), key.clone(), "u1", Duration::from_secs(5));

        debouncer.keystroke().await.unwrap();
        assert!(debouncer.is_pending());

        store.close().await;
        assert!(debouncer.keystroke().await.is_err());
        assert!(debouncer.is_pending());
    }

    #[tokio::test]
    async fn sent_cancels_pending_timer() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        let mut debouncer = TypingDebouncer::new(store.clone(), key.clone(), "u1", IDLE);

        debouncer.keystroke().await.unwrap();
        debouncer.sent();
        assert!(!debouncer.is_pending());

        // nothing else lowers it here, so the cancelled timer must not have fired
        sleep(IDLE * 3).await;
        assert_eq!(flag(&store, &key).await, Some(true));
    }
}
