//! Live snapshot subscriptions.
//!
//! A subscription emits the full current state once, then a fresh full
//! state after every relevant write. Dropping the stream unsubscribes.

use std::future::Future;

use futures_util::{stream::{self, BoxStream}, StreamExt};
use tokio::sync::broadcast::{self, error::{RecvError, TryRecvError}};

use crate::{
    convo::ConversationKey,
    store::{Change, Message, Profile, Store, TypingRecord},
    AppResult,
};

pub type Snapshots<T> = BoxStream<'static, AppResult<T>>;

pub fn roster(store: Store) -> Snapshots<Vec<Profile>> {
    watch(
        store,
        |change| matches!(change, Change::Users),
        |store| async move { store.profiles().await },
    )
}

pub fn messages(store: Store, key: ConversationKey) -> Snapshots<Vec<Message>> {
    let wanted = key.clone();
    watch(
        store,
        move |change| matches!(change, Change::Messages(k) if *k == wanted),
        move |store| {
            let key = key.clone();
            async move { store.messages(&key).await }
        },
    )
}

pub fn typing(store: Store, key: ConversationKey) -> Snapshots<TypingRecord> {
    let wanted = key.clone();
    watch(
        store,
        move |change| matches!(change, Change::Typing(k) if *k == wanted),
        move |store| {
            let key = key.clone();
            async move { store.typing(&key).await }
        },
    )
}

struct Watch<P, L> {
    store: Store,
    rx: broadcast::Receiver<Change>,
    primed: bool,
    relevant: P,
    load: L,
}

fn watch<T, P, L, F>(store: Store, relevant: P, load: L) -> Snapshots<T>
where
    T: Send + 'static,
    P: Fn(&Change) -> bool + Send + 'static,
    L: Fn(Store) -> F + Send + 'static,
    F: Future<Output = AppResult<T>> + Send + 'static,
{
    // subscribe before the first read so nothing written in between is missed
    let rx = store.subscribe();
    let state = Watch { store, rx, primed: false, relevant, load };

    stream::unfold(state, |mut w| async move {
        if w.primed {
            if !w.next_relevant().await {
                return None;
            }
        } else {
            w.primed = true;
        }

        let snapshot = (w.load)(w.store.clone()).await;
        Some((snapshot, w))
    })
    .boxed()
}

impl<P, L> Watch<P, L>
where
    P: Fn(&Change) -> bool,
{
    /// Waits for a relevant change, then swallows whatever else is already
    /// queued so a burst costs one read. False once the feed is gone.
    async fn next_relevant(&mut self) -> bool {
        loop {
            match self.rx.recv().await {
                Ok(change) if (self.relevant)(&change) => break,
                Ok(_) => continue,
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "subscriber lagged, re-reading");
                    break;
                }
                Err(RecvError::Closed) => return false,
            }
        }

        loop {
            match self.rx.try_recv() {
                Ok(_) | Err(TryRecvError::Lagged(_)) => continue,
                Err(TryRecvError::Empty) => return true,
                Err(TryRecvError::Closed) => return true,
            }
        }
    }
}
