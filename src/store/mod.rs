//! Document storage on SQLite plus the change feed that drives live
//! subscriptions. Every write publishes a [`Change`] after it commits.

mod messages;
mod typing;
mod users;

use std::str::FromStr;

use sqlx::{sqlite::{SqliteConnectOptions, SqlitePoolOptions}, SqlitePool};
use time::OffsetDateTime;
use tokio::sync::broadcast;

use crate::{convo::ConversationKey, AppResult};

pub use messages::Message;
pub use typing::TypingRecord;
pub use users::{Profile, ProfileEdit, SignIn};

const CHANGE_CAPACITY: usize = 256;

/// What a write touched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Change {
    Users,
    Messages(ConversationKey),
    Typing(ConversationKey),
}

#[derive(Clone)]
pub struct Store {
    pool: SqlitePool,
    changes: broadcast::Sender<Change>,
}

impl Store {
    pub async fn connect(url: &str, max_connections: u32) -> AppResult<Store> {
        let options = SqliteConnectOptions::from_str(url)?.create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;
        Store::with_pool(pool).await
    }

    /// Private in-memory database on a single connection that never expires.
    pub async fn in_memory() -> AppResult<Store> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;
        Store::with_pool(pool).await
    }

    async fn with_pool(pool: SqlitePool) -> AppResult<Store> {
        sqlx::migrate!("./migrations").run(&pool).await?;
        Ok(Store {
            pool,
            changes: broadcast::channel(CHANGE_CAPACITY).0,
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Change> {
        self.changes.subscribe()
    }

    /// Live subscriptions still attached to the change feed.
    pub fn subscriber_count(&self) -> usize {
        self.changes.receiver_count()
    }

    /// Shuts the pool so every later query fails.
    #[cfg(test)]
    pub(crate) async fn close(&self) {
        self.pool.close().await;
    }

    fn publish(&self, change: Change) {
        // no live subscribers is fine
        let _ = self.changes.send(change);
    }
}

/// Server clock in unix milliseconds.
pub fn now_millis() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}
