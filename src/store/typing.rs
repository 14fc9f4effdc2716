use std::collections::BTreeMap;

use crate::{convo::ConversationKey, AppResult};

use super::{Change, Store};

/// Participant id to "is typing" for one conversation.
pub type TypingRecord = BTreeMap<String, bool>;

impl Store {
    /// Merge-write touching only `user_id`'s flag.
    pub async fn set_typing(&self, key: &ConversationKey, user_id: &str, is_typing: bool) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO typing (convo,user_id,is_typing) VALUES (?,?,?)
             ON CONFLICT(convo,user_id) DO UPDATE SET is_typing=excluded.is_typing",
        )
        .bind(key.as_str())
        .bind(user_id)
        .bind(is_typing)
        .execute(&self.pool)
        .await?;

        self.publish(Change::Typing(key.clone()));
        Ok(())
    }

    pub async fn typing(&self, key: &ConversationKey) -> AppResult<TypingRecord> {
        let rows: Vec<(String, bool)> = sqlx::query_as("SELECT user_id,is_typing FROM typing WHERE convo=?")
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn flags_are_per_participant() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("u1", "u2");
        assert!(store.typing(&key).await.unwrap().is_empty());

        store.set_typing(&key, "u1", true).await.unwrap();
        store.set_typing(&key, "u2", true).await.unwrap();
        store.set_typing(&key, "u1", false).await.unwrap();

        let record = store.typing(&key).await.unwrap();
        assert_eq!(record.get("u1"), Some(&false));
        assert_eq!(record.get("u2"), Some(&true));
        assert!(store.typing(&ConversationKey::between("u1", "u3")).await.unwrap().is_empty());
    }
}
