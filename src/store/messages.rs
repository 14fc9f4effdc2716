use serde::Serialize;
use uuid::Uuid;

use crate::{convo::ConversationKey, AppError, AppResult};

use super::{now_millis, Change, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Message {
    pub id: String,
    pub body: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub sender_name: String,
    pub recipient_name: Option<String>,
    pub created_at: i64,
    pub edited_at: Option<i64>,
}

const MESSAGE_COLUMNS: &str = "id,body,sender_id,recipient_id,sender_name,recipient_name,created_at,edited_at";

impl Store {
    /// All messages under `key`, oldest first. Equal timestamps keep insertion order.
    pub async fn messages(&self, key: &ConversationKey) -> AppResult<Vec<Message>> {
        Ok(
            sqlx::query_as::<_, Message>(&format!(
                "SELECT {MESSAGE_COLUMNS} FROM messages WHERE convo=? ORDER BY created_at, rowid"
            ))
            .bind(key.as_str())
            .fetch_all(&self.pool)
            .await?
        )
    }

    /// Stores a new message with a fresh id and the server's timestamp.
    pub(crate) async fn insert_message(
        &self,
        key: &ConversationKey,
        sender_id: &str,
        recipient_id: &str,
        body: &str,
        sender_name: &str,
        recipient_name: Option<&str>,
    ) -> AppResult<Message> {
        let message = Message {
            id: Uuid::now_v7().to_string(),
            body: body.to_owned(),
            sender_id: sender_id.to_owned(),
            recipient_id: recipient_id.to_owned(),
            sender_name: sender_name.to_owned(),
            recipient_name: recipient_name.map(str::to_owned),
            created_at: now_millis(),
            edited_at: None,
        };

        sqlx::query(
            "INSERT INTO messages (id,convo,body,sender_id,recipient_id,sender_name,recipient_name,created_at)
             VALUES (?,?,?,?,?,?,?,?)",
        )
        .bind(&message.id)
        .bind(key.as_str())
        .bind(&message.body)
        .bind(&message.sender_id)
        .bind(&message.recipient_id)
        .bind(&message.sender_name)
        .bind(&message.recipient_name)
        .bind(message.created_at)
        .execute(&self.pool)
        .await?;

        self.publish(Change::Messages(key.clone()));
        Ok(message)
    }

    pub(crate) async fn edit_message(&self, key: &ConversationKey, id: &str, body: &str) -> AppResult<()> {
        let done = sqlx::query("UPDATE messages SET body=?, edited_at=? WHERE id=? AND convo=?")
            .bind(body)
            .bind(now_millis())
            .bind(id)
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::not_found(format!("no message {id} in {key}")));
        }

        self.publish(Change::Messages(key.clone()));
        Ok(())
    }

    pub(crate) async fn delete_message(&self, key: &ConversationKey, id: &str) -> AppResult<()> {
        let done = sqlx::query("DELETE FROM messages WHERE id=? AND convo=?")
            .bind(id)
            .bind(key.as_str())
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(AppError::not_found(format!("no message {id} in {key}")));
        }

        self.publish(Change::Messages(key.clone()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn partitioned_by_key() {
        let store = Store::in_memory().await.unwrap();
        let ab = ConversationKey::between("a", "b");
        let ac = ConversationKey::between("a", "c");

        store.insert_message(&ab, "a", "b", "to b", "A", Some("B")).await.unwrap();
        store.insert_message(&ac, "a", "c", "to c", "A", None).await.unwrap();

        let in_ab = store.messages(&ab).await.unwrap();
        assert_eq!(in_ab.len(), 1);
        assert_eq!(in_ab[0].body, "to b");
        assert_eq!(store.messages(&ac).await.unwrap()[0].recipient_name, None);
    }

    #[tokio::test]
    async fn same_millisecond_keeps_insertion_order() {
        let store = Store::in_memory().await.unwrap();
        let key = ConversationKey::between("a", "b");
        for body in ["one", "two", "three"] {
            store.insert_message(&key, "a", "b", body, "A", None).await.unwrap();
        }
        sqlx::query("UPDATE messages SET created_at=42")
            .execute(&store.pool)
            .await
            .unwrap();

        let bodies: Vec<_> = store.messages(&key).await.unwrap().into_iter().map(|m| m.body).collect();
        assert_eq!(bodies, ["one", "two", "three"]);
    }

    #[tokio::test]
    async fn edit_and_delete_stay_inside_the_conversation() {
        let store = Store::in_memory().await.unwrap();
        let ab = ConversationKey::between("a", "b");
        let cd = ConversationKey::between("c", "d");
        let sent = store.insert_message(&ab, "a", "b", "hello", "A", None).await.unwrap();

        assert_eq!(store.edit_message(&cd, &sent.id, "hijack").await.unwrap_err().status, axum::http::StatusCode::NOT_FOUND);
        assert!(store.delete_message(&cd, &sent.id).await.is_err());

        store.edit_message(&ab, &sent.id, "hello!").await.unwrap();
        let edited = &store.messages(&ab).await.unwrap()[0];
        assert_eq!(edited.body, "hello!");
        assert!(edited.edited_at.is_some());
        assert_eq!(edited.created_at, sent.created_at);

        store.delete_message(&ab, &sent.id).await.unwrap();
        assert!(store.messages(&ab).await.unwrap().is_empty());
    }
}
