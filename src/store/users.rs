use serde::Serialize;

use crate::AppResult;

use super::{now_millis, Change, Store};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
pub struct Profile {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
    pub is_admin: Option<bool>,
    pub last_seen: i64,
    pub updated_at: Option<i64>,
}

impl Profile {
    pub fn is_admin(&self) -> bool {
        self.is_admin.unwrap_or(false)
    }

    /// Display name, falling back to the email.
    pub fn label(&self) -> Option<&str> {
        [self.display_name.as_deref(), self.email.as_deref()]
            .into_iter()
            .flatten()
            .find(|s| !s.trim().is_empty())
    }
}

/// Fields mirrored from the identity provider on every sign-in.
#[derive(Debug, Clone, Default)]
pub struct SignIn {
    pub uid: String,
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
}

/// Fields a user changes from their profile page.
#[derive(Debug, Clone, Default)]
pub struct ProfileEdit {
    pub display_name: Option<String>,
    pub email: Option<String>,
    pub photo_url: Option<String>,
    pub bio: Option<String>,
}

const PROFILE_COLUMNS: &str = "uid,display_name,email,photo_url,bio,is_admin,last_seen,updated_at";

impl Store {
    /// Merge-write of the sign-in fields. Bio and the admin flag are left alone.
    pub async fn upsert_sign_in(&self, sign_in: &SignIn) -> AppResult<()> {
        sqlx::query(
            "INSERT INTO users (uid,display_name,email,photo_url,last_seen) VALUES (?,?,?,?,?)
             ON CONFLICT(uid) DO UPDATE SET
                display_name=excluded.display_name,
                email=excluded.email,
                photo_url=excluded.photo_url,
                last_seen=excluded.last_seen",
        )
        .bind(&sign_in.uid)
        .bind(&sign_in.display_name)
        .bind(&sign_in.email)
        .bind(&sign_in.photo_url)
        .bind(now_millis())
        .execute(&self.pool)
        .await?;

        self.publish(Change::Users);
        Ok(())
    }

    pub async fn profile(&self, uid: &str) -> AppResult<Option<Profile>> {
        Ok(
            sqlx::query_as::<_, Profile>(&format!("SELECT {PROFILE_COLUMNS} FROM users WHERE uid=?"))
                .bind(uid)
                .fetch_optional(&self.pool)
                .await?
        )
    }

    pub async fn profiles(&self) -> AppResult<Vec<Profile>> {
        Ok(
            sqlx::query_as::<_, Profile>(&format!("SELECT {PROFILE_COLUMNS} FROM users ORDER BY uid"))
                .fetch_all(&self.pool)
                .await?
        )
    }

    pub async fn update_profile(&self, uid: &str, edit: &ProfileEdit) -> AppResult<()> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO users (uid,display_name,email,photo_url,bio,last_seen,updated_at) VALUES (?,?,?,?,?,?,?)
             ON CONFLICT(uid) DO UPDATE SET
                display_name=excluded.display_name,
                email=excluded.email,
                photo_url=excluded.photo_url,
                bio=excluded.bio,
                updated_at=excluded.updated_at",
        )
        .bind(uid)
        .bind(&edit.display_name)
        .bind(&edit.email)
        .bind(&edit.photo_url)
        .bind(&edit.bio)
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?;

        self.publish(Change::Users);
        Ok(())
    }

    pub async fn set_admin(&self, uid: &str, is_admin: bool) -> AppResult<()> {
        let done = sqlx::query("UPDATE users SET is_admin=? WHERE uid=?")
            .bind(is_admin)
            .bind(uid)
            .execute(&self.pool)
            .await?;
        if done.rows_affected() == 0 {
            return Err(crate::AppError::not_found(format!("no user {uid}")));
        }

        self.publish(Change::Users);
        Ok(())
    }

    /// Removes the profile document only; the identity provider account stays.
    pub async fn delete_profile(&self, uid: &str) -> AppResult<()> {
        sqlx::query("DELETE FROM users WHERE uid=?")
            .bind(uid)
            .execute(&self.pool)
            .await?;

        self.publish(Change::Users);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sign_in(uid: &str, name: Option<&str>) -> SignIn {
        SignIn {
            uid: uid.to_owned(),
            display_name: name.map(str::to_owned),
            email: Some(format!("{uid}@example.com")),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn sign_in_creates_then_merges() {
        let store = Store::in_memory().await.unwrap();
        store.upsert_sign_in(&sign_in("u1", Some("One"))).await.unwrap();

        let first = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(first.display_name.as_deref(), Some("One"));
        assert!(!first.is_admin());

        store.set_admin("u1", true).await.unwrap();
        store.update_profile("u1", &ProfileEdit {
            display_name: Some("One".into()),
            email: first.email.clone(),
            photo_url: None,
            bio: Some("hi there".into()),
        }).await.unwrap();
        store.upsert_sign_in(&sign_in("u1", Some("Uno"))).await.unwrap();

        let again = store.profile("u1").await.unwrap().unwrap();
        assert_eq!(again.display_name.as_deref(), Some("Uno"));
        assert_eq!(again.bio.as_deref(), Some("hi there"));
        assert!(again.is_admin());
        assert!(again.last_seen >= first.last_seen);
    }

    #[tokio::test]
    async fn roster_is_complete_and_ordered() {
        let store = Store::in_memory().await.unwrap();
        for uid in ["u3", "u1", "u2"] {
            store.upsert_sign_in(&sign_in(uid, None)).await.unwrap();
        }
        let uids: Vec<_> = store.profiles().await.unwrap().into_iter().map(|p| p.uid).collect();
        assert_eq!(uids, ["u1", "u2", "u3"]);

        store.delete_profile("u2").await.unwrap();
        assert_eq!(store.profiles().await.unwrap().len(), 2);
        assert!(store.profile("u2").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn set_admin_on_missing_user() {
        let store = Store::in_memory().await.unwrap();
        let err = store.set_admin("ghost", true).await.unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn writes_publish_changes() {
        let store = Store::in_memory().await.unwrap();
        let mut rx = store.subscribe();
        store.upsert_sign_in(&sign_in("u1", None)).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), Change::Users);
    }

    #[test]
    fn label_falls_back_to_email() {
        let mut profile = Profile {
            uid: "u1".into(),
            display_name: Some("  ".into()),
            email: Some("u1@example.com".into()),
            photo_url: None,
            bio: None,
            is_admin: None,
            last_seen: 0,
            updated_at: None,
        };
        assert_eq!(profile.label(), Some("u1@example.com"));
        profile.display_name = Some("Ada".into());
        assert_eq!(profile.label(), Some("Ada"));
        profile.display_name = None;
        profile.email = None;
        assert_eq!(profile.label(), None);
    }
}
