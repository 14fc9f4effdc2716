mod clients;
mod identity;
mod lockin;
mod login;
mod logout;
mod password;

use axum::{routing::{get, post}, Router};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    config::AdminFlagPolicy,
    session::{ID_TOKEN, IS_ADMIN, USER_ID},
    store::{SignIn, Store},
    AppResult, AppState,
};

pub use clients::{ClientProvider, Clients};
pub use identity::{Identity, IdpAccount};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/login", post(password::login))
        .route("/signup", post(password::signup))
        .route("/reset", post(password::reset))
        .route("/login/{provider}", get(login::login))
        .route("/lockin/{provider}", get(lockin::lockin))
        .route("/logout", get(logout::logout))
}

#[derive(Debug, Serialize)]
pub struct SignedIn {
    pub uid: String,
    /// Only known up front under [`AdminFlagPolicy::Await`].
    pub is_admin: Option<bool>,
}

/// Binds the account to the session and mirrors it into the profile store.
pub(crate) async fn establish_session(
    session: &Session,
    store: &Store,
    policy: AdminFlagPolicy,
    account: &IdpAccount,
) -> AppResult<SignedIn> {
    session.cycle_id().await?;
    // whatever the previous account left must not carry over
    session.remove_value(ID_TOKEN).await?;
    session.remove_value(IS_ADMIN).await?;
    session.insert(USER_ID, &account.local_id).await?;
    if let Some(token) = &account.id_token {
        session.insert(ID_TOKEN, token).await?;
    }

    let is_admin = sync_profile(store, policy, &account.sign_in()).await;
    if let Some(is_admin) = is_admin {
        session.insert(IS_ADMIN, is_admin).await?;
    }

    tracing::info!(uid = %account.local_id, "welcome");
    Ok(SignedIn { uid: account.local_id.clone(), is_admin })
}

/// Merge-writes the profile for a fresh sign-in. Never fails the sign-in:
/// a write error is logged and the session goes ahead without it.
///
/// Under [`AdminFlagPolicy::Await`] the profile is read back and its admin
/// flag returned; under `Lazy` this returns `None` straight away.
pub async fn sync_profile(store: &Store, policy: AdminFlagPolicy, sign_in: &SignIn) -> Option<bool> {
    if let Err(e) = store.upsert_sign_in(sign_in).await {
        tracing::warn!(uid = %sign_in.uid, "profile sync failed: {e}");
    }

    match policy {
        AdminFlagPolicy::Lazy => None,
        AdminFlagPolicy::Await => match store.profile(&sign_in.uid).await {
            Ok(profile) => Some(profile.is_some_and(|p| p.is_admin())),
            Err(e) => {
                tracing::warn!(uid = %sign_in.uid, "admin flag read failed: {e}");
                None
            }
        },
    }
}

/// Only same-site paths are followed after sign-in or sign-out.
pub(crate) fn safe_return_url(return_url: Option<String>) -> String {
    return_url
        .filter(|url| url.starts_with('/') && !url.starts_with("//") && !url.contains('\\'))
        .unwrap_or_else(|| "/".to_owned())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tower_sessions::MemoryStore;

    use super::*;

    fn ada() -> SignIn {
        SignIn {
            uid: "ada".into(),
            display_name: Some("Ada".into()),
            email: Some("ada@example.com".into()),
            photo_url: None,
        }
    }

    #[tokio::test]
    async fn await_policy_reads_the_flag_back() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(sync_profile(&store, AdminFlagPolicy::Await, &ada()).await, Some(false));

        store.set_admin("ada", true).await.unwrap();
        assert_eq!(sync_profile(&store, AdminFlagPolicy::Await, &ada()).await, Some(true));
    }

    #[tokio::test]
    async fn lazy_policy_skips_the_read() {
        let store = Store::in_memory().await.unwrap();
        assert_eq!(sync_profile(&store, AdminFlagPolicy::Lazy, &ada()).await, None);
        assert!(store.profile("ada").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn next_sign_in_starts_clean() {
        let store = Store::in_memory().await.unwrap();
        let session = Session::new(None, Arc::new(MemoryStore::default()), None);

        store.upsert_sign_in(&ada()).await.unwrap();
        store.set_admin("ada", true).await.unwrap();
        let first = IdpAccount { local_id: "ada".into(), id_token: Some("ada-token".into()), ..Default::default() };
        let signed_in = establish_session(&session, &store, AdminFlagPolicy::Await, &first).await.unwrap();
        assert_eq!(signed_in.is_admin, Some(true));
        assert_eq!(session.get::<bool>(IS_ADMIN).await.unwrap(), Some(true));

        // the read-back for the next account fails
        store.close().await;
        let bob = IdpAccount { local_id: "bob".into(), ..Default::default() };
        let signed_in = establish_session(&session, &store, AdminFlagPolicy::Await, &bob).await.unwrap();
        assert_eq!(signed_in.is_admin, None);

        assert_eq!(session.get::<String>(USER_ID).await.unwrap().as_deref(), Some("bob"));
        assert_eq!(session.get::<bool>(IS_ADMIN).await.unwrap(), None);
        assert_eq!(session.get::<String>(ID_TOKEN).await.unwrap(), None);

        let cached = session.get::<bool>(IS_ADMIN).await.unwrap();
        assert!(!matches!(crate::admin::is_admin(&store, AdminFlagPolicy::Await, "bob", cached).await, Ok(true)));
    }

    #[test]
    fn return_urls() {
        assert_eq!(safe_return_url(Some("/c/bob".into())), "/c/bob");
        assert_eq!(safe_return_url(Some("https://evil.example".into())), "/");
        assert_eq!(safe_return_url(Some("//evil.example".into())), "/");
        assert_eq!(safe_return_url(None), "/");
    }
}
