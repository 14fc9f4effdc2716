//! Admin-only row mutation on user profiles.

use axum::{
    debug_handler,
    extract::{Path, State},
    http::StatusCode,
    routing::{delete, post},
    Json, Router,
};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    config::AdminFlagPolicy,
    session::{current_user, IS_ADMIN},
    store::Store,
    AppError, AppResult, AppState, Settings,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users/{uid}/toggle-admin", post(toggle_admin))
        .route("/users/{uid}", delete(delete_user))
}

/// Whether `uid` may use admin routes. `cached` is the flag stored in the
/// session at sign-in, if the policy put one there.
pub async fn is_admin(store: &Store, policy: AdminFlagPolicy, uid: &str, cached: Option<bool>) -> AppResult<bool> {
    if let (AdminFlagPolicy::Await, Some(flag)) = (policy, cached) {
        return Ok(flag);
    }
    Ok(store.profile(uid).await?.is_some_and(|p| p.is_admin()))
}

async fn require_admin(session: &Session, store: &Store, settings: &Settings) -> AppResult<String> {
    let me = current_user(session).await?;
    let cached = session.get::<bool>(IS_ADMIN).await?;

    if !is_admin(store, settings.admin_flag_policy, &me, cached).await? {
        return Err(AppError::forbidden("admins only"));
    }
    Ok(me)
}

/// Flips `target`'s admin flag. Nobody changes their own.
pub async fn toggle(store: &Store, actor: &str, target: &str) -> AppResult<bool> {
    if actor == target {
        return Err(AppError::bad_request("You cannot change your own admin status!"));
    }
    let Some(profile) = store.profile(target).await? else {
        return Err(AppError::not_found(format!("no user {target}")));
    };

    let now_admin = !profile.is_admin();
    store.set_admin(target, now_admin).await?;
    tracing::info!(%actor, %target, now_admin, "admin flag changed");
    Ok(now_admin)
}

/// Deletes `target`'s profile document. Nobody deletes themselves.
pub async fn remove(store: &Store, actor: &str, target: &str) -> AppResult<()> {
    if actor == target {
        return Err(AppError::bad_request("Admins cannot delete themselves."));
    }
    store.delete_profile(target).await?;
    tracing::info!(%actor, %target, "user deleted");
    Ok(())
}

#[derive(Serialize)]
struct Toggled {
    uid: String,
    is_admin: bool,
}

#[debug_handler(state = AppState)]
async fn toggle_admin(
    Path(target): Path<String>,
    State(store): State<Store>,
    State(settings): State<Settings>,
    session: Session,
) -> AppResult<Json<Toggled>> {
    let me = require_admin(&session, &store, &settings).await?;
    let is_admin = toggle(&store, &me, &target).await?;
    Ok(Json(Toggled { uid: target, is_admin }))
}

#[debug_handler(state = AppState)]
async fn delete_user(
    Path(target): Path<String>,
    State(store): State<Store>,
    State(settings): State<Settings>,
    session: Session,
) -> AppResult<StatusCode> {
    let me = require_admin(&session, &store, &settings).await?;
    remove(&store, &me, &target).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::SignIn;

    async fn store_with(uids: &[&str]) -> Store {
        let store = Store::in_memory().await.unwrap();
        for uid in uids {
            store.upsert_sign_in(&SignIn { uid: uid.to_string(), ..Default::default() }).await.unwrap();
        }
        store
    }

    #[tokio::test]
    async fn toggle_flips_back_and_forth() {
        let store = store_with(&["root", "u1"]).await;
        assert!(toggle(&store, "root", "u1").await.unwrap());
        assert!(store.profile("u1").await.unwrap().unwrap().is_admin());
        assert!(!toggle(&store, "root", "u1").await.unwrap());
        assert!(!store.profile("u1").await.unwrap().unwrap().is_admin());
    }

    #[tokio::test]
    async fn no_self_service() {
        let store = store_with(&["root"]).await;
        assert_eq!(toggle(&store, "root", "root").await.unwrap_err().status, StatusCode::BAD_REQUEST);
        assert_eq!(remove(&store, "root", "root").await.unwrap_err().status, StatusCode::BAD_REQUEST);
        assert!(store.profile("root").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn remove_drops_the_profile() {
        let store = store_with(&["root", "u1"]).await;
        remove(&store, "root", "u1").await.unwrap();
        assert!(store.profile("u1").await.unwrap().is_none());
        assert_eq!(toggle(&store, "root", "u1").await.unwrap_err().status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn flag_source_follows_policy() {
        let store = store_with(&["root"]).await;
        store.set_admin("root", true).await.unwrap();

        // a stale cached `false` wins under Await, the document wins under Lazy
        assert!(!is_admin(&store, AdminFlagPolicy::Await, "root", Some(false)).await.unwrap());
        assert!(is_admin(&store, AdminFlagPolicy::Lazy, "root", Some(false)).await.unwrap());
        assert!(is_admin(&store, AdminFlagPolicy::Await, "root", None).await.unwrap());
        assert!(!is_admin(&store, AdminFlagPolicy::Lazy, "nobody", None).await.unwrap());
    }
}
