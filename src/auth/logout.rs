use axum::{debug_handler, extract::Query, response::Redirect};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{session::USER_ID, AppResult};

use super::safe_return_url;

#[derive(Deserialize)]
pub(crate) struct LogoutQuery {
    pub(crate) return_url: Option<String>,
}

/// Drops the whole session, profile-derived state included.
#[debug_handler]
pub(crate) async fn logout(
    Query(LogoutQuery { return_url }): Query<LogoutQuery>,
    session: Session
) -> AppResult<Redirect> {
    if let Some(uid) = session.get::<String>(USER_ID).await? {
        tracing::info!(%uid, "goodbye");
    }
    session.flush().await?;
    Ok(Redirect::to(&safe_return_url(return_url)))
}
