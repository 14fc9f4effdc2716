use axum::{debug_handler, extract::State, http::StatusCode, Json};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{store::Store, AppError, AppResult, AppState, Settings};

use super::{establish_session, Clients, SignedIn};

#[derive(Deserialize)]
pub(crate) struct Credentials {
    email: String,
    password: String,
    #[serde(default)]
    display_name: Option<String>,
}

#[derive(Deserialize)]
pub(crate) struct ResetQuery {
    email: String,
}

fn check_credentials(credentials: &Credentials) -> AppResult<()> {
    if credentials.email.trim().is_empty() || credentials.password.is_empty() {
        return Err(AppError::bad_request("Please enter email and password."));
    }
    Ok(())
}

#[debug_handler(state = AppState)]
pub(crate) async fn login(
    State(store): State<Store>,
    State(clients): State<Clients>,
    State(settings): State<Settings>,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> AppResult<Json<SignedIn>> {
    check_credentials(&credentials)?;
    let account = clients
        .identity
        .sign_in_with_password(credentials.email.trim(), &credentials.password)
        .await?;

    Ok(Json(establish_session(&session, &store, settings.admin_flag_policy, &account).await?))
}

#[debug_handler(state = AppState)]
pub(crate) async fn signup(
    State(store): State<Store>,
    State(clients): State<Clients>,
    State(settings): State<Settings>,
    session: Session,
    Json(credentials): Json<Credentials>,
) -> AppResult<(StatusCode, Json<SignedIn>)> {
    check_credentials(&credentials)?;
    let account = clients
        .identity
        .sign_up(credentials.email.trim(), &credentials.password, credentials.display_name.as_deref())
        .await?;

    let signed_in = establish_session(&session, &store, settings.admin_flag_policy, &account).await?;
    Ok((StatusCode::CREATED, Json(signed_in)))
}

#[debug_handler(state = AppState)]
pub(crate) async fn reset(
    State(clients): State<Clients>,
    Json(ResetQuery { email }): Json<ResetQuery>,
) -> AppResult<StatusCode> {
    if email.trim().is_empty() {
        return Err(AppError::bad_request("Please enter your email address."));
    }
    clients.identity.send_password_reset(email.trim()).await?;
    Ok(StatusCode::ACCEPTED)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credentials(email: &str, password: &str) -> Credentials {
        Credentials { email: email.into(), password: password.into(), display_name: None }
    }

    #[test]
    fn blank_credentials_are_rejected() {
        for (email, password) in [("", "hunter2"), ("   ", "hunter2"), ("ada@example.com", "")] {
            let err = check_credentials(&credentials(email, password)).unwrap_err();
            assert_eq!(err.status, StatusCode::BAD_REQUEST);
        }
        assert!(check_credentials(&credentials("ada@example.com", "hunter2")).is_ok());
    }
}
