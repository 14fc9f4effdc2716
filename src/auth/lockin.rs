use axum::{debug_handler, extract::{Path, Query, State}, response::Redirect};
use oauth2::{reqwest, AuthorizationCode, CsrfToken, PkceCodeVerifier, TokenResponse};
use serde::Deserialize;
use tower_sessions::Session;

use crate::{
    session::{CSRF_STATE, PKCE_VERIFIER, RETURN_URL},
    store::Store,
    AppError, AppResult, AppState, Settings,
};

use super::{clients::ClientProvider, establish_session, safe_return_url, Clients};

#[derive(Deserialize)]
pub struct LockinQuery {
    pub state: Option<String>,
    pub code: Option<String>,
}

#[debug_handler(state = AppState)]
pub(crate) async fn lockin(
    Path(provider): Path<ClientProvider>,
    Query(LockinQuery { state, code }): Query<LockinQuery>,
    State(store): State<Store>,
    State(clients): State<Clients>,
    State(settings): State<Settings>,
    session: Session,
) -> AppResult<Redirect> {
    let state = CsrfToken::new(state.ok_or(AppError::bad_request("OAuth: without state"))?);
    let code = AuthorizationCode::new(code.ok_or(AppError::bad_request("OAuth: without code"))?);

    let Some(stored_state) = session.remove::<String>(CSRF_STATE).await? else {
        return Err(AppError::bad_request("no csrf_state"));
    };

    if state.secret().as_str() != stored_state.as_str() {
        return Err(AppError::bad_request("csrf tokens don't match"));
    }

    let Some(pkce_verifier) = session.remove::<String>(PKCE_VERIFIER).await? else {
        return Err(AppError::bad_request("no pkce_verifier"));
    };
    
    let client = clients.get_client(provider)?;
    let http_client = reqwest::ClientBuilder::new()
        .redirect(reqwest::redirect::Policy::none())
        .build()?;
    let token_result = client
        .exchange_code(code)
        .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier))
        .request_async(&http_client)
        .await?;

    let access_token = token_result.access_token().secret();
    let account = clients
        .identity
        .sign_in_with_idp(access_token, provider.id(), &clients.public_url)
        .await?;

    let return_url = session.remove::<String>(RETURN_URL).await?;
    establish_session(&session, &store, settings.admin_flag_policy, &account).await?;

    Ok(Redirect::to(&safe_return_url(return_url)))
}
