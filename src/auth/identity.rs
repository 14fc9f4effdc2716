//! Identity Toolkit REST client: every credential check happens at the
//! identity provider, this side only relays and keeps the session.

use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::{store::SignIn, AppError, AppResult};

#[derive(Clone)]
pub struct Identity {
    base_url: String,
    api_key: String,
    http: reqwest::Client,
}

/// An account as the identity provider reports it after a sign-in.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IdpAccount {
    pub local_id: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub photo_url: Option<String>,
    #[serde(default)]
    pub id_token: Option<String>,
}

impl IdpAccount {
    pub fn sign_in(&self) -> SignIn {
        let present = |s: &Option<String>| s.clone().filter(|s| !s.is_empty());
        SignIn {
            uid: self.local_id.clone(),
            display_name: present(&self.display_name),
            email: present(&self.email),
            photo_url: present(&self.photo_url),
        }
    }

    /// Fills the profile fields this response left out from `other`.
    fn or(mut self, other: IdpAccount) -> IdpAccount {
        self.email = self.email.filter(|s| !s.is_empty()).or(other.email);
        self.display_name = self.display_name.filter(|s| !s.is_empty()).or(other.display_name);
        self.photo_url = self.photo_url.filter(|s| !s.is_empty()).or(other.photo_url);
        self
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct IdpRequest<'a> {
    post_body: String,
    request_uri: &'a str,
    return_idp_credential: bool,
    return_secure_token: bool,
}

impl Identity {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Identity {
        Identity {
            base_url: base_url.into(),
            api_key: api_key.into(),
            http: reqwest::Client::new(),
        }
    }

    async fn call<B: Serialize>(&self, method: &str, body: &B) -> AppResult<Value> {
        let url = format!("{}/accounts:{method}?key={}", self.base_url, self.api_key);
        let response = self.http.post(url).json(body).send().await?;
        let status = response.status();
        let body: Value = response.json().await?;

        if !status.is_success() {
            let err = provider_error(&body);
            tracing::info!(method, status = %err.status, "identity provider refused: {}", err.error);
            return Err(err);
        }
        Ok(body)
    }

    pub async fn sign_in_with_password(&self, email: &str, password: &str) -> AppResult<IdpAccount> {
        let body = self
            .call("signInWithPassword", &json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .await?;
        let account: IdpAccount = serde_json::from_value(body)?;
        self.completed(account).await
    }

    /// Creates the account, then sets its display name when one was given.
    pub async fn sign_up(&self, email: &str, password: &str, display_name: Option<&str>) -> AppResult<IdpAccount> {
        let body = self
            .call("signUp", &json!({
                "email": email,
                "password": password,
                "returnSecureToken": true,
            }))
            .await?;
        let mut account: IdpAccount = serde_json::from_value(body)?;

        if let (Some(name), Some(token)) = (display_name.filter(|n| !n.trim().is_empty()), account.id_token.as_deref()) {
            self.update_profile(token, Some(name), None).await?;
            account.display_name = Some(name.to_owned());
        }
        Ok(account)
    }

    pub async fn send_password_reset(&self, email: &str) -> AppResult<()> {
        self.call("sendOobCode", &json!({
            "requestType": "PASSWORD_RESET",
            "email": email,
        }))
        .await?;
        Ok(())
    }

    /// Exchanges an OAuth access token from `provider_id` for an account.
    pub async fn sign_in_with_idp(&self, access_token: &str, provider_id: &str, request_uri: &str) -> AppResult<IdpAccount> {
        let body = self
            .call("signInWithIdp", &IdpRequest {
                post_body: format!("access_token={access_token}&providerId={provider_id}"),
                request_uri,
                return_idp_credential: true,
                return_secure_token: true,
            })
            .await?;
        Ok(serde_json::from_value(body)?)
    }

    /// Sets display name and photo URL on the account; a `None` photo removes it.
    pub async fn update_profile(&self, id_token: &str, display_name: Option<&str>, photo_url: Option<&str>) -> AppResult<()> {
        let mut body = json!({
            "idToken": id_token,
            "returnSecureToken": false,
        });
        if let Some(name) = display_name {
            body["displayName"] = json!(name);
        }
        match photo_url {
            Some(url) => body["photoUrl"] = json!(url),
            None => body["deleteAttribute"] = json!(["PHOTO_URL"]),
        }

        self.call("update", &body).await?;
        Ok(())
    }

    pub async fn lookup(&self, id_token: &str) -> AppResult<IdpAccount> {
        let mut body = self.call("lookup", &json!({ "idToken": id_token })).await?;
        let Some(user) = body.get_mut("users").and_then(|users| users.get_mut(0)) else {
            return Err(AppError::unauthorized("account not found"));
        };
        Ok(serde_json::from_value(user.take())?)
    }

    /// Password sign-in answers without the photo URL; ask for the rest.
    async fn completed(&self, account: IdpAccount) -> AppResult<IdpAccount> {
        let Some(token) = account.id_token.clone() else {
            return Ok(account);
        };
        match self.lookup(&token).await {
            Ok(full) => Ok(account.or(full)),
            Err(e) => {
                tracing::warn!(uid = %account.local_id, "account lookup failed: {e}");
                Ok(account)
            }
        }
    }
}

/// Maps an identity provider error body to something a user can read.
pub(crate) fn provider_error(body: &Value) -> AppError {
    let raw = body["error"]["message"].as_str().unwrap_or("IDENTITY_PROVIDER_ERROR");
    let (code, detail) = match raw.split_once(':') {
        Some((code, detail)) => (code.trim(), Some(detail.trim())),
        None => (raw.trim(), None),
    };

    let status = match code {
        "EMAIL_NOT_FOUND" | "INVALID_PASSWORD" | "INVALID_LOGIN_CREDENTIALS" | "USER_DISABLED"
        | "INVALID_ID_TOKEN" | "TOKEN_EXPIRED" | "USER_NOT_FOUND" | "INVALID_IDP_RESPONSE" => StatusCode::UNAUTHORIZED,
        "TOO_MANY_ATTEMPTS_TRY_LATER" => StatusCode::TOO_MANY_REQUESTS,
        _ => StatusCode::BAD_REQUEST,
    };

    let message = match detail {
        Some(detail) if !detail.is_empty() => detail.to_owned(),
        _ => code.replace('_', " ").to_lowercase(),
    };
    AppError::new(status, message)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_errors_are_unauthorized() {
        let err = provider_error(&json!({ "error": { "code": 400, "message": "INVALID_PASSWORD" } }));
        assert_eq!(err.status, StatusCode::UNAUTHORIZED);
        assert_eq!(err.error.to_string(), "invalid password");
    }

    #[test]
    fn detail_wins_over_code() {
        let err = provider_error(&json!({
            "error": { "message": "WEAK_PASSWORD : Password should be at least 6 characters" }
        }));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.to_string(), "Password should be at least 6 characters");
    }

    #[test]
    fn throttling_and_garbage() {
        assert_eq!(
            provider_error(&json!({ "error": { "message": "TOO_MANY_ATTEMPTS_TRY_LATER" } })).status,
            StatusCode::TOO_MANY_REQUESTS
        );
        let err = provider_error(&json!("nope"));
        assert_eq!(err.status, StatusCode::BAD_REQUEST);
        assert_eq!(err.error.to_string(), "identity provider error");
    }

    #[test]
    fn account_to_sign_in_drops_empty_fields() {
        let account: IdpAccount = serde_json::from_value(json!({
            "localId": "abc123",
            "email": "ada@example.com",
            "displayName": "",
            "idToken": "tok",
            "registered": true,
        }))
        .unwrap();
        let sign_in = account.sign_in();
        assert_eq!(sign_in.uid, "abc123");
        assert_eq!(sign_in.email.as_deref(), Some("ada@example.com"));
        assert_eq!(sign_in.display_name, None);
        assert_eq!(sign_in.photo_url, None);
    }

    #[test]
    fn lookup_fills_missing_fields() {
        let partial = IdpAccount { local_id: "u1".into(), display_name: Some(String::new()), ..Default::default() };
        let full = IdpAccount {
            local_id: "u1".into(),
            display_name: Some("Ada".into()),
            photo_url: Some("https://img/ada.png".into()),
            ..Default::default()
        };
        let merged = partial.or(full);
        assert_eq!(merged.display_name.as_deref(), Some("Ada"));
        assert_eq!(merged.photo_url.as_deref(), Some("https://img/ada.png"));
    }
}
