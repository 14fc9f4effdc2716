use std::fmt;

use oauth2::{basic::BasicClient, AuthUrl, Client, ClientId, ClientSecret, RedirectUrl, TokenUrl};
use serde::Deserialize;
use serde_json::Value;

use crate::{AppResult, GetField};

use super::identity::Identity;

type OAuthClient = Client<oauth2::StandardErrorResponse<oauth2::basic::BasicErrorResponseType>, oauth2::StandardTokenResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardTokenIntrospectionResponse<oauth2::EmptyExtraTokenFields, oauth2::basic::BasicTokenType>, oauth2::StandardRevocableToken, oauth2::StandardErrorResponse<oauth2::RevocationErrorResponseType>, oauth2::EndpointSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointNotSet, oauth2::EndpointSet>;

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClientProvider {
    Google,
    Github,
}

impl ClientProvider {
    /// Provider id as the identity provider names it.
    pub fn id(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google.com",
            Github => "github.com",
        }
    }

    fn slug(&self) -> &str {
        use ClientProvider::*;
        match self {
            Google => "google",
            Github => "github",
        }
    }

    fn endpoints(&self) -> (&'static str, &'static str) {
        use ClientProvider::*;
        match self {
            Google => ("https://accounts.google.com/o/oauth2/auth", "https://oauth2.googleapis.com/token"),
            Github => ("https://github.com/login/oauth/authorize", "https://github.com/login/oauth/access_token"),
        }
    }
}

impl fmt::Display for ClientProvider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

/// Everything needed to talk to the identity provider.
#[derive(Clone)]
pub struct Clients {
    pub identity: Identity,
    pub(crate) public_url: String,
    google_client: Option<OAuthClient>,
    github_client: Option<OAuthClient>,
}

impl Clients {
    /// `json` is the secrets file: `firebase.apikey` is required, the
    /// `google` and `github` OAuth credentials are optional.
    pub fn from_json(json: Value, public_url: &str, identity_toolkit_url: &str) -> AppResult<Clients> {
        let api_key = json.get_obj_field("firebase")?.get_str_field("apikey")?;

        Ok(
            Clients {
                identity: Identity::new(identity_toolkit_url, api_key),
                public_url: public_url.to_owned(),
                google_client: oauth_client(&json, ClientProvider::Google, public_url)?,
                github_client: oauth_client(&json, ClientProvider::Github, public_url)?,
            }
        )
    }

    pub fn get_client(&self, provider: ClientProvider) -> AppResult<OAuthClient> {
        use ClientProvider::*;
        match provider {
            Google => self.google_client.clone(),
            Github => self.github_client.clone(),
        }.ok_or_else(|| crate::AppError::not_found(format!("OAuth provider {provider} keys not supplied")))
    }
}

fn oauth_client(json: &Value, provider: ClientProvider, public_url: &str) -> AppResult<Option<OAuthClient>> {
    let Some(json) = json.get(provider.slug()) else {
        return Ok(None);
    };
    let client_id = ClientId::new(json.get_str_field("client_id")?);
    let client_secret = ClientSecret::new(json.get_str_field("client_secret")?);

    let (auth, token) = provider.endpoints();
    let auth_url = AuthUrl::new(auth.to_owned())?;
    let token_url = TokenUrl::new(token.to_owned())?;
    let redirect_url = RedirectUrl::new(format!("{public_url}/lockin/{}", provider.slug()))?;

    Ok(Some(
        BasicClient::new(client_id)
        .set_client_secret(client_secret)
        .set_auth_uri(auth_url)
        .set_token_uri(token_url)
        .set_redirect_uri(redirect_url)
    ))
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn optional_providers() {
        let clients = Clients::from_json(
            json!({
                "firebase": { "apikey": "k" },
                "google": { "client_id": "id", "client_secret": "secret" },
            }),
            "http://localhost:8080",
            "http://localhost:9099/identitytoolkit.googleapis.com/v1",
        )
        .unwrap();

        let google = clients.get_client(ClientProvider::Google).unwrap();
        assert_eq!(google.redirect_uri().unwrap().url().as_str(), "http://localhost:8080/lockin/google");
        assert!(clients.get_client(ClientProvider::Github).is_err());
    }

    #[test]
    fn api_key_is_required() {
        assert!(Clients::from_json(json!({}), "http://localhost:8080", "http://idp").is_err());
    }
}
