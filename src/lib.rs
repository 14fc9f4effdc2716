pub mod admin;
pub mod appresult;
pub mod auth;
pub mod blobs;
pub mod chats;
pub mod config;
pub mod convo;
pub mod live;
pub mod logging;
pub mod profiles;
pub mod session;
pub mod store;

use std::time::Duration;

use axum::{extract::{DefaultBodyLimit, FromRef}, http::HeaderValue, Router};
use serde_json::Value;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tower_sessions::{cookie::SameSite, Expiry, MemoryStore, SessionManagerLayer};

pub use appresult::{AppError, AppResult};

use blobs::Blobs;
use config::{AdminFlagPolicy, Config};
use store::Store;

const MAX_UPLOAD_BYTES: usize = 8 * 1024 * 1024;

/// Knobs handlers read at request time.
#[derive(Debug, Clone)]
pub struct Settings {
    pub admin_flag_policy: AdminFlagPolicy,
    pub typing_idle: Duration,
}

#[derive(Clone, FromRef)]
pub struct AppState {
    pub store: Store,
    pub clients: auth::Clients,
    pub blobs: Blobs,
    pub settings: Settings,
}

impl AppState {
    pub async fn from_config(config: &Config) -> AppResult<AppState> {
        let store = Store::connect(&config.database_url, config.database_max_connections).await?;

        let secrets = tokio::fs::read_to_string(&config.client_secret_path).await
            .map_err(|e| anyhow::anyhow!("reading {}: {e}", config.client_secret_path.display()))?;
        let clients = auth::Clients::from_json(
            serde_json::from_str(&secrets)?,
            &config.public_url,
            &config.identity_toolkit_url,
        )?;

        Ok(AppState {
            store,
            clients,
            blobs: Blobs::new(&config.blob_dir, &config.public_url),
            settings: Settings {
                admin_flag_policy: config.admin_flag_policy,
                typing_idle: config.typing_idle,
            },
        })
    }
}

pub fn router(state: AppState, config: &Config) -> AppResult<Router> {
    let session_layer = SessionManagerLayer::new(MemoryStore::default())
        .with_secure(config.public_url.starts_with("https://"))
        .with_same_site(SameSite::Lax)
        .with_expiry(Expiry::OnInactivity(time::Duration::minutes(config.session_idle_minutes)));

    let blob_service = state.blobs.service();
    let mut app = Router::new()
        .merge(auth::router())
        .merge(profiles::router())
        .nest("/c", chats::router())
        .nest("/admin", admin::router())
        .nest_service("/blobs", blob_service)
        .layer(DefaultBodyLimit::max(MAX_UPLOAD_BYTES))
        .with_state(state)
        .layer(session_layer)
        .layer(TraceLayer::new_for_http());

    if let Some(origin) = &config.cors_origin {
        let origin = HeaderValue::from_str(origin)
            .map_err(|e| anyhow::anyhow!("CORS_ORIGIN {origin:?}: {e}"))?;
        app = app.layer(
            CorsLayer::new()
                .allow_origin(origin)
                .allow_credentials(true)
                .allow_methods(tower_http::cors::AllowMethods::mirror_request())
                .allow_headers(tower_http::cors::AllowHeaders::mirror_request()),
        );
    }

    Ok(app)
}

pub trait GetField {
    fn get_str_field(&self, field: &str) -> AppResult<String>;
    fn get_obj_field(&self, field: &str) -> AppResult<&Value>;
}

impl GetField for serde_json::Value {
    fn get_str_field(&self, field: &str) -> AppResult<String> {
        Ok(
            self.get(field)
            .ok_or(format!("expected {field} in {self}"))?
            .as_str()
            .ok_or(format!("expected {field} in {self} to be string"))?
            .to_owned()
        )
    }
    
    fn get_obj_field(&self, field: &str) -> AppResult<&Value> {
        self.get(field)
        .ok_or(format!("expected {field} in {self}").into())
    }
}
