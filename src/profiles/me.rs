use axum::{
    debug_handler,
    extract::{Multipart, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;
use tower_sessions::Session;

use crate::{
    auth::{Clients, Identity},
    blobs::{sanitize_file_name, Blobs},
    session::{current_user, ID_TOKEN},
    store::{now_millis, Profile, ProfileEdit, Store},
    AppError, AppResult,
};

const MAX_DISPLAY_NAME: usize = 50;
const MAX_BIO: usize = 160;

#[derive(Debug, Serialize)]
pub(crate) struct Me {
    uid: String,
    is_admin: bool,
    profile: Option<Profile>,
}

#[derive(Debug, Clone, Default)]
pub struct ProfileForm {
    pub display_name: String,
    pub bio: String,
    /// Original file name and contents of a new avatar.
    pub avatar: Option<(String, Vec<u8>)>,
}

/// Uploads the avatar (if any), then links its URL into the identity
/// provider account and the profile document.
///
/// An upload failure aborts before anything is linked. The identity
/// provider mirror is best effort; the profile document is what others see.
pub async fn save_profile(
    store: &Store,
    blobs: &Blobs,
    identity: Option<(&Identity, &str)>,
    uid: &str,
    form: ProfileForm,
) -> AppResult<Profile> {
    if form.display_name.chars().count() > MAX_DISPLAY_NAME {
        return Err(AppError::bad_request(format!("display name is limited to {MAX_DISPLAY_NAME} characters")));
    }
    if form.bio.chars().count() > MAX_BIO {
        return Err(AppError::bad_request(format!("bio is limited to {MAX_BIO} characters")));
    }

    let current = store.profile(uid).await?;
    let email = current.as_ref().and_then(|p| p.email.clone());
    let mut photo_url = current.and_then(|p| p.photo_url);

    if let Some((file_name, bytes)) = form.avatar {
        let path = format!("profiles/{uid}/{}_{}", now_millis(), sanitize_file_name(&file_name));
        let url = blobs.upload(&path, &bytes).await.map_err(|e| {
            tracing::warn!(%uid, "avatar upload failed: {e}");
            AppError::new(StatusCode::BAD_GATEWAY, "failed to upload profile image")
        })?;
        photo_url = Some(url);
    }

    let display_name = Some(form.display_name.trim())
        .filter(|name| !name.is_empty())
        .map(str::to_owned)
        .or_else(|| email.clone());

    if let Some((identity, token)) = identity {
        if let Err(e) = identity.update_profile(token, display_name.as_deref(), photo_url.as_deref()).await {
            tracing::warn!(%uid, "identity provider profile not updated: {e}");
        }
    }

    store.update_profile(uid, &ProfileEdit {
        display_name,
        email,
        photo_url,
        bio: Some(form.bio),
    }).await?;

    store
        .profile(uid)
        .await?
        .ok_or_else(|| AppError::not_found(format!("no user {uid}")))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn me(
    State(store): State<Store>,
    session: Session,
) -> AppResult<Json<Me>> {
    let uid = current_user(&session).await?;
    let profile = store.profile(&uid).await?;

    Ok(Json(Me {
        is_admin: profile.as_ref().is_some_and(Profile::is_admin),
        uid,
        profile,
    }))
}

#[debug_handler(state = crate::AppState)]
pub(crate) async fn update_me(
    State(store): State<Store>,
    State(blobs): State<Blobs>,
    State(clients): State<Clients>,
    session: Session,
    mut multipart: Multipart,
) -> AppResult<Json<Profile>> {
    let uid = current_user(&session).await?;
    let id_token = session.get::<String>(ID_TOKEN).await?;

    let mut form = ProfileForm::default();
    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_owned();
        match name.as_str() {
            "display_name" => form.display_name = field.text().await?,
            "bio" => form.bio = field.text().await?,
            "avatar" => {
                let file_name = field.file_name().unwrap_or("upload").to_owned();
                let bytes = field.bytes().await?;
                if !bytes.is_empty() {
                    form.avatar = Some((file_name, bytes.to_vec()));
                }
            }
            _ => continue,
        }
    }

    let identity = id_token.as_deref().map(|token| (&clients.identity, token));
    Ok(Json(save_profile(&store, &blobs, identity, &uid, form).await?))
}
