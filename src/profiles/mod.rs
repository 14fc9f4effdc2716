mod me;
mod roster;

use axum::{routing::get, Router};

use crate::AppState;

pub use me::{save_profile, ProfileForm};
pub use roster::contacts;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", get(roster::users))
        .route("/users/ws", get(roster::users_ws))
        .route("/me", get(me::me).post(me::update_me))
}
