use axum::{
    routing::{get, post},
    Router,
};

use crate::state::AppState;

mod dto;
pub mod handlers;
pub mod password;
pub mod repo;
pub mod token;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/users", post(handlers::register))
        .route("/users/token", post(handlers::create_token))
        .route(
            "/users/me",
            get(handlers::get_me).patch(handlers::update_me),
        )
}
