use axum::{
    routing::{delete, get},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/recipe/tags",
            get(handlers::list_tags).post(handlers::create_tag),
        )
        .route("/recipe/tags/:id", delete(handlers::delete_tag))
        .route(
            "/recipe/ingredients",
            get(handlers::list_ingredients).post(handlers::create_ingredient),
        )
        .route(
            "/recipe/ingredients/:id",
            delete(handlers::delete_ingredient),
        )
}
