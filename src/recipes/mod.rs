use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::state::AppState;

pub mod dto;
pub mod handlers;
pub mod repo;

pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/recipe/recipes",
            get(handlers::list_recipes).post(handlers::create_recipe),
        )
        .route(
            "/recipe/recipes/:id",
            get(handlers::get_recipe)
                .put(handlers::full_update_recipe)
                .patch(handlers::partial_update_recipe)
                .delete(handlers::delete_recipe),
        )
        .route(
            "/recipe/recipes/:id/upload_image",
            post(handlers::upload_image),
        )
        .layer(DefaultBodyLimit::max(20 * 1024 * 1024))
}
