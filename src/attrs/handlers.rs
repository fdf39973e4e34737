use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::attrs::dto::{AttrCreate, AttrListQuery, IngredientOut, TagOut};
use crate::attrs::repo::{self, Attr, AttrKind};
use crate::error::ApiError;
use crate::state::AppState;
use crate::users::token::AuthUser;

async fn list_attrs(
    state: &AppState,
    user_id: Uuid,
    kind: AttrKind,
    q: &AttrListQuery,
) -> Result<Vec<Attr>, ApiError> {
    Ok(repo::list(&state.db, user_id, kind, q.assigned_only()).await?)
}

async fn create_attr(
    state: &AppState,
    user_id: Uuid,
    kind: AttrKind,
    payload: &AttrCreate,
) -> Result<Attr, ApiError> {
    let name = payload.name.trim();
    if name.is_empty() {
        return Err(ApiError::invalid("name", "this field may not be blank"));
    }
    let attr = repo::create(&state.db, user_id, kind, name).await?;
    info!(user_id = %user_id, id = attr.id, kind = kind.label(), "attribute created");
    Ok(attr)
}

async fn delete_attr(
    state: &AppState,
    user_id: Uuid,
    kind: AttrKind,
    id: i64,
) -> Result<StatusCode, ApiError> {
    if repo::delete(&state.db, user_id, kind, id).await? {
        info!(user_id = %user_id, id, kind = kind.label(), "attribute deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound(kind.label()))
    }
}

#[instrument(skip(state))]
pub async fn list_tags(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<AttrListQuery>,
) -> Result<Json<Vec<TagOut>>, ApiError> {
    let rows = list_attrs(&state, user_id, AttrKind::Tag, &q).await?;
    Ok(Json(rows.into_iter().map(TagOut::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<AttrCreate>,
) -> Result<(StatusCode, Json<TagOut>), ApiError> {
    let attr = create_attr(&state, user_id, AttrKind::Tag, &payload).await?;
    Ok((StatusCode::CREATED, Json(attr.into())))
}

#[instrument(skip(state))]
pub async fn delete_tag(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    delete_attr(&state, user_id, AttrKind::Tag, id).await
}

#[instrument(skip(state))]
pub async fn list_ingredients(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<AttrListQuery>,
) -> Result<Json<Vec<IngredientOut>>, ApiError> {
    let rows = list_attrs(&state, user_id, AttrKind::Ingredient, &q).await?;
    Ok(Json(rows.into_iter().map(IngredientOut::from).collect()))
}

#[instrument(skip(state, payload))]
pub async fn create_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<AttrCreate>,
) -> Result<(StatusCode, Json<IngredientOut>), ApiError> {
    let attr = create_attr(&state, user_id, AttrKind::Ingredient, &payload).await?;
    Ok((StatusCode::CREATED, Json(attr.into())))
}

#[instrument(skip(state))]
pub async fn delete_ingredient(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    delete_attr(&state, user_id, AttrKind::Ingredient, id).await
}
