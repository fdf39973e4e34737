use std::collections::HashSet;

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use bytes::Bytes;
use sqlx::types::Decimal;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::attrs::repo::{self as attrs_repo, AttrKind};
use crate::error::{ApiError, FieldErrors};
use crate::recipes::dto::{
    parse_id_csv, RecipeDetail, RecipeImageOut, RecipeListQuery, RecipePayload, RecipeSummary,
};
use crate::recipes::repo::{self, Recipe, RecipeFields};
use crate::state::AppState;
use crate::users::token::AuthUser;

/// Scalar recipe fields after validation and (for PATCH) merging with the
/// stored row.
#[derive(Debug)]
struct ResolvedFields {
    title: String,
    time_minutes: i32,
    price: Decimal,
    link: Option<String>,
}

/// Resolves the write payload against the existing row. With `partial`,
/// absent fields keep their stored values; without it, required fields must
/// be present and an absent link is cleared (replace semantics).
fn resolve_fields(
    payload: &RecipePayload,
    existing: Option<&Recipe>,
    partial: bool,
) -> Result<ResolvedFields, ApiError> {
    let stored = existing.filter(|_| partial);
    let mut errors = FieldErrors::new();

    let title = match (&payload.title, stored) {
        (Some(t), _) => {
            let t = t.trim().to_string();
            if t.is_empty() {
                errors.add("title", "this field may not be blank");
            }
            t
        }
        (None, Some(e)) => e.title.clone(),
        (None, None) => {
            errors.add("title", "this field is required");
            String::new()
        }
    };

    let time_minutes = match (payload.time_minutes, stored) {
        (Some(v), _) => {
            if v < 0 {
                errors.add("time_minutes", "ensure this value is greater than or equal to 0");
            }
            v
        }
        (None, Some(e)) => e.time_minutes,
        (None, None) => {
            errors.add("time_minutes", "this field is required");
            0
        }
    };

    let price = match (payload.price, stored) {
        (Some(p), _) => {
            if p.is_sign_negative() {
                errors.add("price", "ensure this value is greater than or equal to 0");
            }
            p
        }
        (None, Some(e)) => e.price,
        (None, None) => {
            errors.add("price", "this field is required");
            Decimal::ZERO
        }
    };

    let link = match (&payload.link, stored) {
        (Some(l), _) => {
            let l = l.trim();
            if l.is_empty() {
                None
            } else {
                Some(l.to_string())
            }
        }
        (None, Some(e)) => e.link.clone(),
        (None, None) => None,
    };

    errors.into_result()?;
    Ok(ResolvedFields {
        title,
        time_minutes,
        price,
        link,
    })
}

/// Referenced attribute ids must exist and belong to the requester.
async fn check_attr_ids(
    state: &AppState,
    user_id: Uuid,
    kind: AttrKind,
    field: &str,
    ids: &[i64],
) -> Result<(), ApiError> {
    if ids.is_empty() {
        return Ok(());
    }
    let owned: HashSet<i64> = attrs_repo::owned_ids(&state.db, user_id, kind, ids)
        .await?
        .into_iter()
        .collect();
    let unknown: Vec<String> = ids
        .iter()
        .filter(|id| !owned.contains(id))
        .map(|id| id.to_string())
        .collect();
    if unknown.is_empty() {
        Ok(())
    } else {
        Err(ApiError::invalid(
            field,
            format!("invalid {} id(s): {}", kind.label(), unknown.join(", ")),
        ))
    }
}

async fn load_detail(state: &AppState, recipe: Recipe) -> Result<RecipeDetail, ApiError> {
    let tags = attrs_repo::for_recipe(&state.db, recipe.id, AttrKind::Tag).await?;
    let ingredients = attrs_repo::for_recipe(&state.db, recipe.id, AttrKind::Ingredient).await?;
    let image = match &recipe.image_key {
        Some(key) => Some(
            state
                .storage
                .presign_get(key, state.config.storage.presign_ttl_secs)
                .await?,
        ),
        None => None,
    };
    Ok(RecipeDetail::from_parts(recipe, image, tags, ingredients))
}

#[instrument(skip(state))]
pub async fn list_recipes(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Query(q): Query<RecipeListQuery>,
) -> Result<Json<Vec<RecipeSummary>>, ApiError> {
    let tag_ids = q
        .tag
        .as_deref()
        .map(|raw| parse_id_csv("tag", raw))
        .transpose()?;
    let ingredient_ids = q
        .ingredients
        .as_deref()
        .map(|raw| parse_id_csv("ingredients", raw))
        .transpose()?;

    let recipes = repo::list_by_owner(&state.db, user_id, tag_ids, ingredient_ids).await?;
    let ids: Vec<i64> = recipes.iter().map(|r| r.id).collect();
    let mut tag_map = repo::link_ids(&state.db, &ids, AttrKind::Tag).await?;
    let mut ingredient_map = repo::link_ids(&state.db, &ids, AttrKind::Ingredient).await?;

    let items = recipes
        .into_iter()
        .map(|r| {
            let tags = tag_map.remove(&r.id).unwrap_or_default();
            let ingredients = ingredient_map.remove(&r.id).unwrap_or_default();
            RecipeSummary::from_row(r, tags, ingredients)
        })
        .collect();
    Ok(Json(items))
}

#[instrument(skip(state))]
pub async fn get_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<Json<RecipeDetail>, ApiError> {
    let recipe = repo::get_by_owner(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("recipe"))?;
    Ok(Json(load_detail(&state, recipe).await?))
}

#[instrument(skip(state, payload))]
pub async fn create_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Json(payload): Json<RecipePayload>,
) -> Result<(StatusCode, Json<RecipeDetail>), ApiError> {
    let fields = resolve_fields(&payload, None, false)?;
    let tag_ids = payload.tags.unwrap_or_default();
    let ingredient_ids = payload.ingredients.unwrap_or_default();
    check_attr_ids(&state, user_id, AttrKind::Tag, "tags", &tag_ids).await?;
    check_attr_ids(
        &state,
        user_id,
        AttrKind::Ingredient,
        "ingredients",
        &ingredient_ids,
    )
    .await?;

    let recipe = repo::create(
        &state.db,
        user_id,
        RecipeFields {
            title: &fields.title,
            time_minutes: fields.time_minutes,
            price: fields.price,
            link: fields.link.as_deref(),
        },
        &tag_ids,
        &ingredient_ids,
    )
    .await?;

    info!(user_id = %user_id, recipe_id = recipe.id, "recipe created");
    let detail = load_detail(&state, recipe).await?;
    Ok((StatusCode::CREATED, Json(detail)))
}

async fn apply_update(
    state: AppState,
    user_id: Uuid,
    id: i64,
    payload: RecipePayload,
    partial: bool,
) -> Result<Json<RecipeDetail>, ApiError> {
    let existing = repo::get_by_owner(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("recipe"))?;

    let fields = resolve_fields(&payload, Some(&existing), partial)?;

    // Full updates replace the association sets wholesale: an omitted list
    // clears them. Partial updates leave omitted lists untouched.
    let tag_ids = match (payload.tags, partial) {
        (Some(ids), _) => Some(ids),
        (None, true) => None,
        (None, false) => Some(Vec::new()),
    };
    let ingredient_ids = match (payload.ingredients, partial) {
        (Some(ids), _) => Some(ids),
        (None, true) => None,
        (None, false) => Some(Vec::new()),
    };

    if let Some(ids) = &tag_ids {
        check_attr_ids(&state, user_id, AttrKind::Tag, "tags", ids).await?;
    }
    if let Some(ids) = &ingredient_ids {
        check_attr_ids(&state, user_id, AttrKind::Ingredient, "ingredients", ids).await?;
    }

    let updated = repo::update(
        &state.db,
        user_id,
        id,
        RecipeFields {
            title: &fields.title,
            time_minutes: fields.time_minutes,
            price: fields.price,
            link: fields.link.as_deref(),
        },
        tag_ids.as_deref(),
        ingredient_ids.as_deref(),
    )
    .await?
    .ok_or(ApiError::NotFound("recipe"))?;

    info!(user_id = %user_id, recipe_id = updated.id, partial, "recipe updated");
    Ok(Json(load_detail(&state, updated).await?))
}

#[instrument(skip(state, payload))]
pub async fn full_update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RecipePayload>,
) -> Result<Json<RecipeDetail>, ApiError> {
    apply_update(state, user_id, id, payload, false).await
}

#[instrument(skip(state, payload))]
pub async fn partial_update_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    Json(payload): Json<RecipePayload>,
) -> Result<Json<RecipeDetail>, ApiError> {
    apply_update(state, user_id, id, payload, true).await
}

#[instrument(skip(state))]
pub async fn delete_recipe(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    if repo::delete(&state.db, user_id, id).await? {
        info!(user_id = %user_id, recipe_id = id, "recipe deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ApiError::NotFound("recipe"))
    }
}

/// The upload is rejected before anything is stored unless the bytes decode
/// as an image.
fn validate_image(data: &[u8]) -> Result<image::ImageFormat, ApiError> {
    let invalid = || {
        ApiError::invalid(
            "image",
            "upload a valid image; the file was either not an image or corrupted",
        )
    };
    let format = image::guess_format(data).map_err(|_| invalid())?;
    image::load_from_memory_with_format(data, format).map_err(|_| invalid())?;
    Ok(format)
}

#[instrument(skip(state, multipart))]
pub async fn upload_image(
    State(state): State<AppState>,
    AuthUser(user_id): AuthUser,
    Path(id): Path<i64>,
    mut multipart: Multipart,
) -> Result<Json<RecipeImageOut>, ApiError> {
    let recipe = repo::get_by_owner(&state.db, user_id, id)
        .await?
        .ok_or(ApiError::NotFound("recipe"))?;

    let mut data: Option<Bytes> = None;
    while let Ok(Some(field)) = multipart.next_field().await {
        if field.name() == Some("image") {
            data = Some(
                field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::invalid("image", e.to_string()))?,
            );
        }
    }
    let data = data.ok_or_else(|| ApiError::invalid("image", "no image file was submitted"))?;

    let format = validate_image(&data)?;
    let ext = format.extensions_str().first().copied().unwrap_or("bin");
    let key = format!("recipes/{}/{}-{}.{}", user_id, recipe.id, Uuid::new_v4(), ext);

    state
        .storage
        .put_object(&key, data, format.to_mime_type())
        .await?;

    if let Some(old) = &recipe.image_key {
        // Best-effort cleanup; the new image is already stored.
        if let Err(e) = state.storage.delete_object(old).await {
            warn!(error = %e, key = %old, "failed to delete replaced image");
        }
    }

    let updated = repo::set_image_key(&state.db, user_id, recipe.id, &key)
        .await?
        .ok_or(ApiError::NotFound("recipe"))?;

    let url = state
        .storage
        .presign_get(&key, state.config.storage.presign_ttl_secs)
        .await?;

    info!(user_id = %user_id, recipe_id = updated.id, %key, "image uploaded");
    Ok(Json(RecipeImageOut {
        id: updated.id,
        image: Some(url),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use time::OffsetDateTime;

    fn stored_recipe() -> Recipe {
        Recipe {
            id: 1,
            user_id: Uuid::new_v4(),
            title: "sample recipe".into(),
            time_minutes: 10,
            price: Decimal::from_str("5.00").unwrap(),
            link: Some("https://example.com/r".into()),
            image_key: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn create_requires_title_time_and_price() {
        let err = resolve_fields(&RecipePayload::default(), None, false).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn create_accepts_a_complete_payload() {
        let payload = RecipePayload {
            title: Some("ugali sukuma".into()),
            time_minutes: Some(30),
            price: Some(Decimal::from_str("5.00").unwrap()),
            ..Default::default()
        };
        let fields = resolve_fields(&payload, None, false).unwrap();
        assert_eq!(fields.title, "ugali sukuma");
        assert_eq!(fields.time_minutes, 30);
        assert_eq!(fields.price, Decimal::from_str("5.00").unwrap());
        assert_eq!(fields.link, None);
    }

    #[test]
    fn create_rejects_blank_title_and_negative_values() {
        let payload = RecipePayload {
            title: Some("   ".into()),
            time_minutes: Some(-1),
            price: Some(Decimal::from_str("-0.01").unwrap()),
            ..Default::default()
        };
        assert!(resolve_fields(&payload, None, false).is_err());
    }

    #[test]
    fn partial_update_keeps_stored_fields() {
        let stored = stored_recipe();
        let payload = RecipePayload {
            title: Some("Chicken tikka".into()),
            ..Default::default()
        };
        let fields = resolve_fields(&payload, Some(&stored), true).unwrap();
        assert_eq!(fields.title, "Chicken tikka");
        assert_eq!(fields.time_minutes, stored.time_minutes);
        assert_eq!(fields.price, stored.price);
        assert_eq!(fields.link, stored.link);
    }

    #[test]
    fn full_update_ignores_stored_fields() {
        let stored = stored_recipe();
        let payload = RecipePayload {
            title: Some("Spaghetti carbonara".into()),
            ..Default::default()
        };
        // PUT without time/price is incomplete even though the row has both.
        assert!(resolve_fields(&payload, Some(&stored), false).is_err());
    }

    #[test]
    fn full_update_clears_omitted_link() {
        let stored = stored_recipe();
        let payload = RecipePayload {
            title: Some("Spaghetti carbonara".into()),
            time_minutes: Some(25),
            price: Some(Decimal::from_str("5.00").unwrap()),
            ..Default::default()
        };
        let fields = resolve_fields(&payload, Some(&stored), false).unwrap();
        assert_eq!(fields.link, None);
    }

    #[test]
    fn association_replacement_rules() {
        // (payload value, partial) -> what the repo layer is told
        let cases = [
            (Some(vec![1, 2]), true, Some(vec![1, 2])),
            (Some(vec![]), true, Some(vec![])),
            (None, true, None),
            (None, false, Some(vec![])),
        ];
        for (payload_ids, partial, expected) in cases {
            let resolved = match (payload_ids, partial) {
                (Some(ids), _) => Some(ids),
                (None, true) => None,
                (None, false) => Some(Vec::new()),
            };
            assert_eq!(resolved, expected);
        }
    }

    #[test]
    fn valid_png_bytes_pass_validation() {
        let img = image::RgbaImage::new(4, 4);
        let mut buf = Vec::new();
        img.write_to(&mut std::io::Cursor::new(&mut buf), image::ImageFormat::Png)
            .unwrap();
        let format = validate_image(&buf).unwrap();
        assert_eq!(format, image::ImageFormat::Png);
    }

    #[test]
    fn non_image_bytes_are_rejected() {
        let err = validate_image(b"notimage").unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn truncated_png_is_rejected() {
        // Valid signature, no image data: sniffing passes, decoding must not.
        let bytes = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a, 0, 0];
        assert!(validate_image(&bytes).is_err());
    }
}
