use std::collections::HashMap;

use anyhow::Context;
use sqlx::types::Decimal;
use sqlx::{FromRow, PgPool, Postgres, Transaction};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::attrs::repo::AttrKind;

#[derive(Debug, Clone, FromRow)]
pub struct Recipe {
    pub id: i64,
    pub user_id: Uuid,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image_key: Option<String>,
    pub created_at: OffsetDateTime,
}

/// Mutable columns of a recipe row, as resolved by the handler layer.
#[derive(Debug)]
pub struct RecipeFields<'a> {
    pub title: &'a str,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<&'a str>,
}

const RECIPE_COLUMNS: &str = "id, user_id, title, time_minutes, price, link, image_key, created_at";

/// Recipes owned by `user_id`, newest first. Each filter keeps recipes
/// linked to at least one of the given attribute ids; both filters compose
/// with AND. EXISTS keeps rows distinct however many links match.
pub async fn list_by_owner(
    db: &PgPool,
    user_id: Uuid,
    tag_ids: Option<Vec<i64>>,
    ingredient_ids: Option<Vec<i64>>,
) -> anyhow::Result<Vec<Recipe>> {
    let rows = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS}
         FROM recipes r
         WHERE r.user_id = $1
           AND ($2::bigint[] IS NULL OR EXISTS (
                 SELECT 1 FROM recipe_tags rt
                 WHERE rt.recipe_id = r.id AND rt.tag_id = ANY($2)))
           AND ($3::bigint[] IS NULL OR EXISTS (
                 SELECT 1 FROM recipe_ingredients ri
                 WHERE ri.recipe_id = r.id AND ri.ingredient_id = ANY($3)))
         ORDER BY r.id DESC"
    ))
    .bind(user_id)
    .bind(tag_ids)
    .bind(ingredient_ids)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

/// Ownership is part of the lookup; a foreign id reads as absent.
pub async fn get_by_owner(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: i64,
) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, Recipe>(&format!(
        "SELECT {RECIPE_COLUMNS} FROM recipes WHERE id = $1 AND user_id = $2"
    ))
    .bind(recipe_id)
    .bind(user_id)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    fields: RecipeFields<'_>,
    tag_ids: &[i64],
    ingredient_ids: &[i64],
) -> anyhow::Result<Recipe> {
    let mut tx = db.begin().await.context("begin tx")?;
    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        "INSERT INTO recipes (user_id, title, time_minutes, price, link)
         VALUES ($1, $2, $3, $4, $5)
         RETURNING {RECIPE_COLUMNS}"
    ))
    .bind(user_id)
    .bind(fields.title)
    .bind(fields.time_minutes)
    .bind(fields.price)
    .bind(fields.link)
    .fetch_one(&mut *tx)
    .await?;

    set_links(&mut tx, recipe.id, AttrKind::Tag, tag_ids).await?;
    set_links(&mut tx, recipe.id, AttrKind::Ingredient, ingredient_ids).await?;
    tx.commit().await.context("commit tx")?;
    Ok(recipe)
}

/// Updates the row and, where a link list is given, replaces that
/// association set; `None` leaves the links as they are. Everything happens
/// in one transaction so a failed link write leaves no partial recipe.
pub async fn update(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: i64,
    fields: RecipeFields<'_>,
    tag_ids: Option<&[i64]>,
    ingredient_ids: Option<&[i64]>,
) -> anyhow::Result<Option<Recipe>> {
    let mut tx = db.begin().await.context("begin tx")?;
    let recipe = sqlx::query_as::<_, Recipe>(&format!(
        "UPDATE recipes SET title = $3, time_minutes = $4, price = $5, link = $6
         WHERE id = $1 AND user_id = $2
         RETURNING {RECIPE_COLUMNS}"
    ))
    .bind(recipe_id)
    .bind(user_id)
    .bind(fields.title)
    .bind(fields.time_minutes)
    .bind(fields.price)
    .bind(fields.link)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(recipe) = recipe else {
        return Ok(None);
    };

    if let Some(ids) = tag_ids {
        set_links(&mut tx, recipe.id, AttrKind::Tag, ids).await?;
    }
    if let Some(ids) = ingredient_ids {
        set_links(&mut tx, recipe.id, AttrKind::Ingredient, ids).await?;
    }
    tx.commit().await.context("commit tx")?;
    Ok(Some(recipe))
}

pub async fn delete(db: &PgPool, user_id: Uuid, recipe_id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query("DELETE FROM recipes WHERE id = $1 AND user_id = $2")
        .bind(recipe_id)
        .bind(user_id)
        .execute(db)
        .await?;
    Ok(result.rows_affected() > 0)
}

pub async fn set_image_key(
    db: &PgPool,
    user_id: Uuid,
    recipe_id: i64,
    key: &str,
) -> anyhow::Result<Option<Recipe>> {
    let row = sqlx::query_as::<_, Recipe>(&format!(
        "UPDATE recipes SET image_key = $3 WHERE id = $1 AND user_id = $2
         RETURNING {RECIPE_COLUMNS}"
    ))
    .bind(recipe_id)
    .bind(user_id)
    .bind(key)
    .fetch_optional(db)
    .await?;
    Ok(row)
}

/// Attribute ids per recipe for a batch of recipes, one query per kind.
pub async fn link_ids(
    db: &PgPool,
    recipe_ids: &[i64],
    kind: AttrKind,
) -> anyhow::Result<HashMap<i64, Vec<i64>>> {
    if recipe_ids.is_empty() {
        return Ok(HashMap::new());
    }
    let rows: Vec<(i64, i64)> = sqlx::query_as(&format!(
        "SELECT recipe_id, {col} FROM {link}
         WHERE recipe_id = ANY($1)
         ORDER BY {col}",
        link = kind.link_table(),
        col = kind.link_column()
    ))
    .bind(recipe_ids)
    .fetch_all(db)
    .await?;

    let mut map: HashMap<i64, Vec<i64>> = HashMap::new();
    for (recipe_id, attr_id) in rows {
        map.entry(recipe_id).or_default().push(attr_id);
    }
    Ok(map)
}

/// Replace a recipe's association set with exactly `ids`.
async fn set_links(
    tx: &mut Transaction<'_, Postgres>,
    recipe_id: i64,
    kind: AttrKind,
    ids: &[i64],
) -> anyhow::Result<()> {
    sqlx::query(&format!(
        "DELETE FROM {link} WHERE recipe_id = $1",
        link = kind.link_table()
    ))
    .bind(recipe_id)
    .execute(&mut **tx)
    .await?;

    if !ids.is_empty() {
        sqlx::query(&format!(
            "INSERT INTO {link} (recipe_id, {col})
             SELECT $1, unnest($2::bigint[])
             ON CONFLICT DO NOTHING",
            link = kind.link_table(),
            col = kind.link_column()
        ))
        .bind(recipe_id)
        .bind(ids)
        .execute(&mut **tx)
        .await?;
    }
    Ok(())
}
