use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Tags and ingredients share one shape and one set of queries; the kind
/// only selects the tables involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttrKind {
    Tag,
    Ingredient,
}

impl AttrKind {
    pub fn table(self) -> &'static str {
        match self {
            AttrKind::Tag => "tags",
            AttrKind::Ingredient => "ingredients",
        }
    }

    pub fn link_table(self) -> &'static str {
        match self {
            AttrKind::Tag => "recipe_tags",
            AttrKind::Ingredient => "recipe_ingredients",
        }
    }

    pub fn link_column(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag_id",
            AttrKind::Ingredient => "ingredient_id",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            AttrKind::Tag => "tag",
            AttrKind::Ingredient => "ingredient",
        }
    }
}

#[derive(Debug, Clone, FromRow)]
pub struct Attr {
    pub id: i64,
    pub user_id: Uuid,
    pub name: String,
}

/// Rows owned by `user_id`. With `assigned_only`, restricted to rows linked
/// to at least one of the same user's recipes; EXISTS keeps the result
/// distinct even when an attribute is on several recipes.
pub async fn list(
    db: &PgPool,
    user_id: Uuid,
    kind: AttrKind,
    assigned_only: bool,
) -> anyhow::Result<Vec<Attr>> {
    let mut sql = format!(
        "SELECT a.id, a.user_id, a.name FROM {table} a WHERE a.user_id = $1",
        table = kind.table()
    );
    if assigned_only {
        sql.push_str(&format!(
            " AND EXISTS (SELECT 1 FROM {link} l
                 JOIN recipes r ON r.id = l.recipe_id
                 WHERE l.{col} = a.id AND r.user_id = $1)",
            link = kind.link_table(),
            col = kind.link_column()
        ));
    }
    // Reverse-alphabetical ordering is the documented contract.
    sql.push_str(" ORDER BY a.name DESC, a.id DESC");

    let rows = sqlx::query_as::<_, Attr>(&sql).bind(user_id).fetch_all(db).await?;
    Ok(rows)
}

pub async fn create(
    db: &PgPool,
    user_id: Uuid,
    kind: AttrKind,
    name: &str,
) -> anyhow::Result<Attr> {
    let row = sqlx::query_as::<_, Attr>(&format!(
        "INSERT INTO {table} (user_id, name) VALUES ($1, $2)
         RETURNING id, user_id, name",
        table = kind.table()
    ))
    .bind(user_id)
    .bind(name)
    .fetch_one(db)
    .await?;
    Ok(row)
}

/// Returns false when the row does not exist or belongs to someone else.
pub async fn delete(db: &PgPool, user_id: Uuid, kind: AttrKind, id: i64) -> anyhow::Result<bool> {
    let result = sqlx::query(&format!(
        "DELETE FROM {table} WHERE id = $1 AND user_id = $2",
        table = kind.table()
    ))
    .bind(id)
    .bind(user_id)
    .execute(db)
    .await?;
    Ok(result.rows_affected() > 0)
}

/// Of the given ids, the subset that exists and is owned by `user_id`.
pub async fn owned_ids(
    db: &PgPool,
    user_id: Uuid,
    kind: AttrKind,
    ids: &[i64],
) -> anyhow::Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(&format!(
        "SELECT id FROM {table} WHERE id = ANY($1) AND user_id = $2",
        table = kind.table()
    ))
    .bind(ids)
    .bind(user_id)
    .fetch_all(db)
    .await?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Attribute rows linked to one recipe, for the nested detail view.
pub async fn for_recipe(db: &PgPool, recipe_id: i64, kind: AttrKind) -> anyhow::Result<Vec<Attr>> {
    let rows = sqlx::query_as::<_, Attr>(&format!(
        "SELECT a.id, a.user_id, a.name
         FROM {table} a
         JOIN {link} l ON l.{col} = a.id
         WHERE l.recipe_id = $1
         ORDER BY a.id",
        table = kind.table(),
        link = kind.link_table(),
        col = kind.link_column()
    ))
    .bind(recipe_id)
    .fetch_all(db)
    .await?;
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_map_to_disjoint_tables() {
        assert_eq!(AttrKind::Tag.table(), "tags");
        assert_eq!(AttrKind::Tag.link_table(), "recipe_tags");
        assert_eq!(AttrKind::Tag.link_column(), "tag_id");
        assert_eq!(AttrKind::Ingredient.table(), "ingredients");
        assert_eq!(AttrKind::Ingredient.link_table(), "recipe_ingredients");
        assert_eq!(AttrKind::Ingredient.link_column(), "ingredient_id");
        assert_ne!(AttrKind::Tag.label(), AttrKind::Ingredient.label());
    }
}
