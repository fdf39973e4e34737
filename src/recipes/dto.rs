use serde::{Deserialize, Serialize};
use sqlx::types::Decimal;

use crate::attrs::dto::{IngredientOut, TagOut};
use crate::attrs::repo::Attr;
use crate::error::ApiError;
use crate::recipes::repo::Recipe;

/// List/write shape: related entities as bare ids.
#[derive(Debug, Serialize)]
pub struct RecipeSummary {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub tags: Vec<i64>,
    pub ingredients: Vec<i64>,
}

/// Detail shape: related entities nested, image as a presigned URL.
#[derive(Debug, Serialize)]
pub struct RecipeDetail {
    pub id: i64,
    pub title: String,
    pub time_minutes: i32,
    pub price: Decimal,
    pub link: Option<String>,
    pub image: Option<String>,
    pub tags: Vec<TagOut>,
    pub ingredients: Vec<IngredientOut>,
}

/// Write payload for both create and update. Field presence is interpreted
/// by the handler: PUT requires title/time_minutes/price and clears omitted
/// association lists, PATCH merges what is present.
#[derive(Debug, Default, Deserialize)]
pub struct RecipePayload {
    pub title: Option<String>,
    pub time_minutes: Option<i32>,
    pub price: Option<Decimal>,
    pub link: Option<String>,
    pub tags: Option<Vec<i64>>,
    pub ingredients: Option<Vec<i64>>,
}

#[derive(Debug, Deserialize)]
pub struct RecipeListQuery {
    pub tag: Option<String>,
    pub ingredients: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct RecipeImageOut {
    pub id: i64,
    pub image: Option<String>,
}

// Both wire shapes pull the same scalar columns out of the row; only the
// related-entity representation differs.
struct CoreFields {
    id: i64,
    title: String,
    time_minutes: i32,
    price: Decimal,
    link: Option<String>,
}

impl From<Recipe> for CoreFields {
    fn from(r: Recipe) -> Self {
        Self {
            id: r.id,
            title: r.title,
            time_minutes: r.time_minutes,
            price: r.price,
            link: r.link,
        }
    }
}

impl RecipeSummary {
    pub fn from_row(recipe: Recipe, tags: Vec<i64>, ingredients: Vec<i64>) -> Self {
        let core = CoreFields::from(recipe);
        Self {
            id: core.id,
            title: core.title,
            time_minutes: core.time_minutes,
            price: core.price,
            link: core.link,
            tags,
            ingredients,
        }
    }
}

impl RecipeDetail {
    pub fn from_parts(
        recipe: Recipe,
        image: Option<String>,
        tags: Vec<Attr>,
        ingredients: Vec<Attr>,
    ) -> Self {
        let core = CoreFields::from(recipe);
        Self {
            id: core.id,
            title: core.title,
            time_minutes: core.time_minutes,
            price: core.price,
            link: core.link,
            image,
            tags: tags.into_iter().map(TagOut::from).collect(),
            ingredients: ingredients.into_iter().map(IngredientOut::from).collect(),
        }
    }
}

/// Parses a `1,2,3` style query value; any non-integer token is a 400 on
/// the named field.
pub fn parse_id_csv(field: &str, raw: &str) -> Result<Vec<i64>, ApiError> {
    let mut ids = Vec::new();
    for token in raw.split(',') {
        let token = token.trim();
        match token.parse::<i64>() {
            Ok(id) => ids.push(id),
            Err(_) => {
                return Err(ApiError::invalid(
                    field,
                    format!("expected a comma-separated list of ids, got {token:?}"),
                ))
            }
        }
    }
    Ok(ids)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;
    use time::OffsetDateTime;
    use uuid::Uuid;

    fn sample_recipe() -> Recipe {
        Recipe {
            id: 42,
            user_id: Uuid::new_v4(),
            title: "ugali sukuma".into(),
            time_minutes: 30,
            price: Decimal::from_str("5.00").unwrap(),
            link: None,
            image_key: None,
            created_at: OffsetDateTime::UNIX_EPOCH,
        }
    }

    #[test]
    fn csv_accepts_integer_lists() {
        assert_eq!(parse_id_csv("tag", "1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_id_csv("tag", " 7 , 9 ").unwrap(), vec![7, 9]);
        assert_eq!(parse_id_csv("tag", "5").unwrap(), vec![5]);
    }

    #[test]
    fn csv_rejects_non_integer_tokens() {
        assert!(parse_id_csv("tag", "1,a").is_err());
        assert!(parse_id_csv("tag", "").is_err());
        assert!(parse_id_csv("ingredients", "1,,2").is_err());
        assert!(parse_id_csv("ingredients", "1.5").is_err());
    }

    #[test]
    fn summary_uses_bare_ids() {
        let summary = RecipeSummary::from_row(sample_recipe(), vec![1, 2], vec![3]);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["tags"], serde_json::json!([1, 2]));
        assert_eq!(json["ingredients"], serde_json::json!([3]));
        assert_eq!(json["title"], "ugali sukuma");
        assert_eq!(json["time_minutes"], 30);
        assert_eq!(json["price"], "5.00");
        assert!(json.get("image").is_none());
    }

    #[test]
    fn detail_nests_related_objects() {
        let user_id = Uuid::new_v4();
        let tags = vec![Attr {
            id: 1,
            user_id,
            name: "vegan".into(),
        }];
        let ingredients = vec![Attr {
            id: 3,
            user_id,
            name: "kale".into(),
        }];
        let detail = RecipeDetail::from_parts(
            sample_recipe(),
            Some("https://fake.local/recipes/x.png".into()),
            tags,
            ingredients,
        );
        let json = serde_json::to_value(&detail).unwrap();
        assert_eq!(json["tags"][0]["name"], "vegan");
        assert_eq!(json["ingredients"][0]["name"], "kale");
        assert_eq!(json["ingredients"][0]["user"], serde_json::json!(user_id));
        assert_eq!(json["image"], "https://fake.local/recipes/x.png");
    }

    #[test]
    fn payload_accepts_numeric_price() {
        let payload: RecipePayload =
            serde_json::from_str(r#"{"title":"t","time_minutes":30,"price":5.00}"#).unwrap();
        assert_eq!(payload.price, Some(Decimal::from_str("5").unwrap()));
        assert!(payload.tags.is_none());
    }
}
