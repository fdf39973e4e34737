use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attrs::repo::Attr;

#[derive(Debug, Serialize)]
pub struct TagOut {
    pub id: i64,
    pub name: String,
}

/// Ingredients additionally expose their owner id on the wire.
#[derive(Debug, Serialize)]
pub struct IngredientOut {
    pub id: i64,
    pub name: String,
    pub user: Uuid,
}

impl From<Attr> for TagOut {
    fn from(a: Attr) -> Self {
        Self {
            id: a.id,
            name: a.name,
        }
    }
}

impl From<Attr> for IngredientOut {
    fn from(a: Attr) -> Self {
        Self {
            id: a.id,
            name: a.name,
            user: a.user_id,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct AttrCreate {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct AttrListQuery {
    #[serde(default)]
    pub assigned_only: Option<u8>,
}

impl AttrListQuery {
    pub fn assigned_only(&self) -> bool {
        matches!(self.assigned_only, Some(v) if v != 0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tag_shape_is_id_and_name() {
        let out = TagOut {
            id: 7,
            name: "vegan".into(),
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json, serde_json::json!({"id": 7, "name": "vegan"}));
    }

    #[test]
    fn ingredient_shape_includes_owner() {
        let user = Uuid::new_v4();
        let out = IngredientOut {
            id: 3,
            name: "garlic".into(),
            user,
        };
        let json = serde_json::to_value(&out).unwrap();
        assert_eq!(json["user"], serde_json::json!(user));
        assert_eq!(json["name"], "garlic");
    }

    #[test]
    fn assigned_only_flag_parsing() {
        let q: AttrListQuery = serde_json::from_str("{}").unwrap();
        assert!(!q.assigned_only());
        let q = AttrListQuery {
            assigned_only: Some(0),
        };
        assert!(!q.assigned_only());
        let q = AttrListQuery {
            assigned_only: Some(1),
        };
        assert!(q.assigned_only());
    }
}
