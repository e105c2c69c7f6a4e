use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Category, MenuItem};

/// Full replacement payload used by both create and update.
#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct MenuItemRequest {
    pub name: String,
    pub description: String,
    pub price: i64,
    pub category_id: Uuid,
    #[serde(default)]
    pub spice_level: i32,
    #[serde(default)]
    pub is_vegetarian: bool,
    #[serde(default)]
    pub is_vegan: bool,
    #[serde(default)]
    pub ingredients: Vec<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default = "default_available")]
    pub is_available: bool,
}

fn default_available() -> bool {
    true
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CategoryRequest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub display_order: i32,
    #[serde(default = "default_available")]
    pub is_active: bool,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct MenuItemList {
    #[schema(value_type = Vec<MenuItem>)]
    pub items: Vec<MenuItem>,
}

#[derive(Debug, Serialize, ToSchema)]
#[serde(transparent)]
pub struct CategoryList {
    #[schema(value_type = Vec<Category>)]
    pub items: Vec<Category>,
}
