use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub order: Option<i64>,
    pub availability: bool,
    pub is_highlight: bool,
    pub restaurant_id: i64,
    pub product_category_id: Option<i64>,
    pub created_at: String,
    pub updated_at: String,
    pub product_category: Option<ProductCategory>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Restaurant {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductCategory {
    pub id: i64,
    pub name: String,
}

/// `GET /restaurants/:id`: the restaurant fields plus its menu.
#[derive(Debug, Clone, Serialize)]
pub struct RestaurantDetail {
    #[serde(flatten)]
    pub restaurant: Restaurant,
    pub products: Vec<Product>,
}

/// Product fields accepted on creation. `isHighlight` is not one of them, it
/// only changes through [`crate::highlight::HighlightSetManager`].
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateProduct {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub image: Option<String>,
    pub order: Option<i64>,
    #[serde(default = "default_availability")]
    pub availability: bool,
    pub restaurant_id: i64,
    pub product_category_id: Option<i64>,
}

fn default_availability() -> bool {
    true
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateProduct {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub image: Option<String>,
    pub order: Option<i64>,
    pub availability: Option<bool>,
    pub product_category_id: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CreateRestaurant {
    pub name: String,
    pub description: Option<String>,
    pub address: Option<String>,
}
