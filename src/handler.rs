use std::sync::Arc;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use tracing::info;

use crate::api::APIResponse;
use crate::db::Database;
use crate::highlight::HighlightSetManager;
use crate::model::{CreateProduct, CreateRestaurant, UpdateProduct};
use crate::{bad_request, created, not_found, server_error, success};

#[derive(Clone)]
pub struct AppState {
    pub db: Arc<Database>,
    pub highlights: HighlightSetManager,
}

impl AppState {
    pub fn new(db: Arc<Database>, highlight_limit: usize) -> Self {
        let highlights = HighlightSetManager::new(db.clone(), highlight_limit);
        AppState { db, highlights }
    }
}

pub async fn healthcheck() -> impl IntoResponse {
    info!("got healthcheck request");
    Json(APIResponse::new_from_msg("ok"))
}

pub async fn create_restaurant(
    State(state): State<AppState>,
    Json(payload): Json<CreateRestaurant>,
) -> Response {
    if let Err(e) = payload.validate() {
        return bad_request(&e.to_string());
    }

    match state.db.create_restaurant(&payload).await {
        Ok(restaurant) => {
            info!(restaurant_id = restaurant.id, "created restaurant");
            created("created restaurant", restaurant)
        }
        Err(e) => {
            tracing::error!("failed to create restaurant. db_error: {:#}", e);
            server_error("failed to create restaurant")
        }
    }
}

pub async fn list_restaurants(State(state): State<AppState>) -> Response {
    match state.db.list_restaurants().await {
        Ok(restaurants) => success("got restaurants", restaurants),
        Err(e) => {
            tracing::error!("failed to list restaurants. db_error: {:#}", e);
            server_error("failed to list restaurants")
        }
    }
}

pub async fn get_restaurant(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_restaurant_detail(id).await {
        Ok(Some(detail)) => success("got restaurant", detail),
        Ok(None) => not_found("restaurant not found"),
        Err(e) => {
            tracing::error!("failed to get restaurant {}. db_error: {:#}", id, e);
            server_error("failed to get restaurant")
        }
    }
}

pub async fn list_restaurant_products(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_restaurant(id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("restaurant not found"),
        Err(e) => {
            tracing::error!("failed to get restaurant {}. db_error: {:#}", id, e);
            return server_error("failed to get products");
        }
    }

    match state.db.list_products_by_restaurant(id).await {
        Ok(products) => success("got products", products),
        Err(e) => {
            tracing::error!("failed to list products of restaurant {}. db_error: {:#}", id, e);
            server_error("failed to get products")
        }
    }
}

pub async fn list_product_categories(State(state): State<AppState>) -> Response {
    match state.db.list_product_categories().await {
        Ok(categories) => success("got product categories", categories),
        Err(e) => {
            tracing::error!("failed to list product categories. db_error: {:#}", e);
            server_error("failed to get product categories")
        }
    }
}

/// Error response when `category_id` is set but unknown.
async fn reject_unknown_category(state: &AppState, category_id: Option<i64>, action: &str) -> Option<Response> {
    let category_id = category_id?;

    match state.db.get_product_category(category_id).await {
        Ok(Some(_)) => None,
        Ok(None) => Some(not_found("product category not found")),
        Err(e) => {
            tracing::error!("failed to get product category {}. db_error: {:#}", category_id, e);
            Some(server_error(&format!("failed to {} product", action)))
        }
    }
}

pub async fn create_product(State(state): State<AppState>, Json(payload): Json<CreateProduct>) -> Response {
    if let Err(e) = payload.validate() {
        return bad_request(&e.to_string());
    }

    match state.db.get_restaurant(payload.restaurant_id).await {
        Ok(Some(_)) => {}
        Ok(None) => return not_found("restaurant not found"),
        Err(e) => {
            tracing::error!("failed to get restaurant. db_error: {:#}", e);
            return server_error("failed to create product");
        }
    }

    if let Some(response) = reject_unknown_category(&state, payload.product_category_id, "create").await {
        return response;
    }

    match state.db.create_product(&payload).await {
        Ok(product) => {
            info!(product_id = product.id, restaurant_id = product.restaurant_id, "created product");
            created("created product", product)
        }
        Err(e) => {
            tracing::error!("failed to create product. db_error: {:#}", e);
            server_error("failed to create product")
        }
    }
}

pub async fn get_product(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.get_product(id).await {
        Ok(Some(product)) => success("got product", product),
        Ok(None) => not_found("product not found"),
        Err(e) => {
            tracing::error!("failed to get product {}. db_error: {:#}", id, e);
            server_error("failed to get product")
        }
    }
}

pub async fn update_product(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateProduct>,
) -> Response {
    if let Err(e) = payload.validate() {
        return bad_request(&e.to_string());
    }

    if let Some(response) = reject_unknown_category(&state, payload.product_category_id, "update").await {
        return response;
    }

    match state.db.update_product(id, &payload).await {
        Ok(Some(product)) => success("updated product", product),
        Ok(None) => not_found("product not found"),
        Err(e) => {
            tracing::error!("failed to update product {}. db_error: {:#}", id, e);
            server_error("failed to update product")
        }
    }
}

pub async fn delete_product(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match state.db.delete_product(id).await {
        Ok(true) => {
            info!(product_id = id, "deleted product");
            (StatusCode::NO_CONTENT, ()).into_response()
        }
        Ok(false) => not_found("product not found"),
        Err(e) => {
            tracing::error!("failed to delete product {}. db_error: {:#}", id, e);
            server_error("failed to delete product")
        }
    }
}
