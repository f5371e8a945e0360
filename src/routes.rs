use axum::{
    Router,
    http::Method,
    routing::{get, post},
};
use tower_http::cors::{Any, CorsLayer};

use crate::handler::{self, AppState};
use crate::highlight;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handler::healthcheck))
        .route("/restaurants", get(handler::list_restaurants).post(handler::create_restaurant))
        .route("/restaurants/:id", get(handler::get_restaurant))
        .route("/restaurants/:id/products", get(handler::list_restaurant_products))
        .route("/productCategories", get(handler::list_product_categories))
        .route("/products", post(handler::create_product))
        .route(
            "/products/:id",
            get(handler::get_product)
                .put(handler::update_product)
                .delete(handler::delete_product),
        )
        .merge(highlight::routes())
}

pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::PATCH, Method::DELETE])
        .allow_headers(Any);

    routes().layer(cors).with_state(state)
}
