use axum::{
    Router,
    routing::{get, patch},
};

use super::handler;
use crate::handler::AppState;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/products/highlighted", get(handler::list_highlighted))
        .route("/products/:id/highlight", patch(handler::highlight_product))
        .route("/products/:id/unhighlight", patch(handler::unhighlight_product))
}
