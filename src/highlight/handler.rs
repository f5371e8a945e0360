use std::future::Future;

use axum::{
    extract::{Path, State},
    response::Response,
};

use super::HighlightSetManager;
use crate::error::HighlightError;
use crate::handler::AppState;
use crate::{not_found, server_error, success, unpack_error};

// The transaction runs on its own task so a dropped request cannot abandon it
// between BEGIN and COMMIT.
async fn detached<T, F, Fut>(manager: &HighlightSetManager, op: F) -> Result<T, HighlightError>
where
    T: Send + 'static,
    F: FnOnce(HighlightSetManager) -> Fut,
    Fut: Future<Output = Result<T, HighlightError>> + Send + 'static,
{
    match tokio::spawn(op(manager.clone())).await {
        Ok(result) => result,
        Err(e) => Err(HighlightError::OperationFailed(e.into())),
    }
}

fn failure(action: &str, err: HighlightError) -> Response {
    match err {
        HighlightError::NotFound(id) => {
            tracing::info!(product_id = id, "cannot {} unknown product", action);
            not_found("product not found")
        }
        HighlightError::OperationFailed(_) => {
            tracing::error!("failed to {} product: {}", action, unpack_error(&err));
            server_error(&format!("product could not be {}ed", action))
        }
    }
}

pub async fn highlight_product(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match detached(&state.highlights, move |m| async move { m.highlight(id).await }).await {
        Ok(outcome) => success("product highlighted successfully", outcome),
        Err(e) => failure("highlight", e),
    }
}

pub async fn unhighlight_product(State(state): State<AppState>, Path(id): Path<i64>) -> Response {
    match detached(&state.highlights, move |m| async move { m.unhighlight(id).await }).await {
        Ok(product) => success("product unhighlighted successfully", product),
        Err(e) => failure("unhighlight", e),
    }
}

pub async fn list_highlighted(State(state): State<AppState>) -> Response {
    match state.highlights.highlighted().await {
        Ok(products) => success("got highlighted products", products),
        Err(e) => {
            tracing::error!("failed to list highlighted products: {}", unpack_error(&e));
            server_error("failed to get highlighted products")
        }
    }
}
