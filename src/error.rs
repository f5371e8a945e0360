use thiserror::Error;

#[derive(Debug, Error)]
pub enum HighlightError {
    #[error("NotFound: product {0}")]
    NotFound(i64),

    #[error("OperationFailed: {0}")]
    OperationFailed(#[source] anyhow::Error),
}

impl From<anyhow::Error> for HighlightError {
    fn from(error: anyhow::Error) -> Self {
        HighlightError::OperationFailed(error)
    }
}

impl From<libsql::Error> for HighlightError {
    fn from(error: libsql::Error) -> Self {
        HighlightError::OperationFailed(error.into())
    }
}

#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("ValidationError: {0}")]
    ValidationError(String),
}
