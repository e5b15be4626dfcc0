use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

/// Errors raised by the admission engine and its control surface.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum AdmissionError {
    /// The endpoint is disabled, flagged off or does not exist. Callers
    /// cannot tell these apart.
    #[error("Not Found")]
    NotFound,

    /// A pattern supplied to a control call failed to compile.
    #[error("Invalid pattern '{pattern}': {source}")]
    InvalidPattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },

    /// A key supplied to a control call is unusable.
    #[error("Invalid endpoint key '{0}'")]
    InvalidKey(String),

    /// The caller failed the write authorization check.
    #[error("Unauthorized")]
    Unauthorized,
}

/// Result type alias for admission operations
pub type AdmissionResult<T> = Result<T, AdmissionError>;

impl IntoResponse for AdmissionError {
    fn into_response(self) -> Response {
        let status = match &self {
            AdmissionError::NotFound => StatusCode::NOT_FOUND,
            AdmissionError::InvalidPattern { .. } | AdmissionError::InvalidKey(_) => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            AdmissionError::Unauthorized => StatusCode::UNAUTHORIZED,
        };
        (status, Json(json!({ "detail": self.to_string() }))).into_response()
    }
}
