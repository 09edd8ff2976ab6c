use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;

use crate::error::Error;

/// API错误类型
pub struct AppError(pub anyhow::Error);

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, stage) = match self.0.downcast_ref::<Error>() {
            Some(err @ Error::InvalidInput(_)) => (StatusCode::BAD_REQUEST, err.stage()),
            Some(err @ Error::NotFound(_)) => (StatusCode::NOT_FOUND, err.stage()),
            Some(err) => (StatusCode::INTERNAL_SERVER_ERROR, err.stage()),
            None => (StatusCode::INTERNAL_SERVER_ERROR, "internal"),
        };
        (status, Json(json!({ "error": stage, "message": self.0.to_string() }))).into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self(err.into())
    }
}

pub type Result<T, E = AppError> = std::result::Result<T, E>;
