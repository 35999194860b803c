//! Translation of failures into client-facing responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use forecast_core::{FetchError, ForecastError, UpstreamError, ValidationError};
use serde_json::json;
use thiserror::Error;

/// Everything a handler can fail with, tagged by kind.
#[derive(Debug, Error)]
pub enum AppError {
    /// Inbound request parameters did not validate.
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error("internal error: {0}")]
    Internal(#[source] FetchError),
}

impl From<ForecastError> for AppError {
    fn from(err: ForecastError) -> Self {
        match err {
            ForecastError::Upstream(err) => AppError::Upstream(err),
            ForecastError::Internal(err) => AppError::Internal(err),
        }
    }
}

impl AppError {
    fn kind(&self) -> &'static str {
        match self {
            AppError::Validation(_) => "validation",
            AppError::Upstream(_) => "upstream",
            AppError::Internal(_) => "internal",
        }
    }

    fn status_and_body(&self) -> (StatusCode, serde_json::Value) {
        match self {
            AppError::Validation(err) => {
                let details: Vec<_> =
                    err.messages().into_iter().map(|message| json!({ "message": message })).collect();
                (
                    StatusCode::UNPROCESSABLE_ENTITY,
                    json!({ "error": "Validation failed", "details": details }),
                )
            }
            AppError::Upstream(err) => {
                let status =
                    StatusCode::from_u16(err.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                let label = match status {
                    StatusCode::REQUEST_TIMEOUT => "Request timed out",
                    StatusCode::INTERNAL_SERVER_ERROR => "Something went wrong",
                    _ => "Weather Service Error",
                };
                (
                    status,
                    json!({
                        "error": label,
                        "message": err.message,
                        "coordinates": err.coordinates,
                        "operation": err.operation,
                    }),
                )
            }
            AppError::Internal(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, json!({ "error": "Internal Server Error" }))
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        tracing::error!(kind = self.kind(), status = status.as_u16(), error = %self, "request failed");
        (status, Json(body)).into_response()
    }
}
