//! Maps [`AppError`] onto HTTP status codes and a JSON body.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domains::{AppError, FieldError};
use serde::Serialize;
use tracing::error;

#[derive(Debug)]
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    fields: Vec<FieldError>,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AppError::NotFound(..) => StatusCode::NOT_FOUND,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Conflict(_) => StatusCode::CONFLICT,
            AppError::RateLimitExceeded(_) => StatusCode::TOO_MANY_REQUESTS,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match self.0 {
            AppError::Validation(errors) => ErrorBody {
                error: "The given data was invalid.".to_string(),
                fields: errors.errors,
            },
            AppError::Internal(detail) => {
                error!(%detail, "request failed");
                ErrorBody {
                    error: "Internal server error".to_string(),
                    fields: Vec::new(),
                }
            }
            AppError::Unauthorized(message)
            | AppError::Conflict(message)
            | AppError::RateLimitExceeded(message)
            | AppError::Upstream(message) => ErrorBody {
                error: message,
                fields: Vec::new(),
            },
            not_found @ AppError::NotFound(..) => ErrorBody {
                error: not_found.to_string(),
                fields: Vec::new(),
            },
        };
        (status, Json(body)).into_response()
    }
}
