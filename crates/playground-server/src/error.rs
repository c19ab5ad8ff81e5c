use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use playground_core::error::AppError;

use crate::dto::ErrorResponse;

/// Wrapper so we can implement `IntoResponse` for `AppError`.
pub struct ApiError(pub AppError);

impl From<AppError> for ApiError {
    fn from(err: AppError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        status_for(&self.0)
    }
}

/// HTTP status for an application error.
pub fn status_for(err: &AppError) -> StatusCode {
    match err {
        AppError::ValidationError(_)
        | AppError::SqlSyntaxError(_)
        | AppError::ForbiddenStatement(_)
        | AppError::ParameterError(_)
        | AppError::SqlExecutionError(_)
        | AppError::SerializationError(_) => StatusCode::BAD_REQUEST,
        AppError::Timeout(_) => StatusCode::REQUEST_TIMEOUT,
        AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
        AppError::GitHubError { status, .. } => match status {
            401 => StatusCode::UNAUTHORIZED,
            403 => StatusCode::FORBIDDEN,
            404 => StatusCode::NOT_FOUND,
            422 => StatusCode::BAD_REQUEST,
            _ => StatusCode::BAD_GATEWAY,
        },
        AppError::HttpError(_) | AppError::NetworkError(_) => StatusCode::BAD_GATEWAY,
        AppError::NotFound(_) => StatusCode::NOT_FOUND,
        AppError::DatabaseError(_) | AppError::ConfigError(_) | AppError::Generic(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let error_type = match &self.0 {
            AppError::ValidationError(_) => "validation_error",
            AppError::SqlSyntaxError(_)
            | AppError::ForbiddenStatement(_)
            | AppError::ParameterError(_)
            | AppError::SqlExecutionError(_) => "query_error",
            AppError::SerializationError(_) => "serialization_error",
            AppError::Timeout(_) => "timeout",
            AppError::Unauthorized(_) => "unauthorized",
            AppError::GitHubError { .. } => "github_error",
            AppError::HttpError(_) | AppError::NetworkError(_) => "upstream_error",
            AppError::NotFound(_) => "not_found",
            AppError::DatabaseError(_) => "database_error",
            AppError::ConfigError(_) => "config_error",
            AppError::Generic(_) => "internal_error",
        };
        let status = self.status();

        if status.is_server_error() {
            tracing::error!(error = %self.0, "Request failed");
        }

        let body = ErrorResponse {
            error: error_type.to_string(),
            message: self.0.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}
