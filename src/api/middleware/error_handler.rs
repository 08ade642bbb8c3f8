//! Error handler for converting AppError to HTTP responses.
//!
//! Internal failures are logged here with their source chain and answered
//! with a generic message so storage and consensus details never leak.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use crate::api::dto::ErrorResponse;
use crate::error::AppError;

/// Maps an AppError variant to its corresponding HTTP status code.
pub fn error_to_status_code(error: &AppError) -> StatusCode {
    match error {
        AppError::NotFound { .. } => StatusCode::NOT_FOUND,
        AppError::Duplicate { .. } => StatusCode::CONFLICT,
        AppError::Validation { .. }
        | AppError::ValidationErrors { .. }
        | AppError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        AppError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        AppError::Cluster { .. } | AppError::ConnectionPool { .. } => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        AppError::Consensus { .. } => StatusCode::BAD_GATEWAY,
        AppError::Storage { .. }
        | AppError::Serialization { .. }
        | AppError::Database { .. }
        | AppError::Configuration { .. }
        | AppError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

pub fn error_to_code(error: &AppError) -> &'static str {
    match error {
        AppError::NotFound { .. } => "NOT_FOUND",
        AppError::Duplicate { .. } => "DUPLICATE_ENTRY",
        AppError::Validation { .. } | AppError::ValidationErrors { .. } => "VALIDATION_ERROR",
        AppError::BadRequest { .. } => "BAD_REQUEST",
        AppError::Unauthorized { .. } => "UNAUTHORIZED",
        AppError::Cluster { .. } => "CLUSTER_UNAVAILABLE",
        AppError::Consensus { .. } => "CONSENSUS_ERROR",
        AppError::Storage { .. } => "STORAGE_ERROR",
        AppError::Serialization { .. } => "SERIALIZATION_ERROR",
        AppError::Database { .. } => "DATABASE_ERROR",
        AppError::Configuration { .. } => "CONFIGURATION_ERROR",
        AppError::ConnectionPool { .. } => "SERVICE_UNAVAILABLE",
        AppError::Internal { .. } => "INTERNAL_ERROR",
    }
}

fn error_body(error: &AppError) -> ErrorResponse {
    let code = error_to_code(error);
    match error {
        AppError::NotFound { entity, field, value } => {
            ErrorResponse::not_found_error(entity, field, value)
        }
        AppError::Duplicate { entity, field, value } => {
            ErrorResponse::duplicate_error(entity, field, value)
        }
        AppError::Validation { field, reason } => ErrorResponse::validation_error(field, reason),
        AppError::ValidationErrors { errors } => {
            ErrorResponse::new(code, "Request validation failed").with_details(json!(errors))
        }
        AppError::BadRequest { message }
        | AppError::Unauthorized { message }
        | AppError::Cluster { message } => ErrorResponse::new(code, message),
        AppError::Consensus { operation, .. } => ErrorResponse::new(
            code,
            &format!("Change saved locally but not replicated: {}", operation),
        ),
        AppError::Database { operation, .. } | AppError::Storage { operation, .. } => {
            ErrorResponse::new(code, &format!("Operation failed: {}", operation))
                .with_details(json!({ "operation": operation }))
        }
        AppError::Serialization { entity, .. } => {
            ErrorResponse::new(code, &format!("Failed to encode or decode {}", entity))
        }
        AppError::Configuration { key, .. } => {
            ErrorResponse::new(code, &format!("Configuration error: {}", key))
        }
        AppError::ConnectionPool { .. } => ErrorResponse::new(code, "Database connection unavailable"),
        AppError::Internal { .. } => ErrorResponse::new(code, "An internal error occurred"),
    }
}

/// Builds the response for `error`, tagged with `request_id` when known.
pub fn error_to_response_with_request_id(error: AppError, request_id: Option<String>) -> Response {
    let status = error_to_status_code(&error);
    if status.is_server_error() {
        tracing::error!(error = ?error, %status, "request failed");
    } else {
        tracing::debug!(error = %error, %status, "request rejected");
    }

    let mut body = error_body(&error);
    if let Some(id) = request_id {
        body = body.with_request_id(&id);
    }
    (status, Json(body)).into_response()
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        error_to_response_with_request_id(self, None)
    }
}
