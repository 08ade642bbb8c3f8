use crate::error::DatabaseErrorConverter;
use serde::Serialize;
use thiserror::Error;

/// Application-wide error type.
///
/// Every fallible operation in the scheduler, the replicated state machine and
/// the HTTP layer reports through this enum so handlers can map it to a status
/// code and background tasks can log it with structured context.
#[derive(Error, Debug)]
pub enum AppError {
    /// Resource not found error with entity, field, and value information
    #[error("Resource not found: {entity} with {field}={value}")]
    NotFound {
        entity: String,
        field: String,
        value: String,
    },

    /// Duplicate entry error for unique keys
    #[error("Duplicate entry: {entity}.{field} = '{value}' already exists")]
    Duplicate {
        entity: String,
        field: String,
        value: String,
    },

    /// Validation error with field-specific details
    #[error("Validation failed for {field}: {reason}")]
    Validation { field: String, reason: String },

    /// Multiple field validation failures from request DTOs
    #[error("Validation failed: {} field error(s)", errors.len())]
    ValidationErrors { errors: Vec<ValidationFieldError> },

    /// Bad request error with descriptive message
    #[error("Bad request: {message}")]
    BadRequest { message: String },

    /// Request signature missing or wrong
    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    /// Local key-value storage failure
    #[error("Storage operation failed: {operation}")]
    Storage {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Encoding or decoding of a persisted value failed
    #[error("Serialization failed for {entity}")]
    Serialization {
        entity: String,
        #[source]
        source: anyhow::Error,
    },

    /// Database operation error with operation context
    #[error("Database operation failed: {operation}")]
    Database {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Proposal, membership change or commit wait failed
    #[error("Consensus operation failed: {operation}")]
    Consensus {
        operation: String,
        #[source]
        source: anyhow::Error,
    },

    /// Cluster topology problem (no leader, unknown node, refused join)
    #[error("Cluster error: {message}")]
    Cluster { message: String },

    /// Configuration error with key information
    #[error("Configuration error: {key}")]
    Configuration {
        key: String,
        #[source]
        source: anyhow::Error,
    },

    /// Connection pool error
    #[error("Connection pool error")]
    ConnectionPool {
        #[source]
        source: anyhow::Error,
    },

    /// Internal error for unexpected failures
    #[error("Internal error")]
    Internal {
        #[source]
        source: anyhow::Error,
    },
}

/// A single field failure collected from `validator`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ValidationFieldError {
    pub field: String,
    pub message: String,
}

impl AppError {
    pub fn not_found(entity: &str, field: &str, value: impl ToString) -> Self {
        AppError::NotFound {
            entity: entity.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        }
    }

    pub fn storage(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Storage {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn serialization(entity: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Serialization {
            entity: entity.into(),
            source: source.into(),
        }
    }

    pub fn consensus(operation: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        AppError::Consensus {
            operation: operation.into(),
            source: source.into(),
        }
    }

    pub fn cluster(message: impl Into<String>) -> Self {
        AppError::Cluster {
            message: message.into(),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(error: anyhow::Error) -> Self {
        AppError::Internal { source: error }
    }
}

impl From<diesel::result::Error> for AppError {
    fn from(error: diesel::result::Error) -> Self {
        DatabaseErrorConverter::convert_diesel_error(error, "database operation")
    }
}

impl From<validator::ValidationErrors> for AppError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut collected: Vec<ValidationFieldError> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errs)| {
                errs.iter().map(move |e| ValidationFieldError {
                    field: field.to_string(),
                    message: e
                        .message
                        .as_ref()
                        .map(|m| m.to_string())
                        .unwrap_or_else(|| e.code.to_string()),
                })
            })
            .collect();
        collected.sort_by(|a, b| a.field.cmp(&b.field));
        AppError::ValidationErrors { errors: collected }
    }
}

impl From<axum::extract::rejection::JsonRejection> for AppError {
    fn from(rejection: axum::extract::rejection::JsonRejection) -> Self {
        AppError::BadRequest {
            message: rejection.body_text(),
        }
    }
}

impl From<crate::config::ConfigError> for AppError {
    fn from(error: crate::config::ConfigError) -> Self {
        AppError::Configuration {
            key: error.field().unwrap_or("config").to_string(),
            source: anyhow::Error::from(error),
        }
    }
}

/// Type alias for Result with AppError to simplify function signatures
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use validator::Validate;

    #[derive(Validate)]
    struct JobForm {
        #[validate(length(min = 1, message = "name is required"))]
        name: String,
        #[validate(range(min = 1))]
        timeout: u32,
    }

    #[test]
    fn test_validation_errors_are_collected_per_field() {
        let form = JobForm {
            name: String::new(),
            timeout: 0,
        };
        let err: AppError = form.validate().unwrap_err().into();
        match err {
            AppError::ValidationErrors { errors } => {
                assert_eq!(errors.len(), 2);
                assert_eq!(errors[0].field, "name");
                assert_eq!(errors[0].message, "name is required");
                assert_eq!(errors[1].field, "timeout");
                assert_eq!(errors[1].message, "range");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_helpers_build_structured_variants() {
        let err = AppError::not_found("job", "id", 42);
        assert_eq!(err.to_string(), "Resource not found: job with id=42");

        let err = AppError::cluster("no leader");
        assert_eq!(err.to_string(), "Cluster error: no leader");

        let err = AppError::storage("put job", anyhow::anyhow!("disk full"));
        assert!(matches!(err, AppError::Storage { ref operation, .. } if operation == "put job"));
    }
}
