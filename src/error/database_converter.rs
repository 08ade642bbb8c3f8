use crate::error::AppError;
use diesel::result::{DatabaseErrorKind, Error as DieselError};

/// Utility for converting history-store database errors to `AppError`.
pub struct DatabaseErrorConverter;

impl DatabaseErrorConverter {
    /// Converts a Diesel error to an appropriate AppError variant.
    ///
    /// `operation` names what was being attempted, e.g. `"insert trace"`.
    pub fn convert_diesel_error(error: DieselError, operation: &str) -> AppError {
        match error {
            DieselError::DatabaseError(kind, info) => {
                let table = info.table_name().unwrap_or("t_trace").to_string();
                match kind {
                    DatabaseErrorKind::UniqueViolation => AppError::Duplicate {
                        entity: table,
                        field: info.constraint_name().unwrap_or("id").to_string(),
                        value: info.details().unwrap_or("unknown").to_string(),
                    },
                    DatabaseErrorKind::NotNullViolation | DatabaseErrorKind::CheckViolation => {
                        AppError::Validation {
                            field: info
                                .column_name()
                                .or(info.constraint_name())
                                .unwrap_or("unknown")
                                .to_string(),
                            reason: info.message().to_string(),
                        }
                    }
                    _ => AppError::Database {
                        operation: operation.to_string(),
                        source: anyhow::Error::msg(format!("Database error: {}", info.message())),
                    },
                }
            }
            DieselError::NotFound => AppError::NotFound {
                entity: "trace".to_string(),
                field: "id".to_string(),
                value: "unknown".to_string(),
            },
            other => AppError::Database {
                operation: operation.to_string(),
                source: anyhow::Error::from(other),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockDatabaseErrorInfo {
        message: String,
        column: Option<String>,
        constraint_name: Option<String>,
    }

    impl diesel::result::DatabaseErrorInformation for MockDatabaseErrorInfo {
        fn message(&self) -> &str {
            &self.message
        }

        fn details(&self) -> Option<&str> {
            None
        }

        fn hint(&self) -> Option<&str> {
            None
        }

        fn table_name(&self) -> Option<&str> {
            Some("t_trace")
        }

        fn column_name(&self) -> Option<&str> {
            self.column.as_deref()
        }

        fn constraint_name(&self) -> Option<&str> {
            self.constraint_name.as_deref()
        }

        fn statement_position(&self) -> Option<i32> {
            None
        }
    }

    #[test]
    fn test_convert_not_found_error() {
        let result = DatabaseErrorConverter::convert_diesel_error(DieselError::NotFound, "get trace");
        assert!(matches!(result, AppError::NotFound { ref entity, .. } if entity == "trace"));
    }

    #[test]
    fn test_convert_unique_violation() {
        let info = MockDatabaseErrorInfo {
            message: "duplicate key value violates unique constraint \"t_trace_pkey\"".to_string(),
            column: None,
            constraint_name: Some("t_trace_pkey".to_string()),
        };
        let error = DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "insert trace") {
            AppError::Duplicate { entity, field, .. } => {
                assert_eq!(entity, "t_trace");
                assert_eq!(field, "t_trace_pkey");
            }
            other => panic!("Expected Duplicate error, got: {:?}", other),
        }
    }

    #[test]
    fn test_convert_not_null_violation() {
        let info = MockDatabaseErrorInfo {
            message: "null value in column \"job_name\" violates not-null constraint".to_string(),
            column: Some("job_name".to_string()),
            constraint_name: None,
        };
        let error = DieselError::DatabaseError(DatabaseErrorKind::NotNullViolation, Box::new(info));

        match DatabaseErrorConverter::convert_diesel_error(error, "insert trace") {
            AppError::Validation { field, reason } => {
                assert_eq!(field, "job_name");
                assert!(reason.contains("not-null"));
            }
            other => panic!("Expected Validation error, got: {:?}", other),
        }
    }

    #[test]
    fn test_other_errors_keep_operation() {
        let result = DatabaseErrorConverter::convert_diesel_error(
            DieselError::RollbackTransaction,
            "clean traces",
        );
        assert!(matches!(result, AppError::Database { ref operation, .. } if operation == "clean traces"));
    }
}
