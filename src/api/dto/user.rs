//! User-related DTOs for API requests and responses.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::models::User;
use crate::services::{NewUser, UserChanges};

// ============================================================================
// Request DTOs
// ============================================================================

/// Request body for creating a new user.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 20, message = "Username must be between 3 and 20 characters"))]
    #[schema(min_length = 3, max_length = 20)]
    pub name: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(format = "email")]
    pub email: String,
    #[validate(length(min = 6, max = 30, message = "Password must be between 6 and 30 characters"))]
    #[schema(format = "password", min_length = 6, max_length = 30)]
    pub password: String,
}

impl CreateUserRequest {
    pub fn into_new_user(self) -> NewUser {
        NewUser {
            name: self.name,
            password: self.password,
            email: self.email,
        }
    }
}

/// Request body for updating a user. Absent fields keep their value.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct UpdateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(format = "email")]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 30, message = "Password must be between 6 and 30 characters"))]
    #[schema(format = "password")]
    pub password: Option<String>,
}

impl UpdateUserRequest {
    pub fn into_changes(self) -> UserChanges {
        UserChanges {
            password: self.password,
            email: self.email,
        }
    }
}

/// Console login check.
#[derive(Debug, Deserialize, ToSchema, Validate)]
pub struct LoginRequest {
    #[validate(length(min = 1, message = "Username is required"))]
    pub name: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(format = "password")]
    pub password: String,
}

// ============================================================================
// Response DTOs
// ============================================================================

/// Response body for user data (excludes the password hash).
#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: u64,
    pub name: String,
    pub email: String,
    /// Unix milliseconds
    pub update_time: i64,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            name: user.name,
            email: user.email,
            update_time: user.update_time,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_response_hides_password() {
        let user = User {
            id: 3,
            name: "alice".to_string(),
            password: "$argon2id$v=19$...".to_string(),
            email: "alice@example.com".to_string(),
            update_time: 1,
        };
        let body = serde_json::to_value(UserResponse::from(user)).unwrap();
        assert!(body.get("password").is_none());
        assert_eq!(body["name"], "alice");
    }

    #[test]
    fn test_update_rules() {
        let ok = UpdateUserRequest {
            email: None,
            password: Some("longenough".to_string()),
        };
        assert!(ok.validate().is_ok());

        let bad = UpdateUserRequest {
            email: Some("not-an-email".to_string()),
            password: Some("123".to_string()),
        };
        let errors = bad.validate().unwrap_err();
        assert!(errors.field_errors().contains_key("email"));
        assert!(errors.field_errors().contains_key("password"));
    }
}
