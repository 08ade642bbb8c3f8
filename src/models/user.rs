use serde::{Deserialize, Serialize};

pub const DEFAULT_ADMIN_NAME: &str = "admin";
pub const DEFAULT_ADMIN_PASSWORD: &str = "123456";

/// Console account. `password` holds an argon2 PHC string, never plaintext.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: u64,
    pub name: String,
    pub password: String,
    pub email: String,
    /// Unix milliseconds
    pub update_time: i64,
}
