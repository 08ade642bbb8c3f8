//! Console accounts.
//!
//! Users live in the replicated store, so every change is written locally
//! and then proposed. Passwords are hashed before they reach the store.

use std::sync::Arc;

use crate::cluster::Replicator;
use crate::cluster::command::RaftCommand;
use crate::error::{AppError, AppResult};
use crate::models::{DEFAULT_ADMIN_NAME, DEFAULT_ADMIN_PASSWORD, User};
use crate::utils::password::{hash_password, verify_password};
use crate::utils::snowflake::IdGenerator;
use crate::utils::time::now_millis;

/// Fields accepted when creating a user; `password` is plaintext.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub name: String,
    pub password: String,
    pub email: String,
}

/// Fields that may change; `None` keeps the stored value.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub password: Option<String>,
    pub email: Option<String>,
}

#[derive(Clone)]
pub struct UserService {
    replicator: Replicator,
    ids: Arc<IdGenerator>,
}

impl UserService {
    pub fn new(replicator: Replicator, ids: Arc<IdGenerator>) -> Self {
        Self { replicator, ids }
    }

    pub fn list_users(&self) -> AppResult<Vec<User>> {
        self.replicator.store().list_users()
    }

    pub fn get_user(&self, id: u64) -> AppResult<User> {
        self.replicator
            .store()
            .find_user(id)?
            .ok_or_else(|| AppError::not_found("user", "id", id))
    }

    /// Creates a user with a fresh id. Names are unique.
    pub async fn insert_user(&self, new_user: NewUser) -> AppResult<User> {
        let store = self.replicator.store();
        if store.user_by_name(&new_user.name)?.is_some() {
            return Err(AppError::Duplicate {
                entity: "user".to_string(),
                field: "name".to_string(),
                value: new_user.name,
            });
        }

        let user = User {
            id: self.ids.next_id()?,
            name: new_user.name,
            password: hash_password(&new_user.password)?,
            email: new_user.email,
            update_time: now_millis(),
        };
        store.save_user(&user)?;
        tracing::info!(user_id = user.id, user = %user.name, "user created");

        self.replicator.submit(RaftCommand::SaveUser(user.clone())).await?;
        Ok(user)
    }

    pub async fn update_user(&self, id: u64, changes: UserChanges) -> AppResult<User> {
        let mut user = self.get_user(id)?;
        if let Some(password) = changes.password.filter(|p| !p.is_empty()) {
            user.password = hash_password(&password)?;
        }
        if let Some(email) = changes.email.filter(|e| !e.is_empty()) {
            user.email = email;
        }
        user.update_time = now_millis();
        self.replicator.store().save_user(&user)?;
        tracing::info!(user_id = id, "user updated");

        self.replicator.submit(RaftCommand::SaveUser(user.clone())).await?;
        Ok(user)
    }

    /// The built-in admin account cannot be removed.
    pub async fn delete_user(&self, id: u64) -> AppResult<()> {
        let user = self.get_user(id)?;
        if user.name == DEFAULT_ADMIN_NAME {
            return Err(AppError::BadRequest {
                message: format!("user '{}' cannot be deleted", DEFAULT_ADMIN_NAME),
            });
        }
        self.replicator.store().delete_user(id)?;
        tracing::info!(user_id = id, user = %user.name, "user deleted");

        self.replicator.submit(RaftCommand::DeleteUser(id)).await
    }

    pub fn verify_credentials(&self, name: &str, password: &str) -> AppResult<bool> {
        match self.replicator.store().user_by_name(name)? {
            Some(user) => verify_password(password, &user.password),
            None => Ok(false),
        }
    }
}

/// The console account seeded on the very first start.
pub fn default_admin(ids: &IdGenerator) -> AppResult<User> {
    Ok(User {
        id: ids.next_id()?,
        name: DEFAULT_ADMIN_NAME.to_string(),
        password: hash_password(DEFAULT_ADMIN_PASSWORD)?,
        email: String::new(),
        update_time: now_millis(),
    })
}
