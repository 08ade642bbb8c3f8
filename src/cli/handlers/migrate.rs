//! Migrate command handler
//!
//! Every configured history datasource gets the same `t_trace` schema, so
//! each operation runs against all of them in configuration order and stops
//! at the first failure.

use diesel::Connection;
use diesel::pg::PgConnection;
use diesel_migrations::MigrationHarness;

use crate::config::DataSourceConfig;
use crate::config::settings::Settings;
use crate::db::MIGRATIONS;
use crate::error::{AppError, AppResult};

pub struct MigrateCommandHandler {
    config: Settings,
}

impl MigrateCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Apply, preview (`dry_run`) or revert (`rollback`) migrations.
    pub async fn execute(&self, dry_run: bool, rollback: Option<u32>) -> AppResult<()> {
        if rollback == Some(0) {
            return Err(AppError::Validation {
                field: "rollback_steps".to_string(),
                reason: "Number of rollback steps must be greater than 0".to_string(),
            });
        }
        if self.config.datasources.is_empty() {
            return Err(AppError::Validation {
                field: "datasources".to_string(),
                reason: "No datasource configured".to_string(),
            });
        }

        for ds in &self.config.datasources {
            println!("Datasource '{}' ({})", ds.name, ds.masked_url());
            if dry_run {
                let pending = with_connection(ds, |conn| {
                    conn.pending_migrations(MIGRATIONS)
                        .map(|m| m.iter().map(|m| m.name().to_string()).collect::<Vec<_>>())
                })
                .await?;
                if pending.is_empty() {
                    println!("✓ No pending migrations - schema is up to date");
                }
                for name in pending {
                    println!("  pending: {}", name);
                }
            } else if let Some(steps) = rollback {
                let reverted = with_connection(ds, move |conn| {
                    let mut reverted = Vec::new();
                    for _ in 0..steps {
                        if conn.applied_migrations()?.is_empty() {
                            break;
                        }
                        reverted.push(conn.revert_last_migration(MIGRATIONS)?.to_string());
                    }
                    Ok(reverted)
                })
                .await?;
                println!("✓ Reverted {} migration(s)", reverted.len());
                for name in reverted {
                    println!("  - {}", name);
                }
            } else {
                let applied = with_connection(ds, |conn| {
                    conn.run_pending_migrations(MIGRATIONS)
                        .map(|m| m.iter().map(|v| v.to_string()).collect::<Vec<_>>())
                })
                .await?;
                println!("✓ Applied {} migration(s)", applied.len());
                for name in applied {
                    println!("  - {}", name);
                }
            }
        }
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}

type MigrationResult<T> = diesel::migration::Result<T>;

/// Run a blocking migration operation on a fresh synchronous connection.
async fn with_connection<T, F>(ds: &DataSourceConfig, op: F) -> AppResult<T>
where
    T: Send + 'static,
    F: FnOnce(&mut PgConnection) -> MigrationResult<T> + Send + 'static,
{
    let url = ds.url.clone();
    let name = ds.name.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = PgConnection::establish(&url).map_err(|e| AppError::Database {
            operation: format!("connect to datasource '{}'", name),
            source: anyhow::Error::from(e),
        })?;
        op(&mut conn).map_err(|e| AppError::Database {
            operation: format!("migrate datasource '{}'", name),
            source: anyhow::anyhow!(e),
        })
    })
    .await
    .map_err(|e| AppError::Internal {
        source: anyhow::Error::from(e),
    })?
}
