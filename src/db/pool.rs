//! Async PostgreSQL pools for the execution history datasources.

use std::time::Duration;

use diesel_async::AsyncPgConnection;
use diesel_async::pooled_connection::AsyncDieselConnectionManager;
use diesel_async::pooled_connection::bb8::{Pool, PooledConnection};
use diesel_migrations::{EmbeddedMigrations, embed_migrations};

use crate::config::DataSourceConfig;
use crate::error::{AppError, AppResult};

/// bb8::Pool is reference counted; cloning shares the pool.
pub type AsyncDbPool = Pool<AsyncPgConnection>;

pub const MIGRATIONS: EmbeddedMigrations = embed_migrations!("migrations");

/// Build a pool for one datasource. Connections are opened lazily, so an
/// unreachable database does not fail startup; it is found by the first ping.
pub fn establish_async_connection_pool(ds: &DataSourceConfig) -> AsyncDbPool {
    let manager = AsyncDieselConnectionManager::<AsyncPgConnection>::new(ds.url.clone());
    Pool::builder()
        .max_size(ds.max_connections)
        .connection_timeout(Duration::from_secs(ds.connection_timeout.max(1)))
        .build_unchecked(manager)
}

/// Acquire a pooled connection, mapping pool errors the same way everywhere.
pub async fn connection(pool: &AsyncDbPool) -> AppResult<PooledConnection<'_, AsyncPgConnection>> {
    pool.get().await.map_err(|e| AppError::ConnectionPool {
        source: anyhow::Error::from(e),
    })
}
