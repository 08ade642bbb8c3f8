//! Execution history database access.

mod pool;

pub use pool::{AsyncDbPool, MIGRATIONS, connection, establish_async_connection_pool};
