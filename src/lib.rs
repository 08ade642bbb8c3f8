//! cronhive
//!
//! Distributed cron scheduler that fires HTTP callbacks at executors, with
//! replicated job state and redundant execution history.

use shadow_rs::shadow;
shadow!(build);

pub mod api;
pub mod cli;
pub mod cluster;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod error;
pub mod external;
pub mod logger;
pub mod models;
pub mod repositories;
pub mod scheduler;
pub mod schema;
pub mod server;
pub mod services;
pub mod state;
pub mod store;
pub mod utils;

#[cfg(test)]
pub mod testing;

pub use state::AppState;

pub fn pkg_version() -> &'static str {
    build::PKG_VERSION
}
