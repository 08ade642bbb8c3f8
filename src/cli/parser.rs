//! CLI argument parsing with clap

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::build;
use crate::config::RunMode;

/// Distributed cron scheduler firing HTTP callbacks
#[derive(Parser, Debug)]
#[command(name = "cronhive")]
#[command(about = "Distributed cron scheduler firing HTTP callbacks")]
#[command(long_about = "
cronhive fires HTTP callbacks on cron schedules. A node runs alone or as
one member of a replicated cluster in which only the leader fires jobs.
Execution history is written to one or more PostgreSQL datasources.

EXAMPLES:
    # Start a standalone node with default configuration
    cronhive serve

    # Start a cluster member
    cronhive serve --mode cluster --node-name node-a --port 8081

    # Use custom configuration file
    cronhive --config /etc/cronhive/production.toml serve

    # Check configuration without starting the node
    cronhive serve --dry-run

    # Create the history tables on every datasource
    cronhive migrate
")]
#[command(version = build::CLAP_LONG_VERSION)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Configuration file path
    ///
    /// Replaces layered loading from the config directory. The file must be
    /// TOML, exist and be readable.
    #[arg(short, long, value_name = "FILE", value_parser = super::validation::validate_config_file_path)]
    pub config: Option<PathBuf>,

    /// Override environment detection
    ///
    /// Selects the `{environment}.toml` overlay.
    /// Available values: development (dev), production (prod), test
    #[arg(short, long, value_enum)]
    pub env: Option<Environment>,

    /// Enable debug logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log errors only
    #[arg(short, long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Start the node (default)
    ///
    /// Examples:
    ///   cronhive serve                           # Start with defaults
    ///   cronhive serve --host 0.0.0.0 --port 80 # Bind to all interfaces on port 80
    ///   cronhive serve --dry-run                 # Validate config without starting
    Serve {
        /// Host address the HTTP API binds to
        #[arg(long, value_name = "ADDRESS", value_parser = super::validation::validate_host_address)]
        host: Option<String>,

        /// Port of the HTTP API
        ///
        /// In cluster mode it must match this node's entry in cluster.nodes.
        #[arg(short, long, value_name = "PORT", value_parser = super::validation::validate_port)]
        port: Option<u16>,

        /// Run alone or as a cluster member
        #[arg(long, value_enum)]
        mode: Option<RunMode>,

        /// Name of this node in cluster.nodes
        #[arg(long, value_name = "NAME", value_parser = super::validation::validate_node_name)]
        node_name: Option<String>,

        /// Log level override, taking precedence over --verbose and --quiet
        #[arg(long, value_enum)]
        log_level: Option<LogLevel>,

        /// Validate configuration and exit
        #[arg(long)]
        dry_run: bool,
    },
    /// History table migrations, applied to every configured datasource
    ///
    /// Examples:
    ///   cronhive migrate                    # Apply all pending migrations
    ///   cronhive migrate --dry-run          # Show pending migrations without applying
    ///   cronhive migrate --rollback 1       # Revert the last migration
    Migrate {
        /// Show pending migrations without applying
        #[arg(long, conflicts_with = "rollback")]
        dry_run: bool,

        /// Number of migrations to revert on each datasource
        #[arg(long, value_name = "STEPS", conflicts_with = "dry_run", value_parser = super::validation::validate_rollback_steps)]
        rollback: Option<u32>,
    },
}

#[derive(ValueEnum, Clone, Debug)]
pub enum Environment {
    #[value(name = "development", alias = "dev")]
    Development,
    #[value(name = "production", alias = "prod")]
    Production,
    #[value(name = "test")]
    Test,
}

#[derive(ValueEnum, Clone, Debug)]
pub enum LogLevel {
    #[value(name = "error")]
    Error,
    #[value(name = "warn", alias = "warning")]
    Warn,
    #[value(name = "info")]
    Info,
    #[value(name = "debug")]
    Debug,
    #[value(name = "trace")]
    Trace,
}

impl Cli {
    /// Checks argument combinations clap cannot express.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(Commands::Serve {
            mode: Some(RunMode::Standalone),
            node_name: Some(_),
            ..
        }) = &self.command
        {
            return Err("--node-name only applies with --mode cluster".to_string());
        }
        if self.verbose && self.quiet {
            return Err("Cannot use --verbose and --quiet together".to_string());
        }
        Ok(())
    }
}

impl From<LogLevel> for String {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => "error",
            LogLevel::Warn => "warn",
            LogLevel::Info => "info",
            LogLevel::Debug => "debug",
            LogLevel::Trace => "trace",
        }
        .to_string()
    }
}

impl From<Environment> for crate::config::Environment {
    fn from(env: Environment) -> Self {
        match env {
            Environment::Development => crate::config::Environment::Development,
            Environment::Production => crate::config::Environment::Production,
            Environment::Test => crate::config::Environment::Test,
        }
    }
}
