//! Startup validation of loaded settings
//!
//! Every failure here is fatal: the process refuses to start with a
//! `ConfigError::ValidationError` naming the offending key.

use std::collections::HashSet;
use std::net::SocketAddr;

use crate::config::error::ConfigError;
use crate::config::settings::{
    ClusterConfig, DataSourceConfig, LoggerSettings, RunMode, ServerConfig, Settings,
};

const VALID_LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];
const VALID_LOG_FORMATS: &[&str] = &["full", "compact", "json"];
const POSTGRES_SCHEMES: &[&str] = &["postgres://", "postgresql://"];

/// A consensus group needs a majority that survives one failure.
pub const MIN_CLUSTER_NODES: usize = 3;

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::validation(
                "server.port",
                "Port must be between 1 and 65535.",
            ));
        }
        if self.request_timeout == 0 {
            return Err(ConfigError::validation(
                "server.request_timeout",
                "Request timeout must be greater than 0 seconds.",
            ));
        }
        Ok(())
    }
}

impl DataSourceConfig {
    pub fn validate(&self, index: usize) -> Result<(), ConfigError> {
        let key = |field: &str| format!("datasources[{}].{}", index, field);

        if self.name.trim().is_empty() {
            return Err(ConfigError::validation(key("name"), "Datasource name is required."));
        }
        if self.url.trim().is_empty() {
            return Err(ConfigError::validation(key("url"), "Datasource url is required."));
        }
        if !POSTGRES_SCHEMES.iter().any(|s| self.url.starts_with(s)) {
            return Err(ConfigError::validation(
                key("url"),
                "Expected format: postgres://[user:password@]host[:port]/database",
            ));
        }
        if self.max_connections == 0 {
            return Err(ConfigError::validation(
                key("max_connections"),
                "Max connections must be greater than 0.",
            ));
        }
        Ok(())
    }
}

fn validate_datasources(datasources: &[DataSourceConfig]) -> Result<(), ConfigError> {
    if datasources.is_empty() {
        return Err(ConfigError::validation(
            "datasources",
            "At least one datasource is required for execution history.",
        ));
    }

    let mut names = HashSet::new();
    let mut urls = HashSet::new();
    for (i, ds) in datasources.iter().enumerate() {
        ds.validate(i)?;
        if !names.insert(ds.name.as_str()) {
            return Err(ConfigError::validation(
                format!("datasources[{}].name", i),
                format!("Duplicate datasource name '{}'.", ds.name),
            ));
        }
        if !urls.insert(ds.url.as_str()) {
            return Err(ConfigError::validation(
                format!("datasources[{}].url", i),
                format!("Duplicate datasource url '{}'.", ds.masked_url()),
            ));
        }
    }
    Ok(())
}

impl ClusterConfig {
    /// Rules applied only in cluster mode. `http_port` is the API port this
    /// node binds, which must match its own entry in `nodes`.
    pub fn validate(&self, http_port: u16) -> Result<(), ConfigError> {
        if self.node_name.is_empty() {
            return Err(ConfigError::validation(
                "cluster.node_name",
                "Node name is required in cluster mode.",
            ));
        }
        if !self.node_name.is_ascii() || self.node_name.contains('/') {
            return Err(ConfigError::validation(
                "cluster.node_name",
                "Node name must be ASCII and must not contain '/'.",
            ));
        }
        if self.nodes.len() < MIN_CLUSTER_NODES {
            return Err(ConfigError::validation(
                "cluster.nodes",
                format!(
                    "A cluster needs at least {} nodes, found {}.",
                    MIN_CLUSTER_NODES,
                    self.nodes.len()
                ),
            ));
        }

        let mut names = HashSet::new();
        let mut addrs = HashSet::new();
        for (i, node) in self.nodes.iter().enumerate() {
            if node.name.is_empty() || !names.insert(node.name.as_str()) {
                return Err(ConfigError::validation(
                    format!("cluster.nodes[{}].name", i),
                    format!("Node name '{}' is empty or duplicated.", node.name),
                ));
            }
            if node.addr.parse::<SocketAddr>().is_err() {
                return Err(ConfigError::validation(
                    format!("cluster.nodes[{}].addr", i),
                    format!("'{}' is not an IP:port address.", node.addr),
                ));
            }
            if !addrs.insert(node.addr.as_str()) {
                return Err(ConfigError::validation(
                    format!("cluster.nodes[{}].addr", i),
                    format!("Duplicate node address '{}'.", node.addr),
                ));
            }
        }

        let current = self.current_http_addr().ok_or_else(|| {
            ConfigError::validation(
                "cluster.node_name",
                format!("Node '{}' is not listed in cluster.nodes.", self.node_name),
            )
        })?;
        let port = current
            .parse::<SocketAddr>()
            .map(|addr| addr.port())
            .unwrap_or_default();
        if port != http_port {
            return Err(ConfigError::validation(
                "server.port",
                format!(
                    "Server port {} differs from the port of '{}' in cluster.nodes ({}).",
                    http_port, self.node_name, current
                ),
            ));
        }

        if self.election_timeout_min_ms >= self.election_timeout_max_ms {
            return Err(ConfigError::validation(
                "cluster.election_timeout_min_ms",
                "Election timeout minimum must be below the maximum.",
            ));
        }
        if self.heartbeat_interval_ms >= self.election_timeout_min_ms {
            return Err(ConfigError::validation(
                "cluster.heartbeat_interval_ms",
                "Heartbeat interval must be below the election timeout minimum.",
            ));
        }
        if self.op_timeout_secs == 0 || self.detect_timeout_secs == 0 {
            return Err(ConfigError::validation(
                "cluster.op_timeout_secs",
                "Consensus timeouts must be greater than 0 seconds.",
            ));
        }
        Ok(())
    }
}

impl LoggerSettings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !VALID_LOG_LEVELS.contains(&self.level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(
                "logger.level",
                format!(
                    "Invalid log level '{}'. Valid values are: {}",
                    self.level,
                    VALID_LOG_LEVELS.join(", ")
                ),
            ));
        }
        if self.file.enabled {
            if self.file.path.trim().is_empty() {
                return Err(ConfigError::validation(
                    "logger.file.path",
                    "Log file path is required when file logging is enabled.",
                ));
            }
            if !VALID_LOG_FORMATS.contains(&self.file.format.to_lowercase().as_str()) {
                return Err(ConfigError::validation(
                    "logger.file.format",
                    format!(
                        "Invalid log format '{}'. Valid values are: {}",
                        self.file.format,
                        VALID_LOG_FORMATS.join(", ")
                    ),
                ));
            }
        }
        if self.cluster_file.enabled && self.cluster_file.path.trim().is_empty() {
            return Err(ConfigError::validation(
                "logger.cluster_file.path",
                "Cluster log path is required when the cluster log is enabled.",
            ));
        }
        Ok(())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        validate_datasources(&self.datasources)?;
        self.logger.validate()?;
        if self.node.mode == RunMode::Cluster {
            self.cluster.validate(self.server.port)?;
        }
        if self.node.sign_secret_key.is_empty() {
            return Err(ConfigError::validation(
                "node.sign_secret_key",
                "Signing secret must not be empty.",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::settings::ClusterNodeConfig;
    use proptest::prelude::*;

    fn datasource(name: &str, url: &str) -> DataSourceConfig {
        DataSourceConfig {
            name: name.to_string(),
            url: url.to_string(),
            max_connections: 5,
            connection_timeout: 30,
        }
    }

    fn cluster(n: usize) -> ClusterConfig {
        ClusterConfig {
            node_name: "node-0".to_string(),
            nodes: (0..n)
                .map(|i| ClusterNodeConfig {
                    name: format!("node-{}", i),
                    addr: format!("10.0.0.{}:8080", i + 1),
                })
                .collect(),
            ..Default::default()
        }
    }

    fn valid_settings() -> Settings {
        Settings {
            datasources: vec![datasource("primary", "postgres://u:p@db1/jobs")],
            ..Default::default()
        }
    }

    #[test]
    fn test_default_standalone_settings_valid() {
        assert!(valid_settings().validate().is_ok());
    }

    #[test]
    fn test_missing_datasource_rejected() {
        let err = Settings::default().validate().unwrap_err();
        assert_eq!(err.field(), Some("datasources"));
    }

    #[test]
    fn test_duplicate_datasource_name_rejected() {
        let mut settings = valid_settings();
        settings
            .datasources
            .push(datasource("primary", "postgres://u:p@db2/jobs"));
        let err = settings.validate().unwrap_err();
        assert_eq!(err.field(), Some("datasources[1].name"));
    }

    #[test]
    fn test_duplicate_datasource_url_masked_in_message() {
        let mut settings = valid_settings();
        settings
            .datasources
            .push(datasource("standby", "postgres://u:p@db1/jobs"));
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("***@db1/jobs"));
        assert!(!err.to_string().contains("u:p"));
    }

    #[test]
    fn test_datasource_requires_postgres_scheme() {
        assert!(datasource("a", "mysql://db/jobs").validate(0).is_err());
        assert!(datasource("a", "postgresql://db/jobs").validate(0).is_ok());
    }

    #[test]
    fn test_server_port_zero_rejected() {
        let mut settings = valid_settings();
        settings.server.port = 0;
        assert_eq!(settings.validate().unwrap_err().field(), Some("server.port"));
    }

    #[test]
    fn test_cluster_rules_only_apply_in_cluster_mode() {
        let mut settings = valid_settings();
        settings.cluster = cluster(1);
        assert!(settings.validate().is_ok());

        settings.node.mode = RunMode::Cluster;
        assert_eq!(settings.validate().unwrap_err().field(), Some("cluster.nodes"));
    }

    #[test]
    fn test_cluster_valid() {
        assert!(cluster(3).validate(8080).is_ok());
    }

    #[test]
    fn test_cluster_port_mismatch_rejected() {
        let err = cluster(3).validate(9090).unwrap_err();
        assert_eq!(err.field(), Some("server.port"));
    }

    #[test]
    fn test_cluster_current_node_must_be_listed() {
        let mut config = cluster(3);
        config.node_name = "node-9".to_string();
        assert_eq!(config.validate(8080).unwrap_err().field(), Some("cluster.node_name"));
    }

    #[test]
    fn test_cluster_bad_addr_rejected() {
        let mut config = cluster(3);
        config.nodes[2].addr = "db-host:8080".to_string();
        assert_eq!(
            config.validate(8080).unwrap_err().field(),
            Some("cluster.nodes[2].addr")
        );
    }

    #[test]
    fn test_cluster_duplicate_addr_rejected() {
        let mut config = cluster(3);
        config.nodes[2].addr = config.nodes[1].addr.clone();
        assert_eq!(
            config.validate(8080).unwrap_err().field(),
            Some("cluster.nodes[2].addr")
        );
    }

    #[test]
    fn test_cluster_timeouts_ordered() {
        let mut config = cluster(3);
        config.heartbeat_interval_ms = config.election_timeout_min_ms;
        assert_eq!(
            config.validate(8080).unwrap_err().field(),
            Some("cluster.heartbeat_interval_ms")
        );

        let mut config = cluster(3);
        config.election_timeout_max_ms = config.election_timeout_min_ms;
        assert!(config.validate(8080).is_err());
    }

    #[test]
    fn test_logger_invalid_level() {
        let mut settings = valid_settings();
        settings.logger.level = "verbose".to_string();
        assert_eq!(settings.validate().unwrap_err().field(), Some("logger.level"));
    }

    #[test]
    fn test_logger_file_format_checked_only_when_enabled() {
        let mut logger = LoggerSettings::default();
        logger.file.format = "xml".to_string();
        assert!(logger.validate().is_ok());
        logger.file.enabled = true;
        assert!(logger.validate().is_err());
    }

    proptest! {
        #[test]
        fn property_small_clusters_rejected(n in 0usize..MIN_CLUSTER_NODES) {
            let mut config = cluster(n.max(1));
            config.nodes.truncate(n);
            prop_assert!(config.validate(8080).is_err());
        }

        #[test]
        fn property_well_formed_clusters_accepted(n in MIN_CLUSTER_NODES..12usize, port in 1u16..u16::MAX) {
            let mut config = cluster(n);
            for (i, node) in config.nodes.iter_mut().enumerate() {
                node.addr = format!("10.0.1.{}:{}", i + 1, port);
            }
            prop_assert!(config.validate(port).is_ok());
        }
    }
}
