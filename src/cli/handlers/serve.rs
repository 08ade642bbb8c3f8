//! Serve command handler

use crate::config::RunMode;
use crate::config::settings::Settings;
use crate::error::AppResult;
use crate::server::Server;

pub struct ServeCommandHandler {
    config: Settings,
}

impl ServeCommandHandler {
    pub fn new(config: Settings) -> Self {
        Self { config }
    }

    /// Run the node, or with `dry_run` only print what it would start.
    pub async fn execute(self, dry_run: bool) -> AppResult<()> {
        if dry_run {
            return self.validate_only();
        }
        Server::new(self.config).run().await?;
        Ok(())
    }

    /// Validate configuration without starting the node
    pub fn validate_only(&self) -> AppResult<()> {
        self.config.validate()?;

        println!("✓ Configuration is valid");
        println!("✓ HTTP API would bind to: {}", self.config.server.address());
        println!("✓ Run mode: {}", self.config.node.mode);
        if self.config.node.mode == RunMode::Cluster {
            let cluster = &self.config.cluster;
            println!("✓ Node name: {}", cluster.node_name);
            for node in &cluster.nodes {
                println!("  - {} at {}", node.name, node.addr);
            }
        }
        println!("✓ Local store directory: {}", self.config.node.data_store_dir);
        for ds in &self.config.datasources {
            println!("✓ History datasource '{}': {}", ds.name, ds.masked_url());
        }
        println!("Dry run completed successfully");
        Ok(())
    }

    pub fn config(&self) -> &Settings {
        &self.config
    }
}
