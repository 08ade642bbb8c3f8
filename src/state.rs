//! Application state for Axum web framework.
//!
//! Contains shared services and resources that are accessible
//! across all request handlers.

use std::sync::Arc;

use crate::cluster::Role;
use crate::services::Services;

/// Application state containing all shared services and resources.
///
/// Cloning is cheap since every service shares its state through `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// All business logic services
    pub services: Services,
    /// Run mode and leader flag of this node
    pub role: Arc<Role>,
    /// Cluster node name, or the HTTP port when standalone
    pub node_name: String,
    /// Secret for verifying request signatures
    pub sign_secret: String,
}

impl AppState {
    pub fn new(
        services: Services,
        role: Arc<Role>,
        node_name: impl Into<String>,
        sign_secret: impl Into<String>,
    ) -> Self {
        Self {
            services,
            role,
            node_name: node_name.into(),
            sign_secret: sign_secret.into(),
        }
    }
}
