//! Service layer for business logic operations.
//!
//! Every mutating service writes the local store first and then proposes
//! the same change to the cluster, so handlers never touch the store or the
//! consensus layer directly.

mod alarm_service;
pub mod alerts;
mod job_service;
mod monitor;
mod node_service;
mod runtime;
mod user_service;

pub use alarm_service::AlarmService;
pub use job_service::JobService;
pub use monitor::Monitor;
pub use node_service::{NodeDetail, NodeService};
pub use runtime::{MemberHealth, MemberProbe, RuntimeService, RuntimeStats};
pub use user_service::{NewUser, UserChanges, UserService, default_admin};

use std::sync::Arc;

use crate::cluster::peer::PeerClient;
use crate::repositories::TraceStore;
use crate::scheduler::Scheduler;

/// Aggregates all services for convenient access.
///
/// This struct is designed to be used as Axum application state.
/// Cloning is cheap since every service shares its state through `Arc`.
#[derive(Clone)]
pub struct Services {
    pub jobs: JobService,
    pub nodes: NodeService,
    pub users: UserService,
    pub alarm: AlarmService,
    pub runtime: RuntimeService,
    pub traces: Arc<dyn TraceStore>,
}

impl Services {
    pub fn new(
        scheduler: Scheduler,
        traces: Arc<dyn TraceStore>,
        peers: PeerClient,
        node_name: impl Into<String>,
    ) -> Self {
        let replicator = scheduler.replicator().clone();
        Self {
            nodes: NodeService::new(replicator.clone()),
            users: UserService::new(replicator.clone(), scheduler.ids().clone()),
            alarm: AlarmService::new(replicator.clone()),
            runtime: RuntimeService::new(
                replicator,
                scheduler.role().clone(),
                traces.clone(),
                Arc::new(peers),
                node_name,
            ),
            jobs: JobService::new(scheduler),
            traces,
        }
    }
}
