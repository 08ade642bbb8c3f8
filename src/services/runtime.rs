//! Runtime overview and member reachability.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::join_all;
use serde::Serialize;
use utoipa::ToSchema;

use crate::cluster::bootstrap::LEADER_ID_PATH;
use crate::cluster::peer::PeerClient;
use crate::cluster::{ClusterMember, Replicator, Role};
use crate::config::RunMode;
use crate::error::AppResult;
use crate::repositories::TraceStore;
use crate::utils::time::format_secs;

/// Answers whether a member's HTTP endpoint is reachable.
#[async_trait]
pub trait MemberProbe: Send + Sync {
    async fn probe(&self, http_addr: &str) -> bool;
}

#[async_trait]
impl MemberProbe for PeerClient {
    async fn probe(&self, http_addr: &str) -> bool {
        let url = format!("http://{}{}", http_addr, LEADER_ID_PATH);
        let request = match self.get(&url) {
            Ok(request) => request,
            Err(e) => {
                tracing::warn!(peer = %http_addr, error = %e, "cannot build probe");
                return false;
            }
        };
        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                tracing::debug!(peer = %http_addr, error = %e, "member probe failed");
                false
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct RuntimeStats {
    #[schema(value_type = String, example = "cluster")]
    pub run_mode: RunMode,
    #[schema(example = "2026-01-01 08:00:00")]
    pub start_time: String,
    pub cluster_node_count: usize,
    pub job_count: usize,
    /// Distinct executor addresses across all jobs
    pub executor_count: usize,
    pub trigger_times: u64,
    pub usable_datasources: usize,
    pub disabled_datasources: usize,
    pub usable_nodes: usize,
    pub disabled_nodes: usize,
}

/// Outcome of probing one raft member.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberHealth {
    pub name: String,
    pub reachable: bool,
}

#[derive(Clone)]
pub struct RuntimeService {
    replicator: Replicator,
    role: Arc<Role>,
    traces: Arc<dyn TraceStore>,
    probe: Arc<dyn MemberProbe>,
    /// This node's name; never probed
    node_name: String,
}

impl RuntimeService {
    pub fn new(
        replicator: Replicator,
        role: Arc<Role>,
        traces: Arc<dyn TraceStore>,
        probe: Arc<dyn MemberProbe>,
        node_name: impl Into<String>,
    ) -> Self {
        Self {
            replicator,
            role,
            traces,
            probe,
            node_name: node_name.into(),
        }
    }

    pub fn role(&self) -> &Arc<Role> {
        &self.role
    }

    pub fn replicator(&self) -> &Replicator {
        &self.replicator
    }

    pub fn traces(&self) -> &Arc<dyn TraceStore> {
        &self.traces
    }

    /// Probe every raft member other than this node concurrently. A member
    /// missing from the node registry counts as unreachable.
    pub async fn member_health(&self) -> AppResult<Vec<MemberHealth>> {
        let members: Vec<ClusterMember> = match self.replicator.consensus() {
            Some(consensus) => consensus.members(),
            None => return Ok(Vec::new()),
        };
        let store = self.replicator.store();
        let mut targets = Vec::new();
        for member in members {
            if member.name == self.node_name {
                continue;
            }
            let http_addr = store.find_node(&member.name)?.map(|n| n.http_addr);
            targets.push((member.name, http_addr));
        }

        let probes = targets.into_iter().map(|(name, http_addr)| async move {
            let reachable = match http_addr.as_deref() {
                Some(addr) if !addr.is_empty() => self.probe.probe(addr).await,
                _ => false,
            };
            MemberHealth { name, reachable }
        });
        Ok(join_all(probes).await)
    }

    pub async fn stats(&self) -> AppResult<RuntimeStats> {
        let store = self.replicator.store();
        let jobs = store.list_jobs()?;
        let executor_count = jobs
            .iter()
            .flat_map(|job| job.executors.iter().map(|e| e.address.as_str()))
            .collect::<BTreeSet<_>>()
            .len();

        let health = self.traces.ping_all().await;
        let usable_datasources = health.iter().filter(|h| h.usable).count();

        let (cluster_node_count, usable_nodes, disabled_nodes) = match self.replicator.consensus() {
            Some(consensus) => {
                let members = self.member_health().await?;
                let reachable = members.iter().filter(|m| m.reachable).count();
                // this node answers by definition
                (consensus.members().len(), reachable + 1, members.len() - reachable)
            }
            None => (0, 0, 0),
        };

        Ok(RuntimeStats {
            run_mode: self.role.mode(),
            start_time: format_secs(self.role.started_at()),
            cluster_node_count,
            job_count: jobs.len(),
            executor_count,
            trigger_times: store.total_fire_times()?,
            usable_datasources,
            disabled_datasources: health.len() - usable_datasources,
            usable_nodes,
            disabled_nodes,
        })
    }
}
