//! Cluster membership as driven through the HTTP endpoints.

use std::sync::Arc;

use serde::Serialize;
use utoipa::ToSchema;

use crate::cluster::leadership::ensure_node;
use crate::cluster::{Consensus, Replicator};
use crate::error::{AppError, AppResult};
use crate::models::Node;

/// A raft member joined with its registry record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct NodeDetail {
    pub name: String,
    pub http_addr: String,
    pub tcp_addr: String,
    pub machine_num: u16,
    pub voter: bool,
    pub leader: bool,
}

#[derive(Clone)]
pub struct NodeService {
    replicator: Replicator,
}

impl NodeService {
    pub fn new(replicator: Replicator) -> Self {
        Self { replicator }
    }

    fn consensus(&self) -> AppResult<&Arc<dyn Consensus>> {
        self.replicator
            .consensus()
            .ok_or_else(|| AppError::cluster("this node is not running in cluster mode"))
    }

    /// Name of the current leader, empty when none is known or when running
    /// standalone.
    pub fn leader_id(&self) -> String {
        self.replicator
            .consensus()
            .and_then(|c| c.leader_id())
            .unwrap_or_default()
    }

    /// Admit `name` as a voter. A member that comes back on a new transport
    /// address is removed first so raft forgets the stale one.
    pub async fn join(&self, name: &str, http_addr: &str, tcp_addr: &str) -> AppResult<Node> {
        let consensus = self.consensus()?;
        if let Some(existing) = self.replicator.store().find_node(name)?
            && existing.tcp_addr != tcp_addr
        {
            tracing::info!(node = %name, old = %existing.tcp_addr, new = %tcp_addr, "transport address changed");
            if let Err(e) = consensus.remove_peer(name).await {
                tracing::warn!(node = %name, error = %e, "failed to remove stale peer");
            }
        }

        let node = ensure_node(&self.replicator, &Node::new(name, http_addr, tcp_addr)).await?;
        consensus.add_voter(name, tcp_addr).await?;
        tracing::info!(node = %name, %http_addr, %tcp_addr, "node joined");
        Ok(node)
    }

    pub async fn remove(&self, name: &str) -> AppResult<()> {
        self.consensus()?.remove_peer(name).await?;
        tracing::info!(node = %name, "node removed");
        Ok(())
    }

    pub fn list_nodes(&self) -> AppResult<Vec<Node>> {
        self.replicator.store().list_nodes()
    }

    /// Every raft member, with addresses and machine number from the registry.
    pub fn details(&self) -> AppResult<Vec<NodeDetail>> {
        let members = self.consensus()?.members();
        let store = self.replicator.store();
        members
            .into_iter()
            .map(|member| {
                let node = store.find_node(&member.name)?;
                Ok(NodeDetail {
                    http_addr: node.as_ref().map(|n| n.http_addr.clone()).unwrap_or_default(),
                    machine_num: node.as_ref().map(|n| n.machine_num).unwrap_or_default(),
                    name: member.name,
                    tcp_addr: member.tcp_addr,
                    voter: member.voter,
                    leader: member.leader,
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::command::RaftCommand;
    use crate::testing::{RecordingConsensus, SchedulerFixture};

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_join_registers_and_adds_voter() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        let service = NodeService::new(f.scheduler.replicator().clone());

        let node = service
            .join("node-b", "10.0.0.2:8080", "10.0.0.2:17000")
            .await
            .unwrap();
        assert_eq!(node.machine_num, 1);

        let consensus = f.consensus.as_ref().unwrap();
        assert_eq!(
            consensus.voters(),
            vec![("node-b".to_string(), "10.0.0.2:17000".to_string())]
        );
        assert!(consensus.removed().is_empty());
        assert!(matches!(f.proposed()[0], RaftCommand::SaveNode(ref n) if n.name == "node-b"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_rejoin_on_new_transport_removes_stale_peer() {
        let f = SchedulerFixture::cluster(RecordingConsensus::new()).await;
        let service = NodeService::new(f.scheduler.replicator().clone());
        service
            .join("node-b", "10.0.0.2:8080", "10.0.0.2:17000")
            .await
            .unwrap();

        // same transport: no removal
        service
            .join("node-b", "10.0.0.2:8081", "10.0.0.2:17000")
            .await
            .unwrap();
        assert!(f.consensus.as_ref().unwrap().removed().is_empty());

        let node = service
            .join("node-b", "10.0.0.2:8081", "10.0.0.2:17001")
            .await
            .unwrap();
        assert_eq!(f.consensus.as_ref().unwrap().removed(), vec!["node-b".to_string()]);
        assert_eq!(node.machine_num, 1);
        assert_eq!(f.store.find_node("node-b").unwrap().unwrap().tcp_addr, "10.0.0.2:17001");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_details_merge_registry() {
        let consensus = RecordingConsensus::new();
        consensus.set_leader(Some("node-b"), false);
        let f = SchedulerFixture::cluster(consensus).await;
        let service = NodeService::new(f.scheduler.replicator().clone());
        service
            .join("node-b", "10.0.0.2:8080", "10.0.0.2:17000")
            .await
            .unwrap();

        assert_eq!(service.leader_id(), "node-b");
        let details = service.details().unwrap();
        assert_eq!(details.len(), 1);
        assert_eq!(details[0].http_addr, "10.0.0.2:8080");
        assert!(details[0].leader);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_standalone_has_no_membership() {
        let f = SchedulerFixture::standalone().await;
        let service = NodeService::new(f.scheduler.replicator().clone());
        assert_eq!(service.leader_id(), "");
        assert!(matches!(
            service.remove("node-b").await,
            Err(AppError::Cluster { .. })
        ));
    }
}
