use async_trait::async_trait;
use serde::Serialize;
use utoipa::ToSchema;

use crate::cluster::command::RaftCommand;
use crate::error::AppResult;

/// A member of the consensus group as seen from this node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ClusterMember {
    pub name: String,
    pub tcp_addr: String,
    pub voter: bool,
    pub leader: bool,
}

/// The consensus operations the scheduler needs. Proposals block until the
/// command is committed or the operation timeout elapses.
#[async_trait]
pub trait Consensus: Send + Sync {
    async fn propose(&self, command: &RaftCommand) -> AppResult<()>;

    /// Add `name` as a voting member reachable at `tcp_addr`.
    async fn add_voter(&self, name: &str, tcp_addr: &str) -> AppResult<()>;

    async fn remove_peer(&self, name: &str) -> AppResult<()>;

    /// Name of the current leader, if one is known.
    fn leader_id(&self) -> Option<String>;

    fn is_leader(&self) -> bool;

    fn members(&self) -> Vec<ClusterMember>;
}
