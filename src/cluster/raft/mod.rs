//! openraft-backed [`Consensus`].

pub mod log_store;
pub mod network;
pub mod state_machine;
pub mod types;

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use openraft::{ChangeMembers, SnapshotPolicy};
use tokio::sync::watch;

use crate::cluster::command::RaftCommand;
use crate::cluster::consensus::{ClusterMember, Consensus};
use crate::cluster::fsm::Fsm;
use crate::cluster::peer::PeerClient;
use crate::cluster::Role;
use crate::config::ClusterConfig;
use crate::error::{AppError, AppResult};

pub use log_store::LogStore;
pub use network::HttpNetwork;
pub use state_machine::StateMachineStore;
pub use types::{NodeId, Raft, RaftPeer, TypeConfig, node_id};

pub struct RaftConsensus {
    raft: Raft,
    id: NodeId,
    peer: RaftPeer,
    role: Arc<Role>,
    op_timeout: Duration,
}

impl RaftConsensus {
    pub async fn start(
        cluster: &ClusterConfig,
        tcp_addr: &str,
        fsm: Fsm,
        role: Arc<Role>,
        client: PeerClient,
    ) -> AppResult<Self> {
        let config = openraft::Config {
            cluster_name: "cronhive".to_string(),
            heartbeat_interval: cluster.heartbeat_interval_ms,
            election_timeout_min: cluster.election_timeout_min_ms,
            election_timeout_max: cluster.election_timeout_max_ms,
            snapshot_policy: SnapshotPolicy::Never,
            max_in_snapshot_log_to_keep: cluster.trailing_logs,
            ..Default::default()
        }
        .validate()
        .map_err(|e| AppError::consensus("validate raft config", e))?;

        let id = node_id(&cluster.node_name);
        let kv = fsm.store().kv().clone();
        let raft = Raft::new(
            id,
            Arc::new(config),
            HttpNetwork::new(client),
            LogStore::new(kv),
            StateMachineStore::new(fsm),
        )
        .await
        .map_err(|e| AppError::consensus("start raft", e))?;

        tracing::info!(
            target: "openraft",
            node = %cluster.node_name,
            id,
            tcp_addr,
            "raft node started"
        );
        Ok(Self {
            raft,
            id,
            peer: RaftPeer::new(cluster.node_name.clone(), tcp_addr),
            role,
            op_timeout: cluster.op_timeout(),
        })
    }

    pub fn raft(&self) -> &Raft {
        &self.raft
    }

    /// Form a single-member group. A node that already holds raft state
    /// keeps it.
    pub async fn bootstrap_single(&self) -> AppResult<()> {
        let members = BTreeMap::from([(self.id, self.peer.clone())]);
        match self.raft.initialize(members).await {
            Ok(()) => tracing::info!(node = %self.peer, "bootstrapped new cluster"),
            Err(e) => tracing::warn!(node = %self.peer, error = %e, "raft already initialized"),
        }
        Ok(())
    }

    /// Single-slot feed of leadership changes; a rapid flap can coalesce into
    /// its final state.
    pub fn leadership_events(&self) -> watch::Receiver<bool> {
        let (tx, rx) = watch::channel(false);
        let mut metrics = self.raft.metrics();
        let id = self.id;
        tokio::spawn(async move {
            let mut leader = false;
            loop {
                let now_leader = metrics.borrow_and_update().current_leader == Some(id);
                if now_leader != leader {
                    leader = now_leader;
                    if tx.send(leader).is_err() {
                        break;
                    }
                }
                if metrics.changed().await.is_err() {
                    break;
                }
            }
        });
        rx
    }

    /// Snapshot every `interval` once `threshold` entries were applied since
    /// the previous snapshot.
    pub fn spawn_snapshot_ticker(&self, interval: Duration, threshold: u64) {
        let raft = self.raft.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let (applied, snapshot) = {
                    let metrics = raft.metrics();
                    let m = metrics.borrow();
                    (
                        m.last_applied.map(|l| l.index).unwrap_or(0),
                        m.snapshot.map(|l| l.index).unwrap_or(0),
                    )
                };
                if applied.saturating_sub(snapshot) < threshold {
                    continue;
                }
                if let Err(e) = raft.trigger().snapshot().await {
                    tracing::error!(target: "openraft", error = %e, "snapshot trigger failed");
                    break;
                }
            }
        });
    }

    pub async fn shutdown(&self) {
        if let Err(e) = self.raft.shutdown().await {
            tracing::warn!(target: "openraft", error = %e, "raft shutdown failed");
        }
    }

    async fn within<T, E, F>(&self, operation: &str, fut: F) -> AppResult<T>
    where
        F: Future<Output = Result<T, E>>,
        E: std::error::Error + Send + Sync + 'static,
    {
        match tokio::time::timeout(self.op_timeout, fut).await {
            Ok(result) => result.map_err(|e| AppError::consensus(operation, e)),
            Err(_) => Err(AppError::consensus(
                operation,
                anyhow::anyhow!("timed out after {:?}", self.op_timeout),
            )),
        }
    }

    fn membership(&self) -> Vec<(NodeId, RaftPeer, bool)> {
        let metrics = self.raft.metrics();
        let m = metrics.borrow();
        state_machine::membership_peers(&m.membership_config)
    }
}

#[async_trait]
impl Consensus for RaftConsensus {
    async fn propose(&self, command: &RaftCommand) -> AppResult<()> {
        let envelope = command.to_envelope()?;
        tracing::info!(command = command.name(), code = envelope.code, "proposing command");
        self.within("propose", self.raft.client_write(envelope))
            .await
            .map(|_| ())
    }

    async fn add_voter(&self, name: &str, tcp_addr: &str) -> AppResult<()> {
        let id = node_id(name);
        tracing::info!(node = name, tcp_addr, "adding voter");
        self.within(
            "add learner",
            self.raft.add_learner(id, RaftPeer::new(name, tcp_addr), true),
        )
        .await?;
        self.within(
            "promote voter",
            self.raft
                .change_membership(ChangeMembers::AddVoterIds(BTreeSet::from([id])), false),
        )
        .await?;
        Ok(())
    }

    async fn remove_peer(&self, name: &str) -> AppResult<()> {
        let id = node_id(name);
        if !self.membership().iter().any(|(member, _, _)| *member == id) {
            return Ok(());
        }
        tracing::info!(node = name, "removing peer");
        self.within(
            "remove peer",
            self.raft
                .change_membership(ChangeMembers::RemoveVoters(BTreeSet::from([id])), false),
        )
        .await?;
        Ok(())
    }

    fn leader_id(&self) -> Option<String> {
        if self.role.is_leader() {
            return Some(self.peer.name.clone());
        }
        let leader = self.raft.metrics().borrow().current_leader?;
        self.membership()
            .into_iter()
            .find(|(id, _, _)| *id == leader)
            .map(|(_, peer, _)| peer.name)
    }

    fn is_leader(&self) -> bool {
        self.raft.metrics().borrow().current_leader == Some(self.id)
    }

    fn members(&self) -> Vec<ClusterMember> {
        let leader = self.raft.metrics().borrow().current_leader;
        self.membership()
            .into_iter()
            .map(|(id, peer, voter)| ClusterMember {
                name: peer.name,
                tcp_addr: peer.addr,
                voter,
                leader: leader == Some(id),
            })
            .collect()
    }
}
