//! Joins an existing cluster or forms a new one.
//!
//! Every configured peer is probed concurrently for the leader's name. The
//! first answer within the detect timeout is joined; with no answer this
//! node initialises a single-member group.

use std::sync::Arc;

use reqwest::StatusCode;
use tokio::net::TcpListener;
use tokio::sync::watch;
use tokio::task::JoinSet;

use crate::api::routes::transport_router;
use crate::cluster::fsm::Fsm;
use crate::cluster::peer::PeerClient;
use crate::cluster::raft::RaftConsensus;
use crate::cluster::Role;
use crate::config::{ClusterConfig, Settings};
use crate::error::{AppError, AppResult};
use crate::store::{Bucket, EntityStore, KvStore};
use crate::utils::net::{free_port, host_of};

pub const LEADER_ID_PATH: &str = "/cluster/leader_id";

pub struct ClusterNode {
    pub consensus: Arc<RaftConsensus>,
    pub leadership: watch::Receiver<bool>,
    pub http_addr: String,
    pub tcp_addr: String,
}

pub async fn bootstrap(
    settings: &Settings,
    store: &EntityStore,
    fsm: Fsm,
    role: Arc<Role>,
) -> AppResult<ClusterNode> {
    let cluster = &settings.cluster;
    let http_addr = cluster
        .current_http_addr()
        .ok_or_else(|| AppError::cluster(format!("node '{}' is not in cluster.nodes", cluster.node_name)))?
        .to_string();
    let tcp_port = resolve_tcp_port(cluster.tcp_port, store)?;
    let tcp_addr = format!("{}:{}", host_of(&http_addr), tcp_port);
    tracing::info!(node = %cluster.node_name, %tcp_addr, "consensus transport port, check firewall rules");

    reconcile_node_name(store, &cluster.node_name)?;

    let client = PeerClient::new(settings.node.sign_secret_key.clone(), cluster.op_timeout());
    let consensus = Arc::new(
        RaftConsensus::start(cluster, &tcp_addr, fsm, role, client.clone()).await?,
    );
    serve_transport(&tcp_addr, &consensus, &settings.node.sign_secret_key).await?;
    let leadership = consensus.leadership_events();

    match detect_leader(&client, cluster).await? {
        Some(leader_http) => {
            tracing::info!(leader = %leader_http, "cluster leader detected, joining");
            join(&client, &leader_http, &cluster.node_name, &http_addr, &tcp_addr).await?;
        }
        None => {
            tracing::info!("no cluster leader detected, bootstrapping");
            consensus.bootstrap_single().await?;
        }
    }
    consensus.spawn_snapshot_ticker(
        std::time::Duration::from_secs(cluster.snapshot_interval_secs),
        cluster.snapshot_threshold,
    );

    Ok(ClusterNode {
        consensus,
        leadership,
        http_addr,
        tcp_addr,
    })
}

/// Configured port, else the port used last time, else the first free one.
/// The result is persisted so restarts keep the same transport address.
pub fn resolve_tcp_port(configured: u16, store: &EntityStore) -> AppResult<u16> {
    if configured != 0 {
        return Ok(configured);
    }
    let port = match store.last_tcp_port()? {
        Some(port) => port,
        None => free_port().ok_or_else(|| AppError::cluster("no free port for consensus transport"))?,
    };
    store.set_last_tcp_port(port)?;
    Ok(port)
}

/// A renamed node starts with empty raft state; its old identity is gone.
pub fn reconcile_node_name(store: &EntityStore, name: &str) -> AppResult<()> {
    match store.last_node_name()? {
        Some(last) if last == name => {}
        Some(last) => {
            tracing::warn!(previous = %last, current = %name, "node name changed, resetting raft state");
            store.kv().reset(&Bucket::RAFT)?;
            store.set_last_node_name(name)?;
        }
        None => store.set_last_node_name(name)?,
    }
    Ok(())
}

async fn serve_transport(tcp_addr: &str, consensus: &RaftConsensus, secret: &str) -> AppResult<()> {
    let listener = TcpListener::bind(tcp_addr)
        .await
        .map_err(|e| AppError::cluster(format!("failed to bind transport {}: {}", tcp_addr, e)))?;
    let router = transport_router(consensus.raft().clone(), secret.to_string());
    let addr = tcp_addr.to_string();
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(target: "openraft", tcp_addr = %addr, error = %e, "transport server stopped");
        }
    });
    Ok(())
}

/// HTTP address of the leader reported by any peer, or `None` once the
/// detect timeout passes.
pub async fn detect_leader(client: &PeerClient, cluster: &ClusterConfig) -> AppResult<Option<String>> {
    let mut probes = JoinSet::new();
    for node in cluster.nodes.iter().filter(|n| n.name != cluster.node_name) {
        let client = client.clone();
        let addr = node.addr.clone();
        probes.spawn(async move { probe(&client, &addr).await });
    }

    let wait = async {
        while let Some(joined) = probes.join_next().await {
            match joined {
                Ok(Ok(Some(leader))) => {
                    let node = cluster.find_node(&leader).ok_or_else(|| {
                        AppError::cluster(format!("leader '{}' is not in cluster.nodes", leader))
                    })?;
                    return Ok(Some(node.addr.clone()));
                }
                Ok(Ok(None)) => {}
                Ok(Err(e)) => return Err(e),
                Err(e) => tracing::warn!(error = %e, "leader probe task failed"),
            }
        }
        // every probe came back empty; wait out the window like a silent peer
        std::future::pending::<AppResult<Option<String>>>().await
    };

    match tokio::time::timeout(cluster.detect_timeout(), wait).await {
        Ok(result) => result,
        Err(_) => Ok(None),
    }
}

/// `Ok(None)` for an unreachable peer or one without a leader. A 401 means
/// this node's signing secret differs from the cluster's and is fatal.
async fn probe(client: &PeerClient, addr: &str) -> AppResult<Option<String>> {
    let url = format!("http://{}{}", addr, LEADER_ID_PATH);
    tracing::info!(peer = %addr, "probing cluster node");
    let response = match client.get(&url)?.send().await {
        Ok(response) => response,
        Err(e) => {
            tracing::debug!(peer = %addr, error = %e, "peer unreachable");
            return Ok(None);
        }
    };
    match response.status() {
        StatusCode::OK => {}
        StatusCode::UNAUTHORIZED => {
            return Err(AppError::cluster(
                "peer rejected our signature, check node.sign_secret_key on every node",
            ));
        }
        status => {
            tracing::warn!(peer = %addr, %status, "unexpected probe status");
            return Ok(None);
        }
    }
    let leader = response.text().await.unwrap_or_default();
    Ok(Some(leader.trim().to_string()).filter(|l| !l.is_empty()))
}

async fn join(
    client: &PeerClient,
    leader_http: &str,
    name: &str,
    http_addr: &str,
    tcp_addr: &str,
) -> AppResult<()> {
    let url = format!(
        "http://{}/cluster/join/{}/{}/{}",
        leader_http, name, http_addr, tcp_addr
    );
    let response = client
        .get(&url)?
        .send()
        .await
        .map_err(|e| AppError::consensus("join cluster", e))?;
    if response.status() != StatusCode::OK {
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        return Err(AppError::cluster(format!(
            "join refused by {}: {} {}",
            leader_http, status, body
        )));
    }
    tracing::info!(leader = %leader_http, "joined cluster");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ClusterNodeConfig;
    use crate::store::MemoryKvStore;

    fn store() -> EntityStore {
        EntityStore::new(Arc::new(MemoryKvStore::new()))
    }

    #[test]
    fn test_tcp_port_reused_across_restarts() {
        let store = store();
        store.set_last_tcp_port(17099).unwrap();
        assert_eq!(resolve_tcp_port(0, &store).unwrap(), 17099);
        assert_eq!(resolve_tcp_port(18000, &store).unwrap(), 18000);
    }

    #[test]
    fn test_tcp_port_allocated_and_persisted() {
        let store = store();
        let port = resolve_tcp_port(0, &store).unwrap();
        assert!(port >= crate::utils::net::FREE_PORT_START);
        assert_eq!(store.last_tcp_port().unwrap(), Some(port));
    }

    #[test]
    fn test_rename_resets_raft_buckets() {
        let store = store();
        reconcile_node_name(&store, "node-1").unwrap();
        store.kv().put(Bucket::RaftLog, b"k", b"v".to_vec()).unwrap();
        store.kv().put(Bucket::Job, b"j", b"v".to_vec()).unwrap();

        reconcile_node_name(&store, "node-1").unwrap();
        assert_eq!(store.kv().scan(Bucket::RaftLog).unwrap().len(), 1);

        reconcile_node_name(&store, "node-2").unwrap();
        assert!(store.kv().scan(Bucket::RaftLog).unwrap().is_empty());
        assert_eq!(store.kv().scan(Bucket::Job).unwrap().len(), 1);
        assert_eq!(store.last_node_name().unwrap().as_deref(), Some("node-2"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_detect_without_peers_times_out() {
        let cluster = ClusterConfig {
            node_name: "node-1".to_string(),
            nodes: vec![ClusterNodeConfig {
                name: "node-1".to_string(),
                addr: "127.0.0.1:8080".to_string(),
            }],
            detect_timeout_secs: 12,
            ..Default::default()
        };
        let client = PeerClient::new("secret", std::time::Duration::from_secs(1));
        assert_eq!(detect_leader(&client, &cluster).await.unwrap(), None);
    }
}
