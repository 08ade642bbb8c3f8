//! Reaction to leadership changes.
//!
//! Gaining leadership seeds the log on a brand new cluster, registers this
//! node, points the id generator at its machine number and starts every job
//! timer. Losing it stops them all. Standalone nodes go through the same
//! registration once at startup.

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cluster::command::RaftCommand;
use crate::cluster::Replicator;
use crate::error::AppResult;
use crate::models::Node;
use crate::scheduler::Scheduler;

pub struct Leadership {
    scheduler: Scheduler,
    /// This node as it should appear in the node registry
    identity: Node,
}

impl Leadership {
    pub fn new(scheduler: Scheduler, identity: Node) -> Self {
        Self { scheduler, identity }
    }

    /// Serially apply every change seen on `events` until cancelled.
    pub fn spawn(self, mut events: watch::Receiver<bool>, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            tracing::info!(target: "openraft", "leadership listener started");
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    changed = events.changed() => {
                        if changed.is_err() {
                            break;
                        }
                        let leader = *events.borrow_and_update();
                        self.on_change(leader).await;
                    }
                }
            }
            tracing::info!(target: "openraft", "leadership listener stopped");
        })
    }

    pub async fn on_change(&self, leader: bool) {
        if leader {
            tracing::info!(target: "openraft", node = %self.identity.name, "this node is now the leader");
            if let Err(e) = self.become_leader().await {
                tracing::error!(target: "openraft", error = %e, "leader initialisation failed");
            }
        } else {
            tracing::info!(target: "openraft", node = %self.identity.name, "this node is now a follower");
            self.scheduler.role().set_leader(false);
            self.scheduler.delete_schedulers().await;
        }
    }

    async fn become_leader(&self) -> AppResult<()> {
        self.scheduler.role().set_leader(true);
        let replicator = self.scheduler.replicator();
        if let Err(e) = seed_log(replicator).await {
            tracing::error!(target: "openraft", error = %e, "failed to seed the log");
        }
        start_scheduling(&self.scheduler, &self.identity).await
    }
}

/// Register `identity`, bind the id generator to its machine number and
/// start every job. Used by a new leader and by a standalone node.
pub async fn start_scheduling(scheduler: &Scheduler, identity: &Node) -> AppResult<()> {
    let node = ensure_node(scheduler.replicator(), identity).await?;
    scheduler.ids().set_machine_id(node.machine_num);
    tracing::info!(node = %node.name, machine_num = node.machine_num, "id generator ready");
    scheduler.init_schedulers().await?;
    Ok(())
}

/// The registry record for `identity`, inserted on first sight and refreshed
/// when its addresses changed.
pub async fn ensure_node(replicator: &Replicator, identity: &Node) -> AppResult<Node> {
    let store = replicator.store();
    let node = match store.find_node(&identity.name)? {
        None => store.insert_node(identity)?,
        Some(existing) if existing.same_addresses(identity) => return Ok(existing),
        Some(existing) => {
            let updated = Node {
                http_addr: identity.http_addr.clone(),
                tcp_addr: identity.tcp_addr.clone(),
                ..existing
            };
            store.save_node(&updated)?;
            updated
        }
    };
    replicator.submit(RaftCommand::SaveNode(node.clone())).await?;
    Ok(node)
}

/// On the first start of a cluster that has never snapshotted, replay the
/// local state into the log so followers receive it. Returns the number of
/// commands proposed.
pub async fn seed_log(replicator: &Replicator) -> AppResult<usize> {
    let store = replicator.store();
    if store.snapshot_version()? > 0 || !store.is_first_start()? {
        return Ok(0);
    }

    let mut commands: Vec<RaftCommand> = Vec::new();
    commands.extend(store.list_jobs()?.into_iter().map(RaftCommand::InsertJob));
    commands.extend(
        store
            .list_triggered()?
            .into_iter()
            .map(RaftCommand::SaveTriggered),
    );
    commands.extend(store.list_nodes()?.into_iter().map(RaftCommand::SaveNode));
    commands.extend(store.list_users()?.into_iter().map(RaftCommand::SaveUser));
    commands.push(RaftCommand::SaveAlarmConfig(store.alarm_config()?));
    commands.push(RaftCommand::NegateFirstStart);

    let count = commands.len();
    for command in commands {
        replicator.submit(command).await?;
    }
    // the leader does not apply its own entries
    store.negate_first_start()?;
    tracing::info!(target: "openraft", commands = count, "log seeded from local state");
    Ok(count)
}
