//! Local write, then proposal to the consensus group.
//!
//! Every mutation is applied to this node's store first. In cluster mode the
//! same mutation is then proposed; a failed proposal is returned to the
//! caller and the local write stays in place.

use std::sync::Arc;

use crate::cluster::command::RaftCommand;
use crate::cluster::consensus::Consensus;
use crate::error::AppResult;
use crate::models::Triggered;
use crate::store::EntityStore;

#[derive(Clone)]
pub struct Replicator {
    store: EntityStore,
    consensus: Option<Arc<dyn Consensus>>,
}

impl Replicator {
    /// `consensus` is `None` in standalone mode.
    pub fn new(store: EntityStore, consensus: Option<Arc<dyn Consensus>>) -> Self {
        Self { store, consensus }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn consensus(&self) -> Option<&Arc<dyn Consensus>> {
        self.consensus.as_ref()
    }

    pub async fn submit(&self, command: RaftCommand) -> AppResult<()> {
        match &self.consensus {
            Some(consensus) => consensus.propose(&command).await,
            None => Ok(()),
        }
    }

    /// Move a job's schedule cursor. The fire count grows only for a real
    /// timestamp pair.
    pub async fn update_triggered(&self, id: u64, prev: i64, next: i64) -> AppResult<Triggered> {
        let mut triggered = self.store.get_triggered(id)?;
        triggered.record(prev, next);
        self.store.save_triggered(&triggered)?;
        self.submit(RaftCommand::SaveTriggered(triggered)).await?;
        Ok(triggered)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Job;
    use crate::store::MemoryKvStore;
    use crate::testing::RecordingConsensus;

    #[tokio::test]
    async fn test_standalone_writes_locally_only() {
        let store = EntityStore::new(Arc::new(MemoryKvStore::new()));
        store
            .cascade_insert_job(&Job { id: 1, ..Default::default() })
            .unwrap();
        let replicator = Replicator::new(store.clone(), None);

        let triggered = replicator.update_triggered(1, 100, 160).await.unwrap();
        assert_eq!(triggered.times, 1);
        assert_eq!(store.get_triggered(1).unwrap().next_time, 160);
    }

    #[tokio::test]
    async fn test_cluster_proposes_after_local_write() {
        let store = EntityStore::new(Arc::new(MemoryKvStore::new()));
        store
            .cascade_insert_job(&Job { id: 2, ..Default::default() })
            .unwrap();
        let consensus = Arc::new(RecordingConsensus::failing());
        let replicator = Replicator::new(store.clone(), Some(consensus.clone()));

        assert!(replicator.update_triggered(2, 10, 20).await.is_err());
        // the local write is not rolled back
        assert_eq!(store.get_triggered(2).unwrap().prev_time, 10);
        assert_eq!(consensus.proposed().len(), 1);
    }
}
