//! Applies committed commands to the entity store and produces or restores
//! versioned snapshots.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cluster::Role;
use crate::cluster::command::{CommandEnvelope, CommandResponse, RaftCommand};
use crate::error::AppResult;
use crate::store::{EntityStore, ReplicatedState, decode, encode};
use crate::utils::time::now_millis;

/// Full copy of the replicated entities. `version` is the unix-millisecond
/// instant the snapshot was taken.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub version: i64,
    pub state: ReplicatedState,
}

impl SnapshotPayload {
    pub fn to_bytes(&self) -> AppResult<Vec<u8>> {
        encode("snapshot", self)
    }

    pub fn from_bytes(bytes: &[u8]) -> AppResult<Self> {
        decode("snapshot", bytes)
    }
}

#[derive(Clone)]
pub struct Fsm {
    store: EntityStore,
    role: Arc<Role>,
}

impl Fsm {
    pub fn new(store: EntityStore, role: Arc<Role>) -> Self {
        Self { store, role }
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    /// The leader wrote every mutation locally before proposing it, so its
    /// own entries are not applied a second time.
    pub fn apply(&self, envelope: &CommandEnvelope) -> AppResult<CommandResponse> {
        if self.role.is_leader() {
            return Ok(CommandResponse { applied: false });
        }

        let command = match envelope.decode() {
            Ok(Some(command)) => command,
            Ok(None) => {
                tracing::warn!(code = envelope.code, "ignoring unknown command");
                return Ok(CommandResponse { applied: false });
            }
            Err(e) => {
                tracing::error!(code = envelope.code, error = %e, "undecodable command");
                return Ok(CommandResponse { applied: false });
            }
        };

        tracing::info!(command = command.name(), "applying replicated command");
        self.apply_command(command)?;
        Ok(CommandResponse { applied: true })
    }

    fn apply_command(&self, command: RaftCommand) -> AppResult<()> {
        match command {
            RaftCommand::InsertJob(job) => self.store.cascade_insert_job(&job),
            RaftCommand::UpdateJob(job) => self.store.update_job(&job),
            RaftCommand::DeleteJob(id) => self.store.cascade_delete_job(id),
            RaftCommand::SaveTriggered(triggered) => self.store.save_triggered(&triggered),
            RaftCommand::SaveNode(node) => self.store.save_node(&node),
            RaftCommand::SaveUser(user) => self.store.save_user(&user),
            RaftCommand::DeleteUser(id) => self.store.delete_user(id),
            RaftCommand::SaveAlarmConfig(config) => self.store.save_alarm_config(&config),
            RaftCommand::NegateFirstStart => self.store.negate_first_start(),
        }
    }

    /// Capture every replicated bucket and record the new version locally.
    pub fn snapshot(&self) -> AppResult<SnapshotPayload> {
        let payload = SnapshotPayload {
            version: now_millis().max(self.store.snapshot_version()? + 1),
            state: self.store.export_replicated()?,
        };
        self.store.set_snapshot_version(payload.version)?;
        tracing::info!(version = payload.version, "snapshot taken");
        Ok(payload)
    }

    /// Replace local state with `payload` unless it is not newer than what
    /// this node already holds. Returns whether anything changed.
    pub fn restore(&self, payload: &SnapshotPayload) -> AppResult<bool> {
        let current = self.store.snapshot_version()?;
        if payload.version <= current {
            tracing::info!(
                current,
                incoming = payload.version,
                "snapshot not newer than local state, skipping restore"
            );
            return Ok(false);
        }

        self.store.replace_replicated(&payload.state)?;
        self.store.set_snapshot_version(payload.version)?;
        tracing::info!(version = payload.version, "snapshot restored");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RunMode;
    use crate::models::{AlarmConfig, Job, Node, Triggered};
    use crate::store::MemoryKvStore;
    use proptest::prelude::*;

    fn fsm() -> (Fsm, Arc<Role>) {
        let role = Arc::new(Role::new(RunMode::Cluster));
        let store = EntityStore::new(Arc::new(MemoryKvStore::new()));
        (Fsm::new(store, role.clone()), role)
    }

    fn job(id: u64) -> Job {
        Job {
            id,
            name: format!("job-{}", id),
            cron: "*/5 * * * * *".to_string(),
            ..Default::default()
        }
    }

    #[test]
    fn test_follower_applies_commands() {
        let (fsm, _) = fsm();
        let envelope = RaftCommand::InsertJob(job(1)).to_envelope().unwrap();
        assert!(fsm.apply(&envelope).unwrap().applied);
        assert_eq!(fsm.store().get_job(1).unwrap().name, "job-1");
        assert_eq!(fsm.store().get_triggered(1).unwrap(), Triggered::new(1));

        let envelope = RaftCommand::DeleteJob(1).to_envelope().unwrap();
        fsm.apply(&envelope).unwrap();
        assert!(fsm.store().find_job(1).unwrap().is_none());
        assert!(fsm.store().find_triggered(1).unwrap().is_none());
    }

    #[test]
    fn test_leader_skips_its_own_entries() {
        let (fsm, role) = fsm();
        role.set_leader(true);
        let envelope = RaftCommand::InsertJob(job(2)).to_envelope().unwrap();
        assert!(!fsm.apply(&envelope).unwrap().applied);
        assert!(fsm.store().find_job(2).unwrap().is_none());
    }

    #[test]
    fn test_unknown_and_corrupt_entries_are_ignored() {
        let (fsm, _) = fsm();
        let unknown = CommandEnvelope { code: 7, body: vec![] };
        assert!(!fsm.apply(&unknown).unwrap().applied);
        let corrupt = CommandEnvelope { code: 11, body: vec![9] };
        assert!(!fsm.apply(&corrupt).unwrap().applied);
    }

    #[test]
    fn test_first_start_marker() {
        let (fsm, _) = fsm();
        assert!(fsm.store().is_first_start().unwrap());
        fsm.apply(&RaftCommand::NegateFirstStart.to_envelope().unwrap())
            .unwrap();
        assert!(!fsm.store().is_first_start().unwrap());
    }

    #[test]
    fn test_snapshot_versions_increase() {
        let (fsm, _) = fsm();
        let first = fsm.snapshot().unwrap();
        let second = fsm.snapshot().unwrap();
        assert!(second.version > first.version);
        assert_eq!(fsm.store().snapshot_version().unwrap(), second.version);
    }

    #[test]
    fn test_snapshot_payload_bytes() {
        let (fsm, _) = fsm();
        fsm.store().cascade_insert_job(&job(4)).unwrap();
        let payload = fsm.snapshot().unwrap();
        let decoded = SnapshotPayload::from_bytes(&payload.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, payload);
    }

    fn state_with(jobs: &[u64]) -> ReplicatedState {
        ReplicatedState {
            jobs: jobs.iter().map(|id| job(*id)).collect(),
            triggered: jobs.iter().map(|id| Triggered::new(*id)).collect(),
            nodes: vec![Node::new("n1", "10.0.0.1:8080", "10.0.0.1:17070")],
            users: vec![],
            alarm_config: AlarmConfig {
                sys_alarm_email: "ops@example.com".to_string(),
                webhook_url: String::new(),
            },
        }
    }

    proptest! {
        #[test]
        fn prop_restore_only_when_newer(current in 1i64..1_000_000, incoming in 0i64..2_000_000) {
            let (fsm, _) = fsm();
            fsm.store().replace_replicated(&state_with(&[1, 2])).unwrap();
            fsm.store().set_snapshot_version(current).unwrap();
            let before = fsm.store().export_replicated().unwrap();

            let payload = SnapshotPayload { version: incoming, state: state_with(&[7]) };
            let restored = fsm.restore(&payload).unwrap();
            let after = fsm.store().export_replicated().unwrap();

            if incoming > current {
                prop_assert!(restored);
                prop_assert_eq!(after, payload.state);
                prop_assert_eq!(fsm.store().snapshot_version().unwrap(), incoming);
            } else {
                prop_assert!(!restored);
                prop_assert_eq!(after, before);
                prop_assert_eq!(fsm.store().snapshot_version().unwrap(), current);
            }
        }
    }

    #[test]
    fn test_repeated_restore_is_idempotent() {
        let (fsm, _) = fsm();
        let payload = SnapshotPayload {
            version: 10,
            state: state_with(&[3]),
        };
        assert!(fsm.restore(&payload).unwrap());
        fsm.store().save_triggered(&Triggered { id: 3, times: 5, prev_time: 1, next_time: 2 }).unwrap();
        assert!(!fsm.restore(&payload).unwrap());
        assert_eq!(fsm.store().get_triggered(3).unwrap().times, 5);
    }
}
