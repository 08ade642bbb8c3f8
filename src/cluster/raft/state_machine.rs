//! openraft state machine over [`Fsm`].
//!
//! The last applied log id and membership live in the `RaftState` bucket
//! next to the most recent snapshot, so a restart resumes from where the
//! entity buckets actually are.

use std::io::Cursor;
use std::sync::Arc;

use openraft::storage::RaftStateMachine;
use openraft::{EntryPayload, OptionalSend, RaftSnapshotBuilder, StorageIOError};

use crate::cluster::command::CommandResponse;
use crate::cluster::fsm::{Fsm, SnapshotPayload};
use crate::cluster::raft::log_store::{read_state, state_op};
use crate::cluster::raft::types::{
    Entry, LogId, RaftPeer, Snapshot, SnapshotMeta, StorageError, StoredMembership, TypeConfig,
    NodeId,
};
use crate::error::{AppError, AppResult};
use crate::store::{Bucket, KvStore, WriteOp};

const KEY_APPLIED: &[u8] = b"last_applied";
const KEY_MEMBERSHIP: &[u8] = b"last_membership";
const KEY_SNAPSHOT_META: &[u8] = b"snapshot_meta";
const KEY_SNAPSHOT_DATA: &[u8] = b"snapshot_data";

#[derive(Clone)]
pub struct StateMachineStore {
    fsm: Fsm,
    kv: Arc<dyn KvStore>,
}

impl StateMachineStore {
    pub fn new(fsm: Fsm) -> Self {
        let kv = fsm.store().kv().clone();
        Self { fsm, kv }
    }

    fn applied(&self) -> AppResult<(Option<LogId>, StoredMembership)> {
        let applied: Option<LogId> = read_state(self.kv.as_ref(), KEY_APPLIED)?;
        let membership: StoredMembership =
            read_state(self.kv.as_ref(), KEY_MEMBERSHIP)?.unwrap_or_default();
        Ok((applied, membership))
    }

    fn save_applied(&self, applied: &LogId, membership: &StoredMembership) -> AppResult<()> {
        self.kv.transaction(vec![
            state_op(KEY_APPLIED, applied)?,
            state_op(KEY_MEMBERSHIP, membership)?,
        ])
    }

    fn save_snapshot(&self, meta: &SnapshotMeta, data: Vec<u8>) -> AppResult<()> {
        self.kv.transaction(vec![
            state_op(KEY_SNAPSHOT_META, meta)?,
            WriteOp::put(Bucket::RaftState, KEY_SNAPSHOT_DATA, data),
        ])
    }

    fn current_snapshot(&self) -> AppResult<Option<Snapshot>> {
        let Some(meta) = read_state::<SnapshotMeta>(self.kv.as_ref(), KEY_SNAPSHOT_META)? else {
            return Ok(None);
        };
        let data = self
            .kv
            .get(Bucket::RaftState, KEY_SNAPSHOT_DATA)?
            .unwrap_or_default();
        Ok(Some(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        }))
    }
}

fn read_sm(e: AppError) -> StorageError {
    StorageIOError::read_state_machine(&e).into()
}

fn write_sm(e: AppError) -> StorageError {
    StorageIOError::write_state_machine(&e).into()
}

impl RaftSnapshotBuilder<TypeConfig> for StateMachineStore {
    async fn build_snapshot(&mut self) -> Result<Snapshot, StorageError> {
        let (last_applied, membership) = self.applied().map_err(read_sm)?;
        let payload = self.fsm.snapshot().map_err(read_sm)?;
        let data = payload.to_bytes().map_err(read_sm)?;

        let meta = SnapshotMeta {
            last_log_id: last_applied,
            last_membership: membership,
            snapshot_id: format!(
                "{}-{}",
                last_applied.map(|id| id.index).unwrap_or(0),
                payload.version
            ),
        };
        self.save_snapshot(&meta, data.clone())
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e))?;

        Ok(Snapshot {
            meta,
            snapshot: Box::new(Cursor::new(data)),
        })
    }
}

impl RaftStateMachine<TypeConfig> for StateMachineStore {
    type SnapshotBuilder = Self;

    async fn applied_state(&mut self) -> Result<(Option<LogId>, StoredMembership), StorageError> {
        self.applied().map_err(read_sm)
    }

    async fn apply<I>(&mut self, entries: I) -> Result<Vec<CommandResponse>, StorageError>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let (_, mut membership) = self.applied().map_err(read_sm)?;
        let mut last_applied = None;
        let mut responses = Vec::new();

        for entry in entries {
            last_applied = Some(entry.log_id);
            let response = match entry.payload {
                EntryPayload::Blank => CommandResponse::default(),
                EntryPayload::Normal(ref envelope) => self.fsm.apply(envelope).map_err(write_sm)?,
                EntryPayload::Membership(ref config) => {
                    membership = StoredMembership::new(Some(entry.log_id), config.clone());
                    CommandResponse::default()
                }
            };
            responses.push(response);
        }

        if let Some(applied) = last_applied {
            self.save_applied(&applied, &membership).map_err(write_sm)?;
        }
        Ok(responses)
    }

    async fn get_snapshot_builder(&mut self) -> Self::SnapshotBuilder {
        self.clone()
    }

    async fn begin_receiving_snapshot(&mut self) -> Result<Box<Cursor<Vec<u8>>>, StorageError> {
        Ok(Box::new(Cursor::new(Vec::new())))
    }

    async fn install_snapshot(
        &mut self,
        meta: &SnapshotMeta,
        snapshot: Box<Cursor<Vec<u8>>>,
    ) -> Result<(), StorageError> {
        let data = snapshot.into_inner();
        let payload = SnapshotPayload::from_bytes(&data)
            .map_err(|e| StorageIOError::read_snapshot(Some(meta.signature()), &e))?;
        tracing::info!(
            target: "openraft",
            snapshot_id = %meta.snapshot_id,
            version = payload.version,
            "installing snapshot"
        );
        self.fsm.restore(&payload).map_err(write_sm)?;

        let mut ops = vec![state_op(KEY_MEMBERSHIP, &meta.last_membership).map_err(write_sm)?];
        if let Some(applied) = meta.last_log_id {
            ops.push(state_op(KEY_APPLIED, &applied).map_err(write_sm)?);
        }
        self.kv.transaction(ops).map_err(write_sm)?;
        self.save_snapshot(meta, data)
            .map_err(|e| StorageIOError::write_snapshot(Some(meta.signature()), &e).into())
    }

    async fn get_current_snapshot(&mut self) -> Result<Option<Snapshot>, StorageError> {
        self.current_snapshot()
            .map_err(|e| StorageIOError::read_snapshot(None, &e).into())
    }
}

/// Peers recorded in the last applied membership, keyed by raft id.
pub fn membership_peers(membership: &StoredMembership) -> Vec<(NodeId, RaftPeer, bool)> {
    let config = membership.membership();
    let voters: Vec<NodeId> = config.voter_ids().collect();
    config
        .nodes()
        .map(|(id, peer)| (*id, peer.clone(), voters.contains(id)))
        .collect()
}
