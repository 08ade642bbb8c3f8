//! Raft log and vote persisted in the `RaftLog` / `RaftState` buckets.

use std::fmt::Debug;
use std::ops::{Bound, RangeBounds};
use std::sync::Arc;

use openraft::storage::{LogFlushed, LogState, RaftLogStorage};
use openraft::{OptionalSend, RaftLogReader, StorageIOError};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cluster::raft::types::{Entry, LogId, StorageError, TypeConfig, Vote};
use crate::error::{AppError, AppResult};
use crate::store::{Bucket, KvStore, WriteOp, u64_key};

const KEY_VOTE: &[u8] = b"vote";
const KEY_COMMITTED: &[u8] = b"committed";
const KEY_LAST_PURGED: &[u8] = b"last_purged";

/// Raft records are stored as JSON; their serde shape belongs to openraft.
pub(crate) fn to_json<T: Serialize>(entity: &str, value: &T) -> AppResult<Vec<u8>> {
    serde_json::to_vec(value).map_err(|e| AppError::serialization(entity, e))
}

pub(crate) fn from_json<T: DeserializeOwned>(entity: &str, bytes: &[u8]) -> AppResult<T> {
    serde_json::from_slice(bytes).map_err(|e| AppError::serialization(entity, e))
}

pub(crate) fn read_state<T: DeserializeOwned>(
    kv: &dyn KvStore,
    key: &[u8],
) -> AppResult<Option<T>> {
    kv.get(Bucket::RaftState, key)?
        .map(|bytes| from_json("raft state", &bytes))
        .transpose()
}

pub(crate) fn state_op<T: Serialize>(key: &[u8], value: &T) -> AppResult<WriteOp> {
    Ok(WriteOp::put(Bucket::RaftState, key, to_json("raft state", value)?))
}

fn key_bound(bound: Bound<&u64>) -> Bound<Vec<u8>> {
    match bound {
        Bound::Included(index) => Bound::Included(u64_key(*index).to_vec()),
        Bound::Excluded(index) => Bound::Excluded(u64_key(*index).to_vec()),
        Bound::Unbounded => Bound::Unbounded,
    }
}

#[derive(Clone)]
pub struct LogStore {
    kv: Arc<dyn KvStore>,
}

impl LogStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    fn entries(&self, bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> AppResult<Vec<Entry>> {
        self.kv
            .range(Bucket::RaftLog, bounds)?
            .into_iter()
            .map(|(_, bytes)| from_json("raft log entry", &bytes))
            .collect()
    }

    fn last_log_id(&self) -> AppResult<Option<LogId>> {
        let last = self
            .kv
            .range(Bucket::RaftLog, (Bound::Unbounded, Bound::Unbounded))?
            .pop();
        Ok(match last {
            Some((_, bytes)) => Some(from_json::<Entry>("raft log entry", &bytes)?.log_id),
            None => None,
        })
    }

    fn delete_range(&self, bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>)) -> AppResult<Vec<WriteOp>> {
        Ok(self
            .kv
            .range(Bucket::RaftLog, bounds)?
            .into_iter()
            .map(|(key, _)| WriteOp::delete(Bucket::RaftLog, key))
            .collect())
    }
}

fn read_logs(e: AppError) -> StorageError {
    StorageIOError::read_logs(&e).into()
}

fn write_logs(e: AppError) -> StorageError {
    StorageIOError::write_logs(&e).into()
}

impl RaftLogReader<TypeConfig> for LogStore {
    async fn try_get_log_entries<RB: RangeBounds<u64> + Clone + Debug + OptionalSend>(
        &mut self,
        range: RB,
    ) -> Result<Vec<Entry>, StorageError> {
        let bounds = (key_bound(range.start_bound()), key_bound(range.end_bound()));
        self.entries(bounds).map_err(read_logs)
    }
}

impl RaftLogStorage<TypeConfig> for LogStore {
    type LogReader = Self;

    async fn get_log_state(&mut self) -> Result<LogState<TypeConfig>, StorageError> {
        let last_purged: Option<LogId> =
            read_state(self.kv.as_ref(), KEY_LAST_PURGED).map_err(read_logs)?;
        let last = self.last_log_id().map_err(read_logs)?.or(last_purged);
        Ok(LogState {
            last_purged_log_id: last_purged,
            last_log_id: last,
        })
    }

    async fn get_log_reader(&mut self) -> Self::LogReader {
        self.clone()
    }

    async fn save_vote(&mut self, vote: &Vote) -> Result<(), StorageError> {
        state_op(KEY_VOTE, vote)
            .and_then(|op| self.kv.transaction(vec![op]))
            .map_err(|e| StorageIOError::write_vote(&e).into())
    }

    async fn read_vote(&mut self) -> Result<Option<Vote>, StorageError> {
        read_state(self.kv.as_ref(), KEY_VOTE).map_err(|e| StorageIOError::read_vote(&e).into())
    }

    async fn save_committed(&mut self, committed: Option<LogId>) -> Result<(), StorageError> {
        state_op(KEY_COMMITTED, &committed)
            .and_then(|op| self.kv.transaction(vec![op]))
            .map_err(write_logs)
    }

    async fn read_committed(&mut self) -> Result<Option<LogId>, StorageError> {
        Ok(read_state::<Option<LogId>>(self.kv.as_ref(), KEY_COMMITTED)
            .map_err(read_logs)?
            .flatten())
    }

    async fn append<I>(&mut self, entries: I, callback: LogFlushed<TypeConfig>) -> Result<(), StorageError>
    where
        I: IntoIterator<Item = Entry> + OptionalSend,
        I::IntoIter: OptionalSend,
    {
        let ops = entries
            .into_iter()
            .map(|entry| {
                Ok(WriteOp::put(
                    Bucket::RaftLog,
                    u64_key(entry.log_id.index),
                    to_json("raft log entry", &entry)?,
                ))
            })
            .collect::<AppResult<Vec<_>>>()
            .map_err(write_logs)?;
        // the kv transaction is synced before it returns
        self.kv.transaction(ops).map_err(write_logs)?;
        callback.log_io_completed(Ok(()));
        Ok(())
    }

    async fn truncate(&mut self, log_id: LogId) -> Result<(), StorageError> {
        tracing::debug!(target: "openraft", %log_id, "truncating raft log");
        let ops = self
            .delete_range((Bound::Included(u64_key(log_id.index).to_vec()), Bound::Unbounded))
            .map_err(write_logs)?;
        self.kv.transaction(ops).map_err(write_logs)
    }

    async fn purge(&mut self, log_id: LogId) -> Result<(), StorageError> {
        tracing::debug!(target: "openraft", %log_id, "purging raft log");
        let mut ops = vec![state_op(KEY_LAST_PURGED, &log_id).map_err(write_logs)?];
        ops.extend(
            self.delete_range((Bound::Unbounded, Bound::Included(u64_key(log_id.index).to_vec())))
                .map_err(write_logs)?,
        );
        self.kv.transaction(ops).map_err(write_logs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::command::RaftCommand;
    use crate::store::MemoryKvStore;
    use openraft::{CommittedLeaderId, EntryPayload};

    fn entry(term: u64, index: u64) -> Entry {
        Entry {
            log_id: LogId::new(CommittedLeaderId::new(term, 1), index),
            payload: EntryPayload::Normal(RaftCommand::DeleteJob(index).to_envelope().unwrap()),
        }
    }

    fn seed(store: &LogStore, range: std::ops::RangeInclusive<u64>) {
        let ops = range
            .map(|i| {
                WriteOp::put(
                    Bucket::RaftLog,
                    u64_key(i),
                    to_json("raft log entry", &entry(1, i)).unwrap(),
                )
            })
            .collect();
        store.kv.transaction(ops).unwrap();
    }

    #[tokio::test]
    async fn test_read_range_and_state() {
        let mut store = LogStore::new(Arc::new(MemoryKvStore::new()));
        seed(&store, 1..=5);

        let entries = store.try_get_log_entries(2..4).await.unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.log_id.index).collect();
        assert_eq!(indexes, vec![2, 3]);

        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.map(|l| l.index), Some(5));
        assert_eq!(state.last_purged_log_id, None);
    }

    #[tokio::test]
    async fn test_truncate_and_purge() {
        let mut store = LogStore::new(Arc::new(MemoryKvStore::new()));
        seed(&store, 1..=6);

        store.truncate(entry(1, 5).log_id).await.unwrap();
        store.purge(entry(1, 2).log_id).await.unwrap();

        let entries = store.try_get_log_entries(..).await.unwrap();
        let indexes: Vec<u64> = entries.iter().map(|e| e.log_id.index).collect();
        assert_eq!(indexes, vec![3, 4]);
        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_purged_log_id.map(|l| l.index), Some(2));
    }

    #[tokio::test]
    async fn test_purged_everything_keeps_last_id() {
        let mut store = LogStore::new(Arc::new(MemoryKvStore::new()));
        seed(&store, 1..=3);
        store.purge(entry(1, 3).log_id).await.unwrap();
        let state = store.get_log_state().await.unwrap();
        assert_eq!(state.last_log_id.map(|l| l.index), Some(3));
    }

    #[tokio::test]
    async fn test_vote_round_trip() {
        let mut store = LogStore::new(Arc::new(MemoryKvStore::new()));
        assert_eq!(store.read_vote().await.unwrap(), None);
        let vote = Vote::new(3, 7);
        store.save_vote(&vote).await.unwrap();
        assert_eq!(store.read_vote().await.unwrap(), Some(vote));
    }
}
