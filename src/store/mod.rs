//! Local key-value persistence.
//!
//! Replicated entities, node-local metadata and the consensus log all live in
//! named buckets of one [`KvStore`]. [`EntityStore`] is the typed view the
//! rest of the crate uses.

mod entities;
mod file;
mod memory;

pub use entities::{EntityStore, ReplicatedState};
pub use file::FileKvStore;
pub use memory::MemoryKvStore;

use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Bucket {
    Job,
    Triggered,
    Node,
    User,
    AlarmConfig,
    Meta,
    RaftLog,
    RaftState,
}

impl Bucket {
    /// Buckets carried by snapshots; a restore replaces exactly these.
    pub const REPLICATED: [Bucket; 5] = [
        Bucket::Job,
        Bucket::Triggered,
        Bucket::Node,
        Bucket::User,
        Bucket::AlarmConfig,
    ];

    pub const RAFT: [Bucket; 2] = [Bucket::RaftLog, Bucket::RaftState];

    pub fn name(&self) -> &'static str {
        match self {
            Bucket::Job => "job",
            Bucket::Triggered => "triggered",
            Bucket::Node => "node",
            Bucket::User => "user",
            Bucket::AlarmConfig => "alarm_config",
            Bucket::Meta => "meta",
            Bucket::RaftLog => "raft_log",
            Bucket::RaftState => "raft_state",
        }
    }
}

/// One mutation inside an atomic transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum WriteOp {
    Put {
        bucket: Bucket,
        key: Vec<u8>,
        value: Vec<u8>,
    },
    Delete {
        bucket: Bucket,
        key: Vec<u8>,
    },
    Reset {
        bucket: Bucket,
    },
}

impl WriteOp {
    pub fn put(bucket: Bucket, key: impl Into<Vec<u8>>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            bucket,
            key: key.into(),
            value,
        }
    }

    pub fn delete(bucket: Bucket, key: impl Into<Vec<u8>>) -> Self {
        WriteOp::Delete {
            bucket,
            key: key.into(),
        }
    }
}

pub type KeyValue = (Vec<u8>, Vec<u8>);

/// Ordered byte-keyed buckets with atomic multi-key writes.
pub trait KvStore: Send + Sync {
    fn get(&self, bucket: Bucket, key: &[u8]) -> AppResult<Option<Vec<u8>>>;

    /// Entries of `bucket` within `bounds`, in key order.
    fn range(&self, bucket: Bucket, bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>))
    -> AppResult<Vec<KeyValue>>;

    /// Apply every op or none of them.
    fn transaction(&self, ops: Vec<WriteOp>) -> AppResult<()>;

    fn scan(&self, bucket: Bucket) -> AppResult<Vec<KeyValue>> {
        self.range(bucket, (Bound::Unbounded, Bound::Unbounded))
    }

    fn put(&self, bucket: Bucket, key: &[u8], value: Vec<u8>) -> AppResult<()> {
        self.transaction(vec![WriteOp::put(bucket, key, value)])
    }

    fn delete(&self, bucket: Bucket, key: &[u8]) -> AppResult<()> {
        self.transaction(vec![WriteOp::delete(bucket, key)])
    }

    fn reset(&self, buckets: &[Bucket]) -> AppResult<()> {
        self.transaction(
            buckets
                .iter()
                .map(|bucket| WriteOp::Reset { bucket: *bucket })
                .collect(),
        )
    }
}

pub(crate) type Tables = HashMap<Bucket, BTreeMap<Vec<u8>, Vec<u8>>>;

pub(crate) fn apply_ops(tables: &mut Tables, ops: &[WriteOp]) {
    for op in ops {
        match op {
            WriteOp::Put { bucket, key, value } => {
                tables
                    .entry(*bucket)
                    .or_default()
                    .insert(key.clone(), value.clone());
            }
            WriteOp::Delete { bucket, key } => {
                if let Some(table) = tables.get_mut(bucket) {
                    table.remove(key);
                }
            }
            WriteOp::Reset { bucket } => {
                tables.remove(bucket);
            }
        }
    }
}

pub(crate) fn read_range(
    tables: &Tables,
    bucket: Bucket,
    bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>),
) -> Vec<KeyValue> {
    tables
        .get(&bucket)
        .map(|table| {
            table
                .range(bounds)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        })
        .unwrap_or_default()
}

pub fn encode<T: Serialize>(entity: &str, value: &T) -> AppResult<Vec<u8>> {
    bincode::serde::encode_to_vec(value, bincode::config::standard())
        .map_err(|e| AppError::serialization(entity, e))
}

pub fn decode<T: DeserializeOwned>(entity: &str, bytes: &[u8]) -> AppResult<T> {
    bincode::serde::decode_from_slice(bytes, bincode::config::standard())
        .map(|(value, _)| value)
        .map_err(|e| AppError::serialization(entity, e))
}

pub fn u64_key(id: u64) -> [u8; 8] {
    id.to_be_bytes()
}

pub fn key_u64(key: &[u8]) -> Option<u64> {
    key.try_into().ok().map(u64::from_be_bytes)
}
