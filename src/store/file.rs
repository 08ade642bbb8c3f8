//! Durable store on a fjall keyspace.
//!
//! Every [`Bucket`] is one partition. A transaction becomes one keyspace
//! batch, so its puts, deletes and resets land together or not at all, and
//! the journal is synced before the call returns.

use std::collections::HashMap;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use fjall::{Batch, Config, Keyspace, PartitionCreateOptions, PartitionHandle, PersistMode};

use crate::error::{AppError, AppResult};
use crate::store::{Bucket, KeyValue, KvStore, WriteOp};

const ALL_BUCKETS: [Bucket; 8] = [
    Bucket::Job,
    Bucket::Triggered,
    Bucket::Node,
    Bucket::User,
    Bucket::AlarmConfig,
    Bucket::Meta,
    Bucket::RaftLog,
    Bucket::RaftState,
];

pub struct FileKvStore {
    dir: PathBuf,
    keyspace: Keyspace,
    partitions: HashMap<Bucket, PartitionHandle>,
    // resets read the partition before batching its removals
    writer: Mutex<()>,
}

impl FileKvStore {
    pub fn open(dir: impl AsRef<Path>) -> AppResult<Self> {
        let dir = dir.as_ref().to_path_buf();
        let keyspace = Config::new(&dir)
            .open()
            .map_err(|e| AppError::storage("open keyspace", e))?;

        let mut partitions = HashMap::with_capacity(ALL_BUCKETS.len());
        for bucket in ALL_BUCKETS {
            let handle = keyspace
                .open_partition(bucket.name(), PartitionCreateOptions::default())
                .map_err(|e| AppError::storage(format!("open partition {}", bucket.name()), e))?;
            partitions.insert(bucket, handle);
        }

        tracing::debug!(dir = %dir.display(), partitions = partitions.len(), "store opened");
        Ok(Self {
            dir,
            keyspace,
            partitions,
            writer: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn partition(&self, bucket: Bucket) -> AppResult<&PartitionHandle> {
        self.partitions.get(&bucket).ok_or_else(|| {
            AppError::storage(
                "lookup partition",
                anyhow::anyhow!("bucket {} has no partition", bucket.name()),
            )
        })
    }

    fn stage(&self, batch: &mut Batch, op: &WriteOp) -> AppResult<()> {
        match op {
            WriteOp::Put { bucket, key, value } => {
                batch.insert(self.partition(*bucket)?, key.as_slice(), value.as_slice());
            }
            WriteOp::Delete { bucket, key } => {
                batch.remove(self.partition(*bucket)?, key.as_slice());
            }
            WriteOp::Reset { bucket } => {
                let partition = self.partition(*bucket)?;
                for item in partition.keys() {
                    let key = item.map_err(|e| AppError::storage("scan for reset", e))?;
                    batch.remove(partition, key.to_vec());
                }
            }
        }
        Ok(())
    }
}

impl KvStore for FileKvStore {
    fn get(&self, bucket: Bucket, key: &[u8]) -> AppResult<Option<Vec<u8>>> {
        Ok(self
            .partition(bucket)?
            .get(key)
            .map_err(|e| AppError::storage("get", e))?
            .map(|value| value.to_vec()))
    }

    fn range(
        &self,
        bucket: Bucket,
        bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>),
    ) -> AppResult<Vec<KeyValue>> {
        self.partition(bucket)?
            .range(bounds)
            .map(|item| {
                item.map(|(key, value)| (key.to_vec(), value.to_vec()))
                    .map_err(|e| AppError::storage("range", e))
            })
            .collect()
    }

    fn transaction(&self, ops: Vec<WriteOp>) -> AppResult<()> {
        if ops.is_empty() {
            return Ok(());
        }
        let _writer = self
            .writer
            .lock()
            .map_err(|_| AppError::storage("transaction", anyhow::anyhow!("store lock poisoned")))?;

        let mut batch = self.keyspace.batch();
        for op in &ops {
            self.stage(&mut batch, op)?;
        }
        batch
            .commit()
            .map_err(|e| AppError::storage("commit batch", e))?;
        self.keyspace
            .persist(PersistMode::SyncData)
            .map_err(|e| AppError::storage("sync journal", e))
    }
}
