use std::ops::Bound;
use std::sync::RwLock;

use crate::error::{AppError, AppResult};
use crate::store::{Bucket, KeyValue, KvStore, Tables, WriteOp, apply_ops, read_range};

/// Volatile store, used by tests.
#[derive(Debug, Default)]
pub struct MemoryKvStore {
    tables: RwLock<Tables>,
}

impl MemoryKvStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned(operation: &str) -> AppError {
    AppError::storage(operation, anyhow::anyhow!("store lock poisoned"))
}

impl KvStore for MemoryKvStore {
    fn get(&self, bucket: Bucket, key: &[u8]) -> AppResult<Option<Vec<u8>>> {
        let tables = self.tables.read().map_err(|_| poisoned("get"))?;
        Ok(tables.get(&bucket).and_then(|t| t.get(key)).cloned())
    }

    fn range(
        &self,
        bucket: Bucket,
        bounds: (Bound<Vec<u8>>, Bound<Vec<u8>>),
    ) -> AppResult<Vec<KeyValue>> {
        let tables = self.tables.read().map_err(|_| poisoned("range"))?;
        Ok(read_range(&tables, bucket, bounds))
    }

    fn transaction(&self, ops: Vec<WriteOp>) -> AppResult<()> {
        let mut tables = self.tables.write().map_err(|_| poisoned("transaction"))?;
        apply_ops(&mut tables, &ops);
        Ok(())
    }
}
