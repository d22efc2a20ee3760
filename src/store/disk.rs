use crate::core::error::StoreError;
use crate::core::store::KeyValueCollection;
use async_trait::async_trait;
use fjall::{Keyspace, PartitionHandle, PersistMode};
use std::sync::Arc;
use tracing::debug;

/// A collection backed by one fjall partition.
pub struct DiskCollection {
    keyspace: Arc<Keyspace>,
    partition: PartitionHandle,
}

impl DiskCollection {
    pub fn new(keyspace: Arc<Keyspace>, partition: PartitionHandle) -> Self {
        Self {
            keyspace,
            partition,
        }
    }
}

#[async_trait]
impl KeyValueCollection for DiskCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let value = self.partition.get(key)?.map(|slice| slice.to_vec());
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Disk GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        self.partition.insert(key, value)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(key = %String::from_utf8_lossy(key), "Disk PUT");
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        self.partition.remove(key)?;
        self.keyspace.persist(PersistMode::SyncAll)?;
        debug!(key = %String::from_utf8_lossy(key), "Disk REMOVE");
        Ok(())
    }
}
