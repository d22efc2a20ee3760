use crate::core::error::StoreError;
use crate::core::store::KeyValueCollection;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;
use tracing::debug;

/// In-memory collection, used for non-persistent stores and tests.
#[derive(Default)]
pub struct MemoryCollection {
    inner: Mutex<HashMap<Vec<u8>, Vec<u8>>>,
    fail_writes: AtomicBool,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every subsequent write fail, to exercise error paths.
    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl KeyValueCollection for MemoryCollection {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let map = self.inner.lock().await;
        let value = map.get(key).cloned();
        debug!(
            key = %String::from_utf8_lossy(key),
            hit = value.is_some(),
            "Memory GET"
        );
        Ok(value)
    }

    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("writes disabled".to_string()));
        }
        let mut map = self.inner.lock().await;
        debug!(key = %String::from_utf8_lossy(key), "Memory PUT");
        map.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    async fn remove(&self, key: &[u8]) -> Result<(), StoreError> {
        let mut map = self.inner.lock().await;
        map.remove(key);
        debug!(key = %String::from_utf8_lossy(key), "Memory REMOVE");
        Ok(())
    }
}
