//! Key-value persistence contract shared by the refresh engine

use crate::core::error::StoreError;
use async_trait::async_trait;
use serde::{Serialize, de::DeserializeOwned};
use std::sync::Arc;
use tracing::{debug, warn};

pub const FUNDS_KEY: &str = "funds";
pub const REFRESH_MS_KEY: &str = "refresh_ms";
pub const POSITIONS_KEY: &str = "positions";
pub const INTRADAY_KEY: &str = "intraday_data";

/// A named collection of raw key-value pairs.
#[async_trait]
pub trait KeyValueCollection: Send + Sync {
    async fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError>;
    async fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StoreError>;
    async fn remove(&self, key: &[u8]) -> Result<(), StoreError>;
}

/// Opens collections by name.
pub trait Store: Send + Sync {
    fn get_collection(&self, name: &str) -> Option<Arc<dyn KeyValueCollection>>;
}

/// Typed JSON view over a collection: `load(key, default)` / `save(key, value)`.
#[derive(Clone)]
pub struct Persistence {
    collection: Arc<dyn KeyValueCollection>,
}

impl Persistence {
    pub fn new(collection: Arc<dyn KeyValueCollection>) -> Self {
        Self { collection }
    }

    /// Reads `key`, returning `default` when it is absent, unreadable or
    /// holds a value of the wrong shape.
    pub async fn load<T: DeserializeOwned>(&self, key: &str, default: T) -> T {
        match self.collection.get(key.as_bytes()).await {
            Ok(Some(bytes)) => match serde_json::from_slice(&bytes) {
                Ok(value) => value,
                Err(e) => {
                    warn!(key, error = %e, "Stored value is malformed, using default");
                    default
                }
            },
            Ok(None) => {
                debug!(key, "No stored value, using default");
                default
            }
            Err(e) => {
                warn!(key, error = %e, "Failed to read stored value, using default");
                default
            }
        }
    }

    pub async fn save<T: Serialize + ?Sized>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(value).map_err(|source| StoreError::Encode {
            key: key.to_string(),
            source,
        })?;
        self.collection.put(key.as_bytes(), &bytes).await?;
        debug!(key, bytes = bytes.len(), "Saved value");
        Ok(())
    }

    pub async fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.collection.remove(key.as_bytes()).await
    }
}
