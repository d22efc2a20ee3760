pub mod disk;
pub mod memory;

use crate::core::store::{KeyValueCollection, Store};
use anyhow::{Context, Result};
use disk::DiskCollection;
use fjall::{Keyspace, PartitionCreateOptions};
use memory::MemoryCollection;
use std::{
    collections::HashMap,
    path::Path,
    sync::{Arc, PoisonError, RwLock},
};
use tracing::debug;

/// A thread-safe key-value store that can hold multiple collections.
///
/// Collections are backed by fjall partitions when the store was opened on
/// disk, and kept in memory otherwise.
pub struct KeyValueStore {
    collections: RwLock<HashMap<String, Arc<dyn KeyValueCollection>>>,
    keyspace: Option<Arc<Keyspace>>,
}

impl KeyValueStore {
    pub fn open(path: &Path) -> Result<Self> {
        let keyspace = fjall::Config::new(path)
            .open()
            .with_context(|| format!("Failed to open data store at {}", path.display()))?;
        debug!("Opened data store at {}", path.display());

        Ok(Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: Some(Arc::new(keyspace)),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            collections: RwLock::new(HashMap::new()),
            keyspace: None,
        }
    }
}

impl Store for KeyValueStore {
    fn get_collection(&self, name: &str) -> Option<Arc<dyn KeyValueCollection>> {
        if let Some(existing) = self
            .collections
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
        {
            return Some(Arc::clone(existing));
        }

        let mut collections = self
            .collections
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = collections.get(name) {
            return Some(Arc::clone(existing));
        }

        let collection: Arc<dyn KeyValueCollection> = match &self.keyspace {
            Some(ks) => {
                let partition = ks
                    .open_partition(name, PartitionCreateOptions::default())
                    .ok()?;
                Arc::new(DiskCollection::new(Arc::clone(ks), partition))
            }
            None => Arc::new(MemoryCollection::new()),
        };
        collections.insert(name.to_string(), Arc::clone(&collection));
        Some(collection)
    }
}
