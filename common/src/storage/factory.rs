//! Storage factory for creating stores from configuration.

use std::sync::Arc;

use super::KvStore;
use super::config::StorageConfig;
use super::in_memory::InMemoryKvStore;

/// Creates a store instance based on the provided configuration.
pub fn create_store(config: &StorageConfig) -> Arc<dyn KvStore> {
    match config {
        StorageConfig::InMemory { default_ttl_secs } => {
            let store = match default_ttl_secs {
                Some(ttl) => InMemoryKvStore::new().with_default_ttl(*ttl),
                None => InMemoryKvStore::new(),
            };
            Arc::new(store)
        }
    }
}
