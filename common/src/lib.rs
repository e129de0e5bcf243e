//! Shared building blocks for KVPrefix: the key-value store port, an
//! in-memory store, and the background execution port.

pub mod background;
pub mod clock;
pub mod storage;

pub use background::{Background, TokioBackground};
pub use clock::Clock;
pub use storage::config::StorageConfig;
pub use storage::factory::create_store;
pub use storage::in_memory::InMemoryKvStore;
#[cfg(feature = "test-utils")]
pub use storage::in_memory::FailingKvStore;
pub use storage::{
    KvStore, ListKey, ListOptions, ListResult, MAX_LIST_LIMIT, PutOptions, StorageError,
    StorageResult, ValueWithMetadata,
};
