//! Configuration options for KVPrefix operations.

use common::StorageConfig;
use serde::{Deserialize, Serialize};

/// Configuration for opening a [`KvPrefix`](crate::KvPrefix).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Storage backend configuration.
    #[serde(default)]
    pub storage: StorageConfig,

    /// How index mutations are executed.
    #[serde(default)]
    pub background: BackgroundMode,
}

/// Execution mode for index maintenance.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BackgroundMode {
    /// Index writes and deletes are awaited before `put_data`/`delete_data` return.
    #[default]
    Blocking,
    /// Index writes and deletes are spawned on the tokio runtime and complete
    /// after the call returns.
    Spawned,
}

/// Options for `put_data`, passed through to every write of the record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PutOptions {
    /// Absolute expiration, seconds since the Unix epoch.
    pub expiration: Option<u64>,
    /// Expiration relative to now, in seconds.
    pub expiration_ttl: Option<u64>,
}

impl PutOptions {
    pub(crate) fn to_store(self, metadata: serde_json::Value) -> common::PutOptions {
        common::PutOptions {
            metadata: Some(metadata),
            expiration: self.expiration,
            expiration_ttl: self.expiration_ttl,
        }
    }
}
