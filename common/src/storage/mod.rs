pub mod config;
pub mod factory;
pub mod in_memory;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;

/// Default and maximum number of keys returned by a single [`KvStore::list`] call.
pub const MAX_LIST_LIMIT: usize = 1000;

/// Options attached to a single put.
///
/// `expiration` is an absolute timestamp in seconds since the Unix epoch,
/// `expiration_ttl` a number of seconds from now. When both are set the
/// absolute expiration wins.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PutOptions {
    pub metadata: Option<Value>,
    pub expiration: Option<u64>,
    pub expiration_ttl: Option<u64>,
}

impl PutOptions {
    pub fn with_metadata(metadata: Value) -> Self {
        Self {
            metadata: Some(metadata),
            ..Self::default()
        }
    }
}

/// A raw value together with the structured metadata stored next to it.
#[derive(Clone, Debug, PartialEq)]
pub struct ValueWithMetadata {
    pub value: Bytes,
    pub metadata: Option<Value>,
}

/// Parameters of a prefix-scoped, cursor-paginated listing.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub prefix: Option<String>,
    /// Maximum number of keys to return. `None` means [`MAX_LIST_LIMIT`].
    pub limit: Option<usize>,
    /// Opaque continuation token from a previous page.
    pub cursor: Option<String>,
}

/// A key returned by [`KvStore::list`].
#[derive(Clone, Debug, PartialEq)]
pub struct ListKey {
    pub name: String,
    pub metadata: Option<Value>,
    /// Absolute expiration in seconds since the Unix epoch, if any.
    pub expiration: Option<u64>,
}

/// One page of a listing.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ListResult {
    pub keys: Vec<ListKey>,
    /// Present when `list_complete` is false; pass it back verbatim to continue.
    pub cursor: Option<String>,
    pub list_complete: bool,
}

/// Error type for storage operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Storage-related errors
    Storage(String),
    /// Rejected arguments, raised before any I/O
    InvalidInput(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::Storage(msg) => write!(f, "Storage error: {}", msg),
            StorageError::InvalidInput(msg) => write!(f, "Invalid input: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Checks a list limit the way hosted stores do: zero is never valid.
pub fn validate_list_limit(limit: Option<usize>) -> StorageResult<usize> {
    match limit {
        Some(0) => Err(StorageError::InvalidInput(
            "Invalid limit: expected number > 0, got 0".to_string(),
        )),
        Some(limit) => Ok(limit.min(MAX_LIST_LIMIT)),
        None => Ok(MAX_LIST_LIMIT),
    }
}

/// A remote key-value store with primary-key access and prefix listing.
///
/// Implementations offer no transactions and no multi-key atomicity: every
/// call is an independent point operation. Writes may become visible to
/// other readers with a delay.
#[async_trait]
pub trait KvStore: Send + Sync {
    /// Returns the raw value stored at `key`, or `None` if absent or expired.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Returns the raw value and its metadata, or `None` if absent or expired.
    async fn get_with_metadata(&self, key: &str) -> StorageResult<Option<ValueWithMetadata>>;

    /// Writes `value` at `key`, replacing any previous value and metadata.
    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> StorageResult<()>;

    /// Deletes `key`. No-op if the key does not exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Lists keys in lexicographic order, one page at a time.
    async fn list(&self, options: ListOptions) -> StorageResult<ListResult>;
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case(None, 1000)]
    #[case(Some(1), 1)]
    #[case(Some(250), 250)]
    #[case(Some(5000), 1000)]
    fn should_clamp_list_limit(#[case] limit: Option<usize>, #[case] expected: usize) {
        assert_eq!(validate_list_limit(limit).unwrap(), expected);
    }

    #[test]
    fn should_reject_zero_list_limit() {
        // when
        let result = validate_list_limit(Some(0));

        // then
        assert_eq!(
            result,
            Err(StorageError::InvalidInput(
                "Invalid limit: expected number > 0, got 0".to_string()
            ))
        );
    }
}
