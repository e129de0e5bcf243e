use std::collections::BTreeMap;
use std::ops::Bound;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use serde_json::Value;

use super::{
    KvStore, ListKey, ListOptions, ListResult, PutOptions, StorageError, StorageResult,
    ValueWithMetadata, validate_list_limit,
};
use crate::clock::{Clock, WallClock};

/// Internal wrapper that stores a value alongside its metadata and expiration.
#[derive(Clone, Debug)]
struct StoredValue {
    value: Bytes,
    metadata: Option<Value>,
    /// Seconds since the Unix epoch. `None` means the value never expires.
    expiration: Option<u64>,
}

impl StoredValue {
    fn is_expired(&self, now_ms: i64) -> bool {
        self.expiration
            .is_some_and(|secs| now_ms >= (secs as i64).saturating_mul(1000))
    }
}

/// Computes the absolute expiration (seconds) from put options.
fn compute_expiration(now_ms: i64, options: &PutOptions, default_ttl: Option<u64>) -> Option<u64> {
    if let Some(expiration) = options.expiration {
        return Some(expiration);
    }
    options
        .expiration_ttl
        .or(default_ttl)
        .map(|ttl| (now_ms / 1000) as u64 + ttl)
}

fn encode_cursor(last_key: &str) -> String {
    URL_SAFE_NO_PAD.encode(last_key.as_bytes())
}

fn decode_cursor(cursor: &str) -> StorageResult<String> {
    let bytes = URL_SAFE_NO_PAD
        .decode(cursor)
        .map_err(|e| StorageError::InvalidInput(format!("Invalid cursor: {}", e)))?;
    String::from_utf8(bytes)
        .map_err(|e| StorageError::InvalidInput(format!("Invalid cursor: {}", e)))
}

/// In-memory implementation of the [`KvStore`] trait using a BTreeMap.
///
/// Keys are kept in lexicographic order, so listings come back sorted the
/// same way a hosted store returns them. Cursors encode the last key of the
/// page. Supports expiration via a configurable [`Clock`].
pub struct InMemoryKvStore {
    data: Arc<RwLock<BTreeMap<String, StoredValue>>>,
    clock: Arc<dyn Clock>,
    default_ttl: Option<u64>,
}

impl InMemoryKvStore {
    /// Creates a new InMemoryKvStore instance with an empty store.
    pub fn new() -> Self {
        Self {
            data: Arc::new(RwLock::new(BTreeMap::new())),
            clock: Arc::new(WallClock),
            default_ttl: None,
        }
    }

    /// Sets a custom clock for expiration checks.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Sets the default TTL (in seconds) for puts without an expiration.
    pub fn with_default_ttl(mut self, ttl: u64) -> Self {
        self.default_ttl = Some(ttl);
        self
    }

    /// Returns every live key, in order. Intended for assertions in tests.
    pub fn keys(&self) -> StorageResult<Vec<String>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        let now = self.clock.now();
        Ok(data
            .iter()
            .filter(|(_, stored)| !stored.is_expired(now))
            .map(|(k, _)| k.clone())
            .collect())
    }

    fn lookup(&self, key: &str) -> StorageResult<Option<StoredValue>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(data
            .get(key)
            .filter(|stored| !stored.is_expired(self.clock.now()))
            .cloned())
    }
}

impl Default for InMemoryKvStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl KvStore for InMemoryKvStore {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.lookup(key)?.map(|stored| stored.value))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn get_with_metadata(&self, key: &str) -> StorageResult<Option<ValueWithMetadata>> {
        Ok(self.lookup(key)?.map(|stored| ValueWithMetadata {
            value: stored.value,
            metadata: stored.metadata,
        }))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> StorageResult<()> {
        if key.is_empty() {
            return Err(StorageError::InvalidInput(
                "Key names must not be empty".to_string(),
            ));
        }
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;

        let expiration = compute_expiration(self.clock.now(), &options, self.default_ttl);
        data.insert(
            key.to_string(),
            StoredValue {
                value,
                metadata: options.metadata,
                expiration,
            },
        );
        Ok(())
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let mut data = self
            .data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;
        data.remove(key);
        Ok(())
    }

    /// Lists live keys starting with the prefix, after the cursor position.
    ///
    /// `list_complete` is true once no live key with the prefix remains past
    /// the returned page.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        let limit = validate_list_limit(options.limit)?;
        let prefix = options.prefix.unwrap_or_default();
        let start = match options.cursor.as_deref() {
            Some(cursor) if !cursor.is_empty() => Bound::Excluded(decode_cursor(cursor)?),
            _ => Bound::Included(prefix.clone()),
        };

        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;

        let now = self.clock.now();
        let mut matching = data
            .range::<String, _>((start, Bound::Unbounded))
            .take_while(|(k, _)| k.starts_with(&prefix))
            .filter(|(_, stored)| !stored.is_expired(now));

        let keys: Vec<ListKey> = matching
            .by_ref()
            .take(limit)
            .map(|(k, stored)| ListKey {
                name: k.clone(),
                metadata: stored.metadata.clone(),
                expiration: stored.expiration,
            })
            .collect();
        let list_complete = matching.next().is_none();

        let cursor = match (list_complete, keys.last()) {
            (false, Some(last)) => Some(encode_cursor(&last.name)),
            _ => None,
        };

        Ok(ListResult {
            keys,
            cursor,
            list_complete,
        })
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(StorageError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(StorageError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> StorageResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A store wrapper that delegates to an inner [`KvStore`] but can inject
/// failures into `get`, `put`, `delete` and `list` on demand.
///
/// Failures can be *persistent* (returned on every call until cleared) or
/// *once* (returned on the next call, then automatically cleared).
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemoryKvStore::new());
/// let store = FailingKvStore::wrap(inner);
/// store.fail_put_once(StorageError::Storage("quota exceeded".into()));
/// // only the next put returns Err(...), then auto-clears
/// ```
#[cfg(feature = "test-utils")]
pub struct FailingKvStore {
    inner: Arc<dyn KvStore>,
    fail_get: FailSlot,
    fail_put: FailSlot,
    fail_delete: FailSlot,
    fail_list: FailSlot,
}

#[cfg(feature = "test-utils")]
impl FailingKvStore {
    /// Wraps an existing store, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn KvStore>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_get: arc_swap::ArcSwap::from_pointee(None),
            fail_put: arc_swap::ArcSwap::from_pointee(None),
            fail_delete: arc_swap::ArcSwap::from_pointee(None),
            fail_list: arc_swap::ArcSwap::from_pointee(None),
        })
    }

    /// Makes `get` and `get_with_metadata` return the given error on every subsequent call.
    pub fn fail_get(&self, err: StorageError) {
        self.fail_get.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `put` return the given error on every subsequent call.
    pub fn fail_put(&self, err: StorageError) {
        self.fail_put.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `put` return the given error on the next call only.
    pub fn fail_put_once(&self, err: StorageError) {
        self.fail_put.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `delete` return the given error on the next call only.
    pub fn fail_delete_once(&self, err: StorageError) {
        self.fail_delete.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `list` return the given error on every subsequent call.
    pub fn fail_list(&self, err: StorageError) {
        self.fail_list
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Clears every injected failure.
    pub fn clear(&self) {
        for slot in [
            &self.fail_get,
            &self.fail_put,
            &self.fail_delete,
            &self.fail_list,
        ] {
            slot.store(Arc::new(None));
        }
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl KvStore for FailingKvStore {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        check_failure(&self.fail_get)?;
        self.inner.get(key).await
    }

    async fn get_with_metadata(&self, key: &str) -> StorageResult<Option<ValueWithMetadata>> {
        check_failure(&self.fail_get)?;
        self.inner.get_with_metadata(key).await
    }

    async fn put(&self, key: &str, value: Bytes, options: PutOptions) -> StorageResult<()> {
        check_failure(&self.fail_put)?;
        self.inner.put(key, value, options).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        check_failure(&self.fail_delete)?;
        self.inner.delete(key).await
    }

    async fn list(&self, options: ListOptions) -> StorageResult<ListResult> {
        check_failure(&self.fail_list)?;
        self.inner.list(options).await
    }
}
