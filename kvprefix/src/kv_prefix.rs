//! Indexed store: record reads, writes and listings over one namespace.
//!
//! Every mutation is a sequence of independent point operations against the
//! backing store. There is no atomicity across the primary record and its
//! index entries:
//!
//! ```text
//! put_data(k, v)
//!     1. get   ns::key::k                       (old value)
//!     2. put   ns::key::k                       (v)
//!     3. for each index, in registration order:
//!          delete ns::idx::<old segments>       (if the key moved or v is filtered out)
//!          put    ns::idx::<new segments>       (unless filtered out)
//!
//! delete_data(k)
//!     1. get    ns::key::k
//!     2. delete ns::key::k
//!     3. for each index: delete ns::idx::<segments>
//! ```
//!
//! A reader may observe the primary record already updated while some index
//! entries still reflect the previous value, or are briefly missing. When a
//! step fails, the steps before it stay applied. Every step is idempotent, so
//! retrying the whole call converges.

use std::collections::VecDeque;
use std::sync::Arc;

use bytes::Bytes;
use common::storage::validate_list_limit;
use common::{Background, KvStore, MAX_LIST_LIMIT, TokioBackground, create_store};
use futures::FutureExt;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::config::{BackgroundMode, Config, PutOptions};
use crate::error::{Error, Result};
use crate::model::{ListItem, ListOptions, ListPage};
use crate::prefix::{Prefix, validate_index_name};
use crate::serde::{
    DELIMITER, decode_metadata, decode_stored, encode_value, join_key, last_segment,
    validate_segment,
};

/// A single index entry mutation.
enum IndexOp {
    Put {
        key: String,
        value: Bytes,
        options: common::PutOptions,
    },
    Delete {
        key: String,
    },
}

impl IndexOp {
    fn key(&self) -> &str {
        match self {
            IndexOp::Put { key, .. } | IndexOp::Delete { key } => key,
        }
    }

    async fn apply(self, store: &dyn KvStore) -> common::StorageResult<()> {
        match self {
            IndexOp::Put {
                key,
                value,
                options,
            } => store.put(&key, value, options).await,
            IndexOp::Delete { key } => store.delete(&key).await,
        }
    }
}

/// Record store over one namespace that keeps index entries in step with
/// primary records.
///
/// Records are stored as JSON twice per location: as the raw payload and as
/// the entry's metadata, so listings return values without a second read.
///
/// Without a [`Background`], index mutations are awaited one after the other
/// before `put_data`/`delete_data` return. With one, each index mutation is
/// scheduled and the call returns right after the primary write; failures of
/// scheduled mutations are logged and otherwise lost.
pub struct KvPrefix<T> {
    store: Arc<dyn KvStore>,
    prefix: Arc<Prefix<T>>,
    background: Option<Arc<dyn Background>>,
}

impl<T> Clone for KvPrefix<T> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            prefix: Arc::clone(&self.prefix),
            background: self.background.clone(),
        }
    }
}

impl<T> KvPrefix<T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Creates a store over `prefix` that awaits index maintenance inline.
    pub fn new(store: Arc<dyn KvStore>, prefix: impl Into<Arc<Prefix<T>>>) -> Self {
        Self {
            store,
            prefix: prefix.into(),
            background: None,
        }
    }

    /// Opens a store from configuration.
    ///
    /// [`BackgroundMode::Spawned`] requires a tokio runtime at the time of the
    /// first mutation.
    pub fn open(config: &Config, prefix: impl Into<Arc<Prefix<T>>>) -> Self {
        let store = Self::new(create_store(&config.storage), prefix);
        match config.background {
            BackgroundMode::Blocking => store,
            BackgroundMode::Spawned => store.with_background(Arc::new(TokioBackground::new())),
        }
    }

    /// Schedules index maintenance on `background` instead of awaiting it.
    pub fn with_background(mut self, background: Arc<dyn Background>) -> Self {
        self.background = Some(background);
        self
    }

    pub fn prefix(&self) -> &Prefix<T> {
        &self.prefix
    }

    /// Reads a record.
    ///
    /// Without `index_key` the primary record is read. With it, the entry at
    /// `namespace::index_key::record_key` is read, where `record_key` is the
    /// terminal segment of that index (the key value for indexes that define
    /// one). Returns `None` when the entry does not exist.
    #[tracing::instrument(level = "trace", skip_all, fields(namespace = self.prefix.name()))]
    pub async fn get_data(&self, record_key: &str, index_key: Option<&str>) -> Result<Option<T>> {
        validate_segment("record key", record_key)?;
        let key = match index_key {
            Some(index_key) => join_key([self.prefix.name(), index_key, record_key]),
            None => self.prefix.create_data_key(record_key),
        };
        self.read(&key).await
    }

    async fn read(&self, key: &str) -> Result<Option<T>> {
        match self.store.get_with_metadata(key).await? {
            Some(stored) => decode_stored(stored).map(Some),
            None => Ok(None),
        }
    }

    /// Writes a record and brings every index entry in line with it.
    ///
    /// For each index in registration order: when the previous value mapped
    /// to a different index key, or the index filter rejects `value`, the
    /// previous entry is deleted; then, unless the filter rejects `value`, the
    /// entry for `value` is written. A record whose new value is filtered out
    /// leaves the index even if it was in it before.
    #[tracing::instrument(level = "trace", skip_all, fields(namespace = self.prefix.name()))]
    pub async fn put_data(&self, record_key: &str, value: &T, options: PutOptions) -> Result<()> {
        self.prefix.validate_record(record_key, value)?;
        let (raw, metadata) = encode_value(value)?;
        let data_key = self.prefix.create_data_key(record_key);

        let old_value = self.read(&data_key).await?;
        self.store
            .put(&data_key, raw.clone(), options.to_store(metadata.clone()))
            .await?;

        for index in self.prefix.indexes() {
            let new_key = self.prefix.create_index_data_key(index, value, record_key);
            let accepted = index.definition.accepts(value);

            if let Some(old_value) = &old_value {
                let old_key = self
                    .prefix
                    .create_index_data_key(index, old_value, record_key);
                if old_key != new_key || !accepted {
                    tracing::debug!(index = %index.name, %old_key, %new_key, accepted, "retiring index entry");
                    self.dispatch(IndexOp::Delete { key: old_key }).await?;
                }
            }

            if !accepted {
                continue;
            }

            self.dispatch(IndexOp::Put {
                key: new_key,
                value: raw.clone(),
                options: options.to_store(metadata.clone()),
            })
            .await?;
        }
        Ok(())
    }

    /// Deletes a record and every index entry computed from its current value.
    ///
    /// Index filters are ignored: an entry written before a filter started
    /// rejecting the value is removed too, and deleting an entry that does not
    /// exist is a no-op. Returns `false` without touching the store when the
    /// record does not exist.
    #[tracing::instrument(level = "trace", skip_all, fields(namespace = self.prefix.name()))]
    pub async fn delete_data(&self, record_key: &str) -> Result<bool> {
        validate_segment("record key", record_key)?;
        let data_key = self.prefix.create_data_key(record_key);
        let Some(value) = self.read(&data_key).await? else {
            return Ok(false);
        };

        self.store.delete(&data_key).await?;

        for index in self.prefix.indexes() {
            let key = self.prefix.create_index_data_key(index, &value, record_key);
            self.dispatch(IndexOp::Delete { key }).await?;
        }
        Ok(true)
    }

    /// Lists one page of entries under `namespace::` or
    /// `namespace::index_key::`, in key order.
    ///
    /// Each entry's `key` is the terminal segment of its storage key. Fails
    /// with [`Error::InvalidInput`] for a zero `limit`, before any store call.
    #[tracing::instrument(level = "trace", skip_all, fields(namespace = self.prefix.name()))]
    pub async fn list_data(&self, options: ListOptions) -> Result<ListPage<T>> {
        validate_list_limit(options.limit)?;
        let list_prefix = match options.index_key.as_deref() {
            Some(index_key) => join_key([self.prefix.name(), index_key]),
            None => self.prefix.name().to_string(),
        };

        let result = self
            .store
            .list(common::ListOptions {
                prefix: Some(format!("{}{}", list_prefix, DELIMITER)),
                limit: options.limit,
                cursor: options.cursor,
            })
            .await?;

        let data = result
            .keys
            .into_iter()
            .map(|entry| -> Result<ListItem<T>> {
                Ok(ListItem {
                    key: last_segment(&entry.name).to_string(),
                    value: entry.metadata.map(decode_metadata).transpose()?,
                    expiration: entry.expiration,
                    full_key: entry.name,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(ListPage {
            complete: result.list_complete,
            cursor: if result.list_complete {
                None
            } else {
                result.cursor
            },
            data,
        })
    }

    /// Iterates over every entry under `namespace::index_key::`, following
    /// cursors until the listing is complete.
    pub fn list_all(&self, index_key: Option<&str>) -> ListIterator<'_, T> {
        ListIterator {
            store: self,
            index_key: index_key.map(str::to_string),
            page_size: None,
            cursor: None,
            buffer: VecDeque::new(),
            done: false,
        }
    }

    /// Deletes every entry of the index `index_name`, leaving primary records
    /// and other indexes untouched. Returns the number of deleted entries.
    ///
    /// Useful after an index definition has been replaced or dropped; records
    /// are re-indexed by their next `put_data`.
    #[tracing::instrument(level = "debug", skip_all, fields(namespace = self.prefix.name(), index = index_name))]
    pub async fn clear_index(&self, index_name: &str) -> Result<usize> {
        validate_index_name(index_name)?;
        let list_prefix = format!(
            "{}{}",
            join_key([self.prefix.name(), index_name]),
            DELIMITER
        );

        let mut deleted = 0;
        let mut cursor = None;
        loop {
            let page = self
                .store
                .list(common::ListOptions {
                    prefix: Some(list_prefix.clone()),
                    limit: Some(MAX_LIST_LIMIT),
                    cursor,
                })
                .await?;
            for entry in &page.keys {
                self.store.delete(&entry.name).await?;
                deleted += 1;
            }
            if page.list_complete {
                break;
            }
            cursor = match page.cursor {
                Some(cursor) => Some(cursor),
                None => {
                    return Err(Error::Internal(
                        "incomplete listing returned no cursor".to_string(),
                    ));
                }
            };
        }

        tracing::debug!(deleted, "cleared index entries");
        Ok(deleted)
    }

    /// Runs an index mutation inline, or hands it to the background port.
    async fn dispatch(&self, op: IndexOp) -> Result<()> {
        let Some(background) = &self.background else {
            return op.apply(self.store.as_ref()).await.map_err(Error::from);
        };

        let store = Arc::clone(&self.store);
        background.schedule(
            async move {
                let key = op.key().to_string();
                if let Err(err) = op.apply(store.as_ref()).await {
                    tracing::warn!(%key, %err, "background index mutation failed");
                }
            }
            .boxed(),
        );
        Ok(())
    }
}

/// Iterator over every entry of a listing, one page request at a time.
pub struct ListIterator<'a, T> {
    store: &'a KvPrefix<T>,
    index_key: Option<String>,
    page_size: Option<usize>,
    cursor: Option<String>,
    buffer: VecDeque<ListItem<T>>,
    done: bool,
}

impl<T> ListIterator<'_, T> {
    /// Sets the number of entries requested per page.
    pub fn page_size(mut self, page_size: usize) -> Self {
        self.page_size = Some(page_size);
        self
    }
}

impl<T> ListIterator<'_, T>
where
    T: Serialize + DeserializeOwned + Send + Sync,
{
    /// Returns the next entry, or None if iteration is complete.
    pub async fn next(&mut self) -> Result<Option<ListItem<T>>> {
        while self.buffer.is_empty() && !self.done {
            let page = self
                .store
                .list_data(ListOptions {
                    index_key: self.index_key.clone(),
                    limit: self.page_size,
                    cursor: self.cursor.take(),
                })
                .await?;
            self.done = page.complete || page.cursor.is_none();
            self.cursor = page.cursor;
            self.buffer.extend(page.data);
        }
        Ok(self.buffer.pop_front())
    }

    /// Drains the remaining entries into a Vec.
    pub async fn collect(mut self) -> Result<Vec<ListItem<T>>> {
        let mut items = Vec::new();
        while let Some(item) = self.next().await? {
            items.push(item);
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use common::InMemoryKvStore;
    use serde::Deserialize;

    use super::*;
    use crate::prefix::IndexDefinition;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Task {
        title: String,
        owner: String,
        priority: u8,
        done: bool,
    }

    fn task(title: &str, owner: &str, priority: u8) -> Task {
        Task {
            title: title.to_string(),
            owner: owner.to_string(),
            priority,
            done: false,
        }
    }

    fn tasks_prefix() -> Prefix<Task> {
        let mut prefix = Prefix::new("tasks");
        prefix.set_index(
            "by_priority",
            IndexDefinition::new().sort_value(|t: &Task| format!("{:03}", t.priority)),
        );
        prefix.set_index(
            "by_owner",
            IndexDefinition::new().key_value(|t: &Task| t.owner.clone()),
        );
        prefix.set_index("open", IndexDefinition::new().filter(|t: &Task| !t.done));
        prefix
    }

    fn setup() -> (Arc<InMemoryKvStore>, KvPrefix<Task>) {
        let store = Arc::new(InMemoryKvStore::new());
        let tasks = KvPrefix::new(store.clone(), tasks_prefix());
        (store, tasks)
    }

    #[tokio::test]
    async fn should_write_primary_and_index_entries() {
        // given
        let (store, tasks) = setup();
        let value = task("write docs", "ana", 2);

        // when
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // then
        assert_eq!(
            store.keys().unwrap(),
            vec![
                "tasks::by_owner::ana",
                "tasks::by_priority::002::t1",
                "tasks::key::t1",
                "tasks::open::t1",
            ]
        );
    }

    #[tokio::test]
    async fn should_move_index_entry_when_sort_value_changes() {
        // given
        let (store, tasks) = setup();
        let mut value = task("write docs", "ana", 2);
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // when
        value.priority = 7;
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // then
        let keys = store.keys().unwrap();
        assert!(!keys.contains(&"tasks::by_priority::002::t1".to_string()));
        assert!(keys.contains(&"tasks::by_priority::007::t1".to_string()));
    }

    #[tokio::test]
    async fn should_retire_entry_when_filter_starts_rejecting() {
        // given
        let (store, tasks) = setup();
        let mut value = task("write docs", "ana", 2);
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // when
        value.done = true;
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // then
        let page = tasks.list_data(ListOptions::index("open")).await.unwrap();
        assert!(page.data.is_empty());
        assert!(!store.keys().unwrap().contains(&"tasks::open::t1".to_string()));
        assert_eq!(tasks.get_data("t1", None).await.unwrap(), Some(value));
    }

    #[tokio::test]
    async fn should_update_index_values_in_place() {
        // given
        let (_, tasks) = setup();
        let mut value = task("write docs", "ana", 2);
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // when
        value.title = "write better docs".to_string();
        tasks
            .put_data("t1", &value, PutOptions::default())
            .await
            .unwrap();

        // then
        let by_owner = tasks.get_data("ana", Some("by_owner")).await.unwrap();
        assert_eq!(by_owner, Some(value));
    }

    #[tokio::test]
    async fn should_return_false_when_deleting_missing_record() {
        // given
        let (store, tasks) = setup();

        // when
        let deleted = tasks.delete_data("missing").await.unwrap();

        // then
        assert!(!deleted);
        assert!(store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_remove_all_entries_on_delete() {
        // given
        let (store, tasks) = setup();
        tasks
            .put_data("t1", &task("a", "ana", 1), PutOptions::default())
            .await
            .unwrap();
        tasks
            .put_data("t2", &task("b", "ben", 2), PutOptions::default())
            .await
            .unwrap();

        // when
        let deleted = tasks.delete_data("t1").await.unwrap();

        // then
        assert!(deleted);
        assert!(store.keys().unwrap().iter().all(|k| !k.contains("t1") && !k.ends_with("ana")));
        assert_eq!(tasks.get_data("t1", None).await.unwrap(), None);
        assert!(tasks.get_data("t2", None).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn should_list_index_in_sort_order() {
        // given
        let (_, tasks) = setup();
        for (key, priority) in [("t1", 5), ("t2", 1), ("t3", 3)] {
            tasks
                .put_data(key, &task(key, key, priority), PutOptions::default())
                .await
                .unwrap();
        }

        // when
        let page = tasks
            .list_data(ListOptions::index("by_priority"))
            .await
            .unwrap();

        // then
        let keys: Vec<_> = page.data.iter().map(|item| item.key.as_str()).collect();
        assert_eq!(keys, vec!["t2", "t3", "t1"]);
        assert!(page.complete);
        assert!(page.cursor.is_none());
    }

    #[tokio::test]
    async fn should_not_match_index_sharing_name_prefix() {
        // given
        let mut prefix = Prefix::new("tasks");
        prefix.set_index("open", IndexDefinition::new());
        prefix.set_index("opener", IndexDefinition::new());
        let tasks = KvPrefix::new(Arc::new(InMemoryKvStore::new()), prefix);
        tasks
            .put_data("t1", &task("a", "ana", 1), PutOptions::default())
            .await
            .unwrap();

        // when
        let page = tasks.list_data(ListOptions::index("open")).await.unwrap();

        // then
        assert_eq!(page.data.len(), 1);
        assert_eq!(page.data[0].full_key, "tasks::open::t1");
    }

    #[tokio::test]
    async fn should_reject_zero_limit_before_store_call() {
        // given
        let (_, tasks) = setup();

        // when
        let result = tasks
            .list_data(ListOptions {
                limit: Some(0),
                ..ListOptions::default()
            })
            .await;

        // then
        assert_eq!(
            result,
            Err(Error::InvalidInput(
                "Invalid limit: expected number > 0, got 0".to_string()
            ))
        );
    }

    #[tokio::test]
    async fn should_reject_record_key_containing_delimiter() {
        // given
        let (store, tasks) = setup();

        // when
        let result = tasks
            .put_data("a::b", &task("a", "ana", 1), PutOptions::default())
            .await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
        assert!(store.keys().unwrap().is_empty());
    }

    #[tokio::test]
    async fn should_clear_only_the_named_index() {
        // given
        let (store, tasks) = setup();
        for key in ["t1", "t2", "t3"] {
            tasks
                .put_data(key, &task(key, key, 1), PutOptions::default())
                .await
                .unwrap();
        }

        // when
        let deleted = tasks.clear_index("by_priority").await.unwrap();

        // then
        assert_eq!(deleted, 3);
        let keys = store.keys().unwrap();
        assert!(keys.iter().all(|k| !k.starts_with("tasks::by_priority::")));
        assert_eq!(keys.len(), 9);
    }

    #[tokio::test]
    async fn should_refuse_to_clear_primary_records() {
        // given
        let (_, tasks) = setup();

        // when
        let result = tasks.clear_index("key").await;

        // then
        assert!(matches!(result, Err(Error::InvalidInput(_))));
    }

    #[tokio::test]
    async fn should_iterate_across_pages() {
        // given
        let (_, tasks) = setup();
        for i in 0..25 {
            let key = format!("t{:02}", i);
            tasks
                .put_data(&key, &task(&key, &key, 1), PutOptions::default())
                .await
                .unwrap();
        }

        // when
        let items = tasks
            .list_all(Some("key"))
            .page_size(10)
            .collect()
            .await
            .unwrap();

        // then
        assert_eq!(items.len(), 25);
        assert_eq!(items[0].key, "t00");
        assert_eq!(items[24].key, "t24");
    }
}
