//! Data types for KVPrefix listings.

/// Parameters for [`KvPrefix::list_data`](crate::KvPrefix::list_data).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    /// Index to scan, optionally followed by leading sort segments
    /// (e.g. `year::2021`). `None` scans the whole namespace, primary
    /// records and index entries alike; use `key` for primary records only.
    pub index_key: Option<String>,
    /// Page size. Must be greater than zero.
    pub limit: Option<usize>,
    /// Cursor returned by the previous page.
    pub cursor: Option<String>,
}

impl ListOptions {
    pub fn index(index_key: impl Into<String>) -> Self {
        Self {
            index_key: Some(index_key.into()),
            ..Self::default()
        }
    }
}

/// A single listed entry.
#[derive(Debug, Clone, PartialEq)]
pub struct ListItem<T> {
    /// Terminal segment of the storage key: the record key, or the index's
    /// key value.
    pub key: String,
    /// Full storage key.
    pub full_key: String,
    /// Absolute expiration, seconds since the Unix epoch.
    pub expiration: Option<u64>,
    /// Record decoded from the entry's metadata. `None` for entries that
    /// were written without metadata.
    pub value: Option<T>,
}

/// One page of a listing.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    /// True when no further pages exist.
    pub complete: bool,
    /// Continuation token, present when `complete` is false.
    pub cursor: Option<String>,
    pub data: Vec<ListItem<T>>,
}
