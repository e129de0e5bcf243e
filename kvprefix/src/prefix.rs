//! Namespace descriptors and index definitions.

use std::fmt;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::serde::{DATA_SEGMENT, DELIMITER, join_key, validate_segment};

type FilterFn<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;
type SegmentFn<T> = Arc<dyn Fn(&T) -> String + Send + Sync>;

/// Rules mapping a record into one derived ordering.
///
/// All rules are optional:
///
/// - `filter`: records for which it returns false are left out of the index.
///   Primary storage is unaffected.
/// - `sort_value`: inserted into the index key so that a prefix scan returns
///   records ordered by it. The caller is responsible for producing strings
///   that sort correctly (zero padding, inverted numbers for descending order).
/// - `key_value`: replaces the record key as the terminal key segment, e.g.
///   to look records up by username instead of id.
///
/// ```ignore
/// let by_age = IndexDefinition::new()
///     .filter(|u: &User| u.active)
///     .sort_value(|u: &User| format!("{:03}", u.age));
/// ```
pub struct IndexDefinition<T> {
    filter: Option<FilterFn<T>>,
    sort_value: Option<SegmentFn<T>>,
    key_value: Option<SegmentFn<T>>,
}

impl<T> IndexDefinition<T> {
    pub fn new() -> Self {
        Self {
            filter: None,
            sort_value: None,
            key_value: None,
        }
    }

    pub fn filter(mut self, filter: impl Fn(&T) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    pub fn sort_value(mut self, sort_value: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.sort_value = Some(Arc::new(sort_value));
        self
    }

    pub fn key_value(mut self, key_value: impl Fn(&T) -> String + Send + Sync + 'static) -> Self {
        self.key_value = Some(Arc::new(key_value));
        self
    }

    /// True when no rule is set, as for indexes that were never registered.
    pub fn is_empty(&self) -> bool {
        self.filter.is_none() && self.sort_value.is_none() && self.key_value.is_none()
    }

    /// Returns whether `value` belongs in this index. No filter accepts everything.
    pub fn accepts(&self, value: &T) -> bool {
        self.filter.as_ref().is_none_or(|filter| filter(value))
    }

    pub fn sort_value_of(&self, value: &T) -> Option<String> {
        self.sort_value.as_ref().map(|f| f(value))
    }

    pub fn key_value_of(&self, value: &T) -> Option<String> {
        self.key_value.as_ref().map(|f| f(value))
    }
}

impl<T> Default for IndexDefinition<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Clone for IndexDefinition<T> {
    fn clone(&self) -> Self {
        Self {
            filter: self.filter.clone(),
            sort_value: self.sort_value.clone(),
            key_value: self.key_value.clone(),
        }
    }
}

/// Two definitions are equal when they share the very same rule closures.
impl<T> PartialEq for IndexDefinition<T> {
    fn eq(&self, other: &Self) -> bool {
        fn same<F: ?Sized>(a: &Option<Arc<F>>, b: &Option<Arc<F>>) -> bool {
            match (a, b) {
                (Some(a), Some(b)) => Arc::ptr_eq(a, b),
                (None, None) => true,
                _ => false,
            }
        }
        same(&self.filter, &other.filter)
            && same(&self.sort_value, &other.sort_value)
            && same(&self.key_value, &other.key_value)
    }
}

impl<T> fmt::Debug for IndexDefinition<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexDefinition")
            .field("filter", &self.filter.is_some())
            .field("sort_value", &self.sort_value.is_some())
            .field("key_value", &self.key_value.is_some())
            .finish()
    }
}

/// A named index definition.
pub struct Index<T> {
    pub name: String,
    pub definition: IndexDefinition<T>,
}

impl<T> Clone for Index<T> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            definition: self.definition.clone(),
        }
    }
}

impl<T> PartialEq for Index<T> {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.definition == other.definition
    }
}

impl<T> fmt::Debug for Index<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Index")
            .field("name", &self.name)
            .field("definition", &self.definition)
            .finish()
    }
}

/// Namespace descriptor: a namespace name and its ordered index definitions.
///
/// Computes every storage key of the namespace. Index registration order is
/// the order in which index maintenance runs on put and delete. Registering
/// an index does not index records that were written before it.
pub struct Prefix<T> {
    name: String,
    indexes: Vec<Index<T>>,
}

impl<T> Prefix<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            indexes: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Prefix shared by all primary record keys, e.g. `users::key::`.
    pub fn data_prefix(&self) -> String {
        format!("{}{}", join_key([self.name.as_str(), DATA_SEGMENT]), DELIMITER)
    }

    /// Prefix shared by all entries of `index`, e.g. `users::username::`.
    pub fn index_prefix(&self, index: &Index<T>) -> String {
        format!("{}{}", join_key([self.name.as_str(), index.name.as_str()]), DELIMITER)
    }

    /// Storage key of the primary record.
    pub fn create_data_key(&self, record_key: &str) -> String {
        join_key([self.name.as_str(), DATA_SEGMENT, record_key])
    }

    /// Storage key of the entry `value` occupies in `index`.
    pub fn create_index_data_key(&self, index: &Index<T>, value: &T, record_key: &str) -> String {
        let sort_value = index.definition.sort_value_of(value);
        let key_value = index.definition.key_value_of(value);

        let mut segments = vec![self.name.as_str(), index.name.as_str()];
        if let Some(sort_value) = sort_value.as_deref() {
            segments.push(sort_value);
        }
        segments.push(key_value.as_deref().unwrap_or(record_key));
        join_key(segments)
    }

    /// Registers `definition` under `name`, replacing any definition already
    /// registered under that name in place.
    ///
    /// Entries written under a replaced definition are not migrated.
    pub fn set_index(&mut self, name: impl Into<String>, definition: IndexDefinition<T>) -> Index<T> {
        let index = Index {
            name: name.into(),
            definition,
        };
        match self.indexes.iter_mut().find(|i| i.name == index.name) {
            Some(existing) => *existing = index.clone(),
            None => self.indexes.push(index.clone()),
        }
        index
    }

    /// Looks an index up by name.
    ///
    /// Names that were never registered yield an empty definition, which maps
    /// every record to `namespace::name::record_key`.
    pub fn get_index(&self, name: &str) -> Index<T> {
        self.indexes
            .iter()
            .find(|i| i.name == name)
            .cloned()
            .unwrap_or_else(|| Index {
                name: name.to_string(),
                definition: IndexDefinition::new(),
            })
    }

    /// All registered indexes, in registration order.
    pub fn list_index(&self) -> Vec<Index<T>> {
        self.indexes.clone()
    }

    pub(crate) fn indexes(&self) -> &[Index<T>] {
        &self.indexes
    }

    /// Every key `(record_key, value)` occupies: the primary key followed by
    /// one key per index whose filter accepts `value`.
    pub fn get_data_prefixes(&self, record_key: &str, value: &T) -> Vec<String> {
        let mut keys = vec![self.create_data_key(record_key)];
        keys.extend(
            self.indexes
                .iter()
                .filter(|index| index.definition.accepts(value))
                .map(|index| self.create_index_data_key(index, value, record_key)),
        );
        keys
    }

    /// Checks the namespace, index names and the segments `value` derives
    /// for every index whose filter accepts it, before anything is written.
    pub(crate) fn validate_record(&self, record_key: &str, value: &T) -> Result<()> {
        validate_segment("namespace name", &self.name)?;
        validate_segment("record key", record_key)?;
        for index in &self.indexes {
            validate_index_name(&index.name)?;
            if !index.definition.accepts(value) {
                continue;
            }
            if let Some(sort_value) = index.definition.sort_value_of(value) {
                validate_segment(&format!("sort value of index '{}'", index.name), &sort_value)?;
            }
            if let Some(key_value) = index.definition.key_value_of(value) {
                validate_segment(&format!("key value of index '{}'", index.name), &key_value)?;
            }
        }
        Ok(())
    }
}

/// Index names share the second key segment with primary records.
pub(crate) fn validate_index_name(name: &str) -> Result<()> {
    validate_segment("index name", name)?;
    if name == DATA_SEGMENT {
        return Err(Error::InvalidInput(format!(
            "index name '{}' is reserved for primary records",
            DATA_SEGMENT
        )));
    }
    Ok(())
}

impl<T> fmt::Debug for Prefix<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Prefix")
            .field("name", &self.name)
            .field("indexes", &self.indexes)
            .finish()
    }
}
