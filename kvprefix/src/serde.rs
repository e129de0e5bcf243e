//! Storage key composition and value encoding.
//!
//! Keys are built from segments joined by `::`:
//!
//! ```text
//! primary key:  | namespace | key       | record_key                       |
//! index key:    | namespace | index     | sort_value? | key_value ?? record_key |
//! ```
//!
//! Segments are not escaped. A segment must be non-empty, must not contain
//! `::` and must not start or end with `:`, otherwise two different segment
//! lists could produce the same key.

use bytes::Bytes;
use common::ValueWithMetadata;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{Error, Result};

/// Separator between key segments.
pub const DELIMITER: &str = "::";

/// Segment that marks primary records, in place of an index name.
pub const DATA_SEGMENT: &str = "key";

/// Joins segments into a storage key.
pub(crate) fn join_key<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments.into_iter().collect::<Vec<_>>().join(DELIMITER)
}

/// Returns the terminal segment of a storage key.
pub(crate) fn last_segment(full_key: &str) -> &str {
    full_key.rsplit(DELIMITER).next().unwrap_or(full_key)
}

/// Checks that `segment` can be embedded in a key without ambiguity.
///
/// `kind` names the segment in the error message.
pub(crate) fn validate_segment(kind: &str, segment: &str) -> Result<()> {
    if segment.is_empty() {
        return Err(Error::InvalidInput(format!("{} must not be empty", kind)));
    }
    if segment.contains(DELIMITER) || segment.starts_with(':') || segment.ends_with(':') {
        return Err(Error::InvalidInput(format!(
            "{} '{}' must not contain '{}' or start or end with ':'",
            kind, segment, DELIMITER
        )));
    }
    Ok(())
}

/// Serializes a record into its raw payload and its structured metadata.
pub(crate) fn encode_value<T: Serialize>(value: &T) -> Result<(Bytes, Value)> {
    let metadata = serde_json::to_value(value)?;
    let raw = serde_json::to_vec(&metadata)?;
    Ok((Bytes::from(raw), metadata))
}

/// Decodes a record from structured metadata.
pub(crate) fn decode_metadata<T: DeserializeOwned>(metadata: Value) -> Result<T> {
    serde_json::from_value(metadata).map_err(|e| Error::Encoding(e.to_string()))
}

/// Decodes a stored record, preferring its metadata and falling back to the
/// raw payload for entries written without metadata.
pub(crate) fn decode_stored<T: DeserializeOwned>(stored: ValueWithMetadata) -> Result<T> {
    match stored.metadata {
        Some(metadata) => decode_metadata(metadata),
        None => serde_json::from_slice(&stored.value).map_err(|e| Error::Encoding(e.to_string())),
    }
}
