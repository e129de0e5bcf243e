//! KVPrefix - secondary indexes over a cursor-paginated key-value store.
//!
//! The backing store only offers get/put/delete by key and prefix listing
//! with cursors. KVPrefix emulates secondary indexes on top of it by writing
//! a copy of each record under one derived key per index, and by retiring
//! stale copies whenever the record changes.
//!
//! # Key Concepts
//!
//! - **Prefix**: a namespace name plus ordered [`IndexDefinition`]s. Computes
//!   every storage key of the namespace.
//! - **KvPrefix**: reads, writes, deletes and lists records of a namespace,
//!   keeping index entries in step on every mutation.
//! - **Background**: optional port that runs index mutations after the call
//!   returns instead of awaiting them.
//!
//! Index maintenance is not atomic. See [`KvPrefix`] for the consistency
//! guarantees.
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use common::InMemoryKvStore;
//! use kvprefix::{IndexDefinition, KvPrefix, ListOptions, Prefix, PutOptions};
//!
//! let mut prefix = Prefix::<User>::new("users");
//! prefix.set_index("username", IndexDefinition::new().key_value(|u: &User| u.username.clone()));
//! prefix.set_index("active", IndexDefinition::new().filter(|u: &User| u.active));
//!
//! let users = KvPrefix::new(Arc::new(InMemoryKvStore::new()), prefix);
//! users.put_data("V1StGXR8", &user, PutOptions::default()).await?;
//!
//! // Read by primary key or through an index
//! let by_id = users.get_data("V1StGXR8", None).await?;
//! let by_name = users.get_data("fred", Some("username")).await?;
//!
//! // Scan an index
//! let page = users.list_data(ListOptions::index("active")).await?;
//!
//! users.delete_data("V1StGXR8").await?;
//! ```

mod config;
mod error;
mod kv_prefix;
mod model;
mod prefix;
mod serde;

pub use config::{BackgroundMode, Config, PutOptions};
pub use error::{Error, Result};
pub use kv_prefix::{KvPrefix, ListIterator};
pub use model::{ListItem, ListOptions, ListPage};
pub use prefix::{Index, IndexDefinition, Prefix};
pub use crate::serde::{DATA_SEGMENT, DELIMITER};
