//! Storage layer for the revstore engine.
//!
//! Provides:
//! - The ordered key-value substrate contract (`KvStore`) with RocksDB and
//!   in-memory adapters
//! - Sortable key codecs for the data, metadata and event sections
//! - `DataStore`: payloads, one row per revision
//! - `MetadataStore`: revision index and snapshot resolution
//! - `EventStore`: change notification log
//!
//! The three stores share one substrate and never write across sections
//! atomically.

pub mod data_store;
pub mod error;
pub mod event_store;
pub mod keys;
pub mod kv;
pub mod memory;
pub mod metadata_store;
pub mod rocks;
pub mod sections;

pub use data_store::DataStore;
pub use error::StorageError;
pub use event_store::EventStore;
pub use keys::{format_rv, scope_prefix, DataKey, EventKey, MetaDataKey};
pub use kv::{prefix_end, KeyIter, KvStore, ListOptions, PairIter, SortOrder};
pub use memory::MemoryKv;
pub use metadata_store::{MetaDataObj, MetadataStore};
pub use rocks::RocksKv;
pub use sections::{ALL_SECTIONS, SECTION_DATA, SECTION_EVENTS, SECTION_METADATA};
