//! Versioned resource storage engine.
//!
//! `StorageBackend` ties the storage-layer stores together:
//! - Writes with optimistic concurrency and per-write resource versions
//! - Latest and point-in-time reads, paginated snapshot lists
//! - Per-identity history and trash
//! - Polling watch with lookback and deduplication (`Notifier`)
//! - Batched garbage collection of deleted history (`GarbageCollector`)
//!
//! Resource versions are time-ordered snowflake IDs; see [`rv`].

pub mod backend;
pub mod continue_token;
pub mod dedup;
pub mod document;
pub mod gc;
pub mod history;
pub mod metrics;
pub mod notifier;
pub mod rv;
pub mod stats;

pub use backend::{BackendOptions, ListItem, StorageBackend};
pub use continue_token::{ContinueToken, ContinueTokenError};
pub use document::{DocumentBuilder, StandardDocumentBuilder};
pub use gc::{GarbageCollector, GcBatchResult, GcOptions, GcReport};
pub use metrics::{NoopMetrics, StorageMetrics};
pub use notifier::{Notifier, NotifierOptions};
pub use rv::RvGenerator;
