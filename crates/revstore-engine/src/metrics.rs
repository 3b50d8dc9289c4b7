//! Metrics hook injected into the backend.
//!
//! The engine reports through this trait only; wiring a registry is the
//! embedder's concern. Every method has a no-op default.

use std::time::Duration;

use revstore_types::Action;

pub trait StorageMetrics: Send + Sync {
    /// One completed write.
    fn record_write(&self, _action: Action, _elapsed: Duration) {}

    /// A watch event was dropped because its payload could not be read.
    fn record_watch_event_dropped(&self) {}

    /// Rows removed by one garbage collection pass over `group_resource`.
    fn record_gc_rows(&self, _group_resource: &str, _deleted: u64) {}
}

/// Discards every measurement.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl StorageMetrics for NoopMetrics {}
