//! Garbage collection of obsolete history.
//!
//! Reclaims only identities whose latest revision is a deletion:
//! - live identities keep their whole history, including rows from before
//!   a delete and recreate
//! - a tombstone newer than the cutoff keeps itself so trash stays visible;
//!   older rows are removed
//! - a tombstone older than the cutoff is removed with everything before it
//!
//! Each removed revision deletes both its payload and its metadata row.
//! Work is batched per `(group, resource)` and resumable: a batch scans
//! metadata keys newest first inside `[start_key, end_key)` and reports
//! where the next batch should end.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use revstore_storage::{prefix_end, ListOptions, MetaDataKey};
use revstore_types::{Action, GcSettings, ResourceError};
use tokio::task::JoinHandle;
use tokio::time::interval;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::backend::StorageBackend;
use crate::rv::{rv_from_time, span_from_duration};

/// Group of the resource type with its own retention.
pub const DASHBOARD_GROUP: &str = "dashboard.grafana.app";
pub const DASHBOARD_RESOURCE: &str = "dashboards";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GcOptions {
    pub enabled: bool,
    /// Count rows without deleting them
    pub dry_run: bool,
    pub interval: Duration,
    /// Rows to examine per batch; the identity in progress is always finished
    pub batch_size: usize,
    pub max_age: Duration,
    pub dashboards_max_age: Duration,
    /// Age after which change notifications are dropped
    pub event_retention: Duration,
}

impl Default for GcOptions {
    fn default() -> Self {
        Self::from(&GcSettings::default())
    }
}

impl From<&GcSettings> for GcOptions {
    fn from(settings: &GcSettings) -> Self {
        Self {
            enabled: settings.enabled,
            dry_run: settings.dry_run,
            interval: settings.interval(),
            batch_size: settings.batch_size,
            max_age: settings.max_age(),
            dashboards_max_age: settings.dashboards_max_age(),
            event_retention: settings.event_retention(),
        }
    }
}

impl GcOptions {
    /// Retention for one resource type.
    pub fn max_age_for(&self, group: &str, resource: &str) -> Duration {
        if group == DASHBOARD_GROUP && resource == DASHBOARD_RESOURCE {
            self.dashboards_max_age
        } else {
            self.max_age
        }
    }
}

/// Outcome of one batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcBatchResult {
    pub rows_deleted: u64,
    pub rows_processed: u64,
    /// Exclusive end key for the next batch; `None` when the range is done
    pub next_end_key: Option<String>,
}

/// Outcome of one full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GcReport {
    /// Rows deleted per `group/resource`
    pub deleted: BTreeMap<String, u64>,
    /// Pairs whose pass stopped on an error
    pub failed: Vec<String>,
    pub events_deleted: u64,
    pub dry_run: bool,
}

impl GcReport {
    pub fn total_deleted(&self) -> u64 {
        self.deleted.values().sum()
    }
}

impl StorageBackend {
    /// Process one batch of `group/resource` history older than `cutoff_rv`.
    ///
    /// The range is clamped to the pair's key prefix. Empty bounds mean the
    /// start or end of the prefix.
    #[allow(clippy::too_many_arguments)]
    pub fn garbage_collect_batch(
        &self,
        group: &str,
        resource: &str,
        cutoff_rv: i64,
        start_key: &str,
        end_key: &str,
        batch_size: usize,
        dry_run: bool,
    ) -> Result<GcBatchResult, ResourceError> {
        let prefix = format!("{}/{}/", group, resource);
        let prefix_stop = prefix_end(&prefix);
        let start = start_key.max(prefix.as_str());
        let end = if !end_key.is_empty() && end_key < prefix_stop.as_str() {
            end_key
        } else {
            prefix_stop.as_str()
        };

        let mut result = GcBatchResult::default();
        let mut identity: Vec<MetaDataKey> = Vec::new();
        // Stored form of the identity's oldest row; resuming below it
        // must not depend on how its RV was padded.
        let mut oldest_raw = String::new();
        let opts = ListOptions::range(start, end).descending();

        for item in self.meta.scan_encoded(opts) {
            let (raw, key) = item?;
            let same = identity.first().is_some_and(|first| {
                first.name == key.name && first.namespace == key.namespace
            });
            if !identity.is_empty() && !same {
                self.collect_identity(&identity, cutoff_rv, dry_run, &mut result)?;
                if result.rows_processed >= batch_size as u64 {
                    result.next_end_key = Some(oldest_raw);
                    return Ok(result);
                }
                identity.clear();
            }
            identity.push(key);
            oldest_raw = raw;
        }
        if !identity.is_empty() {
            self.collect_identity(&identity, cutoff_rv, dry_run, &mut result)?;
        }
        Ok(result)
    }

    /// Apply the retention policy to one identity's rows, newest first.
    fn collect_identity(
        &self,
        rows: &[MetaDataKey],
        cutoff_rv: i64,
        dry_run: bool,
        result: &mut GcBatchResult,
    ) -> Result<(), ResourceError> {
        result.rows_processed += rows.len() as u64;
        let Some(latest) = rows.first() else {
            return Ok(());
        };
        if latest.action != Action::Deleted {
            return Ok(());
        }

        let trash_expired = latest.resource_version < cutoff_rv;
        let mut deleted = 0u64;
        for row in rows {
            if !trash_expired && row.resource_version >= cutoff_rv {
                continue;
            }
            if !dry_run {
                self.data.delete(&row.data_key())?;
                self.meta.delete(row)?;
            }
            deleted += 1;
        }
        result.rows_deleted += deleted;
        debug!(key = %latest.resource_key(), trash_expired, deleted, "Collected identity");
        Ok(())
    }

    /// One full pass over every `(group, resource)` pair and the event log.
    ///
    /// Checks `cancel` between batches. A failing batch stops only its own
    /// pair; the pair is listed in `failed`. Keys too malformed to name a
    /// pair are skipped during discovery.
    pub fn run_garbage_collection(
        &self,
        options: &GcOptions,
        cancel: &CancellationToken,
    ) -> Result<GcReport, ResourceError> {
        let now_rv = rv_from_time(Utc::now());
        let mut report = GcReport {
            dry_run: options.dry_run,
            ..Default::default()
        };

        for (group, resource) in self.meta.group_resources()? {
            if cancel.is_cancelled() {
                info!("Garbage collection cancelled");
                return Ok(report);
            }
            let group_resource = format!("{}/{}", group, resource);
            let max_age = options.max_age_for(&group, &resource);
            let cutoff_rv = now_rv.saturating_sub(span_from_duration(max_age)).max(0);

            let mut end_key = String::new();
            let mut deleted = 0u64;
            loop {
                if cancel.is_cancelled() {
                    break;
                }
                match self.garbage_collect_batch(
                    &group,
                    &resource,
                    cutoff_rv,
                    "",
                    &end_key,
                    options.batch_size,
                    options.dry_run,
                ) {
                    Ok(batch) => {
                        deleted += batch.rows_deleted;
                        match batch.next_end_key {
                            Some(next) => end_key = next,
                            None => break,
                        }
                    }
                    Err(e) => {
                        error!(group = %group, resource = %resource, error = %e, "Garbage collection batch failed");
                        report.failed.push(group_resource.clone());
                        break;
                    }
                }
            }

            if deleted > 0 {
                info!(group = %group, resource = %resource, deleted, dry_run = options.dry_run, "Collected history");
            }
            self.metrics.record_gc_rows(&group_resource, deleted);
            report.deleted.insert(group_resource, deleted);
        }

        let event_cutoff = now_rv
            .saturating_sub(span_from_duration(options.event_retention))
            .max(0);
        match self.events.cleanup_before(event_cutoff, options.dry_run) {
            Ok(count) => report.events_deleted = count as u64,
            Err(e) => warn!(error = %e, "Event log cleanup failed"),
        }

        Ok(report)
    }
}

/// Periodic garbage collection task.
pub struct GarbageCollector {
    backend: Arc<StorageBackend>,
    options: GcOptions,
}

impl GarbageCollector {
    pub fn new(backend: Arc<StorageBackend>, options: GcOptions) -> Self {
        Self { backend, options }
    }

    /// Run one pass on the blocking pool.
    pub async fn run_once(&self, cancel: &CancellationToken) -> Result<GcReport, ResourceError> {
        let backend = self.backend.clone();
        let options = self.options.clone();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || backend.run_garbage_collection(&options, &cancel))
            .await
            .map_err(|e| ResourceError::Internal(format!("garbage collection task failed: {}", e)))?
    }

    /// Run a pass every `interval` until `cancel` fires. The first pass
    /// starts immediately. Does nothing when disabled.
    pub fn start(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move {
            if !self.options.enabled {
                info!("Garbage collection disabled");
                return;
            }
            let mut ticker = interval(self.options.interval.max(Duration::from_millis(1)));
            info!(interval_secs = self.options.interval.as_secs(), "Garbage collector started");

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {}
                }
                match self.run_once(&cancel).await {
                    Ok(report) => info!(
                        deleted = report.total_deleted(),
                        events_deleted = report.events_deleted,
                        failed = report.failed.len(),
                        dry_run = report.dry_run,
                        "Garbage collection pass complete"
                    ),
                    Err(e) => warn!(error = %e, "Garbage collection pass failed"),
                }
            }
            info!("Garbage collector stopped");
        })
    }
}
