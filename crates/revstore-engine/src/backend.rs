//! Orchestrator over the data, metadata and event stores.
//!
//! A write mints one resource version and performs three sequential saves:
//! payload, then index entry, then event. They are not atomic. A crash
//! between saves can leave an index entry without a payload (reads then
//! fail with `Internal`) or a revision without an event (watchers never
//! see it). Nothing compensates for this.

use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

use revstore_storage::{
    DataKey, DataStore, EventStore, KvStore, MetaDataKey, MetaDataObj, MetadataStore,
    StorageError,
};
use revstore_types::{
    validate_key_part, Action, Event, IndexableDocument, ListRequest, ListResponse, ReadRequest,
    ReadResponse, ResourceError, WriteEvent, WrittenEvent,
};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::continue_token::ContinueToken;
use crate::document::{DocumentBuilder, StandardDocumentBuilder};
use crate::metrics::{NoopMetrics, StorageMetrics};
use crate::notifier::{Notifier, NotifierOptions};
use crate::rv::{rv_time, RvGenerator};

/// Construction options.
#[derive(Debug, Clone, Copy, Default)]
pub struct BackendOptions {
    /// Node ID embedded in minted versions; random when unset
    pub node_id: Option<u16>,
    pub notifier: NotifierOptions,
}

/// One row produced by a list or history scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListItem {
    pub response: ReadResponse,
    /// Token resuming the scan after this row
    pub continue_token: String,
}

/// Versioned resource store over a single KV substrate.
pub struct StorageBackend {
    pub(crate) data: DataStore,
    pub(crate) meta: MetadataStore,
    pub(crate) events: EventStore,
    pub(crate) rv: RvGenerator,
    pub(crate) metrics: Arc<dyn StorageMetrics>,
    notifier: Notifier,
    builder: Arc<dyn DocumentBuilder>,
    options: BackendOptions,
}

impl StorageBackend {
    /// Backend with the standard document builder and no metrics.
    pub fn new(kv: Arc<dyn KvStore>, options: BackendOptions) -> Self {
        let events = EventStore::new(kv.clone());
        let rv = match options.node_id {
            Some(node_id) => RvGenerator::new(node_id),
            None => RvGenerator::with_random_node(),
        };
        info!(node_id = rv.node_id(), "Storage backend ready");
        Self {
            data: DataStore::new(kv.clone()),
            meta: MetadataStore::new(kv),
            notifier: Notifier::new(events.clone(), options.notifier),
            events,
            rv,
            metrics: Arc::new(NoopMetrics),
            builder: Arc::new(StandardDocumentBuilder),
            options,
        }
    }

    pub fn with_document_builder(mut self, builder: Arc<dyn DocumentBuilder>) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn StorageMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn data_store(&self) -> &DataStore {
        &self.data
    }

    pub fn metadata_store(&self) -> &MetadataStore {
        &self.meta
    }

    pub fn event_store(&self) -> &EventStore {
        &self.events
    }

    /// Mint a version from the engine clock.
    pub fn current_resource_version(&self) -> i64 {
        self.rv.next()
    }

    /// Apply one write and return its resource version.
    ///
    /// Creates fail with `AlreadyExists` against a live identity. Updates
    /// and deletes require a live identity; a non-zero `previous_rv` must
    /// match its latest revision. Deletes must carry `previous_rv`.
    pub fn write_event(&self, event: WriteEvent) -> Result<i64, ResourceError> {
        let started = Instant::now();
        event.key.validate().map_err(ResourceError::Validation)?;
        if !event.folder.is_empty() {
            validate_key_part("folder", &event.folder).map_err(ResourceError::Validation)?;
        }
        if event.action == Action::Deleted && event.previous_rv <= 0 {
            return Err(ResourceError::Validation(
                "previous resource version is required to delete".to_string(),
            ));
        }

        let rv = self.rv.next();

        match event.action {
            Action::Created => match self.meta.get_latest_resource_key(&event.key) {
                Ok(existing) => {
                    return Err(ResourceError::AlreadyExists(format!(
                        "{} exists at revision {}",
                        event.key, existing.resource_version
                    )))
                }
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            },
            Action::Updated | Action::Deleted => {
                let latest = self.meta.get_latest_resource_key(&event.key)?;
                if event.previous_rv > 0 && latest.resource_version != event.previous_rv {
                    return Err(ResourceError::OptimisticLockingFailed {
                        expected: event.previous_rv,
                        actual: latest.resource_version,
                    });
                }
            }
        }

        let mut document = if event.action == Action::Deleted && event.value.is_empty() {
            IndexableDocument::new(event.key.clone(), rv)
        } else {
            self.builder.build_document(&event.key, rv, &event.value)?
        };
        document.folder = event.folder.clone();

        self.data
            .save(&DataKey::new(&event.key, rv, event.action), &event.value)?;
        self.meta.save(&MetaDataObj {
            key: MetaDataKey::new(&event.key, rv, event.action, event.folder.clone()),
            value: document,
        })?;
        self.events.save(&Event {
            namespace: event.key.namespace.clone(),
            group: event.key.group.clone(),
            resource: event.key.resource.clone(),
            name: event.key.name.clone(),
            resource_version: rv,
            action: event.action,
            folder: event.folder,
            previous_rv: event.previous_rv,
        })?;

        self.metrics.record_write(event.action, started.elapsed());
        debug!(key = %event.key, rv, action = %event.action, "Wrote resource");
        Ok(rv)
    }

    /// Payload of the revision a metadata key points at.
    ///
    /// A missing payload means the stores disagree and is reported as
    /// `Internal`.
    pub(crate) fn fetch_payload(&self, key: &MetaDataKey) -> Result<Vec<u8>, ResourceError> {
        self.data.get(&key.data_key()).map_err(|e| match e {
            StorageError::NotFound(_) => ResourceError::Internal(format!(
                "metadata entry {} has no payload",
                key.encode()
            )),
            other => other.into(),
        })
    }

    pub(crate) fn response_for(
        &self,
        key: &MetaDataKey,
    ) -> Result<ReadResponse, ResourceError> {
        Ok(ReadResponse {
            key: key.resource_key(),
            value: self.fetch_payload(key)?,
            resource_version: key.resource_version,
            folder: key.folder.clone(),
        })
    }

    /// Read the latest revision, or the one visible at `resource_version`.
    pub fn read_resource(&self, req: &ReadRequest) -> Result<ReadResponse, ResourceError> {
        req.key.validate().map_err(ResourceError::Validation)?;
        let key = if req.resource_version > 0 {
            self.meta
                .get_resource_key_at_revision(&req.key, req.resource_version)?
        } else {
            self.meta.get_latest_resource_key(&req.key)?
        };
        self.response_for(&key)
    }

    /// Visit a consistent snapshot of `req.key`.
    ///
    /// The first page pins the snapshot at `req.resource_version`, or at a
    /// freshly minted version when 0. Later pages take the snapshot and the
    /// offset from the continue token. At most `limit + 1` rows are visited;
    /// the extra row signals another page. Returns the snapshot version.
    pub fn list_iterator<F>(&self, req: &ListRequest, mut visit: F) -> Result<i64, ResourceError>
    where
        F: FnMut(ListItem) -> ControlFlow<()>,
    {
        req.key.validate().map_err(ResourceError::Validation)?;
        let (list_rv, offset) = match ContinueToken::parse_optional(&req.next_page_token)? {
            Some(token) => (token.resource_version, token.start_offset.max(0)),
            None if req.resource_version > 0 => (req.resource_version, 0),
            None => (self.rv.next(), 0),
        };
        let cap = if req.limit > 0 { req.limit.saturating_add(1) } else { i64::MAX };

        let mut position = 0i64;
        let mut visited = 0i64;
        for item in self.meta.list_resource_keys_at_revision(&req.key, list_rv) {
            let key = item?;
            position += 1;
            if position <= offset {
                continue;
            }
            if visited >= cap {
                break;
            }
            visited += 1;
            let row = ListItem {
                response: self.response_for(&key)?,
                continue_token: ContinueToken::new(position, list_rv).encode(),
            };
            if visit(row).is_break() {
                break;
            }
        }
        Ok(list_rv)
    }

    /// One page of a snapshot list.
    pub fn list(&self, req: &ListRequest) -> Result<ListResponse, ResourceError> {
        collect_page(req.limit, |visit| self.list_iterator(req, visit))
    }

    /// Stream of committed writes with their payloads.
    ///
    /// Events whose payload cannot be read are logged and dropped; the
    /// stream continues. The stream ends when `cancel` fires.
    pub fn watch_write_events(
        &self,
        cancel: CancellationToken,
    ) -> Result<mpsc::Receiver<WrittenEvent>, ResourceError> {
        let mut events = self.notifier.watch(cancel.clone())?;
        let (tx, rx) = mpsc::channel(self.options.notifier.buffer_size.max(1));
        let data = self.data.clone();
        let metrics = self.metrics.clone();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = events.recv() => match next {
                        Some(event) => event,
                        None => break,
                    },
                };
                let fetched = {
                    let data = data.clone();
                    tokio::task::spawn_blocking(move || written_event(&data, event)).await
                };
                let written = match fetched {
                    Ok(Ok(written)) => written,
                    Ok(Err((key, e))) => {
                        warn!(key = %key, error = %e, "Dropping watch event without payload");
                        metrics.record_watch_event_dropped();
                        continue;
                    }
                    Err(e) => {
                        warn!(error = %e, "Watch payload task failed");
                        metrics.record_watch_event_dropped();
                        continue;
                    }
                };
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(written) => {
                        if sent.is_err() {
                            break;
                        }
                    }
                }
            }
            debug!("Write event stream closed");
        });
        Ok(rx)
    }
}

fn written_event(data: &DataStore, event: Event) -> Result<WrittenEvent, (String, StorageError)> {
    let key = event.key();
    let data_key = DataKey::new(&key, event.resource_version, event.action);
    let value = data
        .get(&data_key)
        .map_err(|e| (data_key.encode(), e))?;
    Ok(WrittenEvent {
        key,
        action: event.action,
        folder: event.folder,
        value,
        resource_version: event.resource_version,
        previous_rv: event.previous_rv,
        timestamp: rv_time(event.resource_version),
    })
}

/// Drive a visiting scan and cut one page of at most `limit` rows.
pub(crate) fn collect_page<S>(limit: i64, scan: S) -> Result<ListResponse, ResourceError>
where
    S: FnOnce(&mut dyn FnMut(ListItem) -> ControlFlow<()>) -> Result<i64, ResourceError>,
{
    let mut items = Vec::new();
    let mut last_token = String::new();
    let mut next_page_token = None;

    let resource_version = scan(&mut |item: ListItem| {
        if limit > 0 && items.len() as i64 >= limit {
            next_page_token = Some(std::mem::take(&mut last_token));
            return ControlFlow::Break(());
        }
        last_token = item.continue_token;
        items.push(item.response);
        ControlFlow::Continue(())
    })?;

    Ok(ListResponse {
        items,
        resource_version,
        next_page_token,
    })
}
