//! Polling watcher over the event log.
//!
//! Resource versions from different writers are not globally ordered, so a
//! watcher that only tails from its cursor can miss an event committed with
//! a lower RV than one already delivered. Each poll therefore re-reads a
//! trailing window of `lookback_period` behind the cursor and suppresses
//! repeats with a TTL cache of the same width.
//!
//! The poll task lives until the caller's `CancellationToken` fires; that
//! is the only shutdown path. The output channel is closed when the task
//! exits.

use std::time::Duration;

use revstore_storage::{EventStore, StorageError};
use revstore_types::{Event, NotifierSettings};
use tokio::sync::mpsc;
use tokio::task::JoinError;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::dedup::DedupCache;
use crate::rv::span_from_duration;

/// Tuning for one watch session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NotifierOptions {
    pub poll_interval: Duration,
    pub lookback_period: Duration,
    /// Capacity of the output channel
    pub buffer_size: usize,
}

impl Default for NotifierOptions {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_millis(100),
            lookback_period: Duration::from_secs(30),
            buffer_size: 10_000,
        }
    }
}

impl From<&NotifierSettings> for NotifierOptions {
    fn from(settings: &NotifierSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            lookback_period: settings.lookback_period(),
            buffer_size: settings.buffer_size,
        }
    }
}

/// Turns the event log into a live, deduplicated stream.
#[derive(Clone)]
pub struct Notifier {
    events: EventStore,
    options: NotifierOptions,
}

impl Notifier {
    pub fn new(events: EventStore, options: NotifierOptions) -> Self {
        Self { events, options }
    }

    /// Start a watch session.
    ///
    /// Only events newer than the last event present at call time are
    /// delivered. Must be called within a tokio runtime.
    pub fn watch(&self, cancel: CancellationToken) -> Result<mpsc::Receiver<Event>, StorageError> {
        let initial_rv = match self.events.last_event_key() {
            Ok(key) => key.resource_version,
            Err(e) if e.is_not_found() => 0,
            Err(e) => return Err(e),
        };
        let (tx, rx) = mpsc::channel(self.options.buffer_size.max(1));

        info!(initial_rv, "Starting watch session");
        let session = WatchSession {
            events: self.events.clone(),
            options: self.options,
            cache: DedupCache::new(self.options.lookback_period),
            initial_rv,
            last_rv: initial_rv.saturating_add(1),
        };
        tokio::spawn(session.run(tx, cancel));
        Ok(rx)
    }
}

/// Cache key identifying one delivered revision.
fn cache_key(event: &Event) -> String {
    format!(
        "{}~{}~{}~{}~{}",
        event.namespace, event.group, event.resource, event.name, event.resource_version
    )
}

struct WatchSession {
    events: EventStore,
    options: NotifierOptions,
    cache: DedupCache,
    /// Events at or below this RV predate the session.
    initial_rv: i64,
    last_rv: i64,
}

impl WatchSession {
    async fn run(mut self, tx: mpsc::Sender<Event>, cancel: CancellationToken) {
        let lookback_span = span_from_duration(self.options.lookback_period);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(self.options.poll_interval) => {}
            }

            self.cache.purge_expired();
            let since = self.last_rv.saturating_sub(lookback_span).max(0);
            let batch = match self.poll(since).await {
                Ok(Ok(batch)) => batch,
                Ok(Err(e)) => {
                    warn!(since, error = %e, "Watch poll failed");
                    continue;
                }
                Err(e) => {
                    warn!(since, error = %e, "Watch poll task failed");
                    continue;
                }
            };

            for event in batch {
                if event.resource_version <= self.initial_rv {
                    continue;
                }
                let key = cache_key(&event);
                if self.cache.contains(&key) {
                    continue;
                }
                self.last_rv = self.last_rv.max(event.resource_version.saturating_add(1));

                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("Watch cancelled while sending");
                        return;
                    }
                    sent = tx.send(event) => {
                        if sent.is_err() {
                            debug!("Watch receiver dropped");
                            return;
                        }
                    }
                }
                self.cache.insert(key);
            }
        }
        info!(last_rv = self.last_rv, "Watch session stopped");
    }

    /// Reads the event log on the blocking pool.
    async fn poll(&self, since: i64) -> Result<Result<Vec<Event>, StorageError>, JoinError> {
        let events = self.events.clone();
        tokio::task::spawn_blocking(move || events.list_since(since).collect()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use revstore_storage::MemoryKv;
    use revstore_types::Action;
    use std::sync::Arc;
    use tokio::time::timeout;

    fn event(name: &str, rv: i64) -> Event {
        Event {
            namespace: "default".to_string(),
            group: "apps".to_string(),
            resource: "deployments".to_string(),
            name: name.to_string(),
            resource_version: rv,
            action: Action::Updated,
            folder: String::new(),
            previous_rv: 0,
        }
    }

    fn setup() -> (EventStore, Notifier) {
        let events = EventStore::new(Arc::new(MemoryKv::new()));
        let notifier = Notifier::new(events.clone(), NotifierOptions::default());
        (events, notifier)
    }

    async fn assert_quiet(rx: &mut mpsc::Receiver<Event>) {
        assert!(
            timeout(Duration::from_secs(2), rx.recv()).await.is_err(),
            "no further events expected"
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_out_of_order_events_delivered_once() {
        let (events, notifier) = setup();
        events.save(&event("seed", 50)).unwrap();

        let cancel = CancellationToken::new();
        let mut rx = notifier.watch(cancel.clone()).unwrap();

        events.save(&event("late", 200)).unwrap();
        let first = rx.recv().await.unwrap();
        assert_eq!(first.resource_version, 200);

        // Written after 200 was delivered, but with a lower RV.
        events.save(&event("early", 100)).unwrap();
        let second = rx.recv().await.unwrap();
        assert_eq!(second.resource_version, 100);
        assert_eq!(second.name, "early");

        assert_quiet(&mut rx).await;
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_pre_watch_events() {
        let (events, notifier) = setup();
        events.save(&event("a", 10)).unwrap();
        events.save(&event("b", 20)).unwrap();

        let cancel = CancellationToken::new();
        let mut rx = notifier.watch(cancel.clone()).unwrap();
        assert_quiet(&mut rx).await;

        events.save(&event("c", 30)).unwrap();
        assert_eq!(rx.recv().await.unwrap().name, "c");
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_log_bootstraps_from_zero() {
        let (events, notifier) = setup();
        let cancel = CancellationToken::new();
        let mut rx = notifier.watch(cancel.clone()).unwrap();

        events.save(&event("first", 1)).unwrap();
        assert_eq!(rx.recv().await.unwrap().resource_version, 1);
        cancel.cancel();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_polls_from_blocking_pool() {
        let events = EventStore::new(Arc::new(MemoryKv::new()));
        let options = NotifierOptions {
            poll_interval: Duration::from_millis(10),
            ..Default::default()
        };
        let notifier = Notifier::new(events.clone(), options);
        let cancel = CancellationToken::new();
        let mut rx = notifier.watch(cancel.clone()).unwrap();

        events.save(&event("a", 5)).unwrap();
        events.save(&event("b", 6)).unwrap();
        let first = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        let second = timeout(Duration::from_secs(5), rx.recv()).await.unwrap().unwrap();
        assert_eq!((first.name.as_str(), second.name.as_str()), ("a", "b"));

        cancel.cancel();
        assert!(timeout(Duration::from_secs(5), rx.recv()).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_closes_channel() {
        let (_events, notifier) = setup();
        let cancel = CancellationToken::new();
        let mut rx = notifier.watch(cancel.clone()).unwrap();

        cancel.cancel();
        assert!(rx.recv().await.is_none());
    }
}
