//! Append-only change notification log ordered by RV.

use std::sync::Arc;

use revstore_types::Event;
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::keys::EventKey;
use crate::kv::{KvStore, ListOptions};
use crate::sections::SECTION_EVENTS;

#[derive(Clone)]
pub struct EventStore {
    kv: Arc<dyn KvStore>,
}

impl EventStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, event: &Event) -> Result<(), StorageError> {
        let key = EventKey::new(&event.key(), event.resource_version);
        key.validate()?;
        let encoded = key.encode();
        self.kv.save(SECTION_EVENTS, &encoded, &event.to_bytes()?)?;
        debug!(key = %encoded, action = %event.action, "Appended event");
        Ok(())
    }

    pub fn get(&self, key: &EventKey) -> Result<Event, StorageError> {
        let bytes = self.kv.get(SECTION_EVENTS, &key.encode())?;
        Ok(Event::from_bytes(&bytes)?)
    }

    /// Key with the highest RV.
    ///
    /// Malformed keys are skipped with a warning. Fails with `NotFound`
    /// when no well-formed key exists.
    pub fn last_event_key(&self) -> Result<EventKey, StorageError> {
        for item in self
            .kv
            .keys(SECTION_EVENTS, ListOptions::default().descending())
        {
            let raw = item?;
            match EventKey::parse(&raw) {
                Ok(key) => return Ok(key),
                Err(e) => warn!(key = %raw, error = %e, "Skipping malformed event key"),
            }
        }
        Err(StorageError::NotFound("event log is empty".to_string()))
    }

    /// Events with RV at least `since_rv`, ascending.
    ///
    /// Malformed keys are skipped with a warning. Rows removed between the
    /// key scan and the read are skipped silently.
    pub fn list_since<'a>(
        &'a self,
        since_rv: i64,
    ) -> impl Iterator<Item = Result<Event, StorageError>> + 'a {
        let opts = ListOptions::range(EventKey::start_at(since_rv), "");
        self.kv
            .keys(SECTION_EVENTS, opts)
            .filter_map(move |item| {
                let raw = match item {
                    Ok(raw) => raw,
                    Err(e) => return Some(Err(e)),
                };
                let key = match EventKey::parse(&raw) {
                    Ok(key) => key,
                    Err(e) => {
                        warn!(key = %raw, error = %e, "Skipping malformed event key");
                        return None;
                    }
                };
                match self.get(&key) {
                    Ok(event) => Some(Ok(event)),
                    Err(e) if e.is_not_found() => None,
                    Err(e) => Some(Err(e)),
                }
            })
    }

    /// Delete every event with RV below `cutoff_rv`; returns the count.
    ///
    /// With `dry_run` the rows are only counted.
    pub fn cleanup_before(&self, cutoff_rv: i64, dry_run: bool) -> Result<usize, StorageError> {
        let opts = ListOptions::range("", EventKey::start_at(cutoff_rv));
        let keys = self
            .kv
            .keys(SECTION_EVENTS, opts)
            .collect::<Result<Vec<_>, _>>()?;
        if !dry_run {
            for key in &keys {
                self.kv.delete(SECTION_EVENTS, key)?;
            }
        }
        debug!(cutoff_rv, count = keys.len(), dry_run, "Cleaned up events");
        Ok(keys.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use revstore_types::Action;

    fn event(name: &str, rv: i64) -> Event {
        Event {
            namespace: "default".to_string(),
            group: "apps".to_string(),
            resource: "deployments".to_string(),
            name: name.to_string(),
            resource_version: rv,
            action: Action::Created,
            folder: String::new(),
            previous_rv: 0,
        }
    }

    #[test]
    fn test_save_and_get() {
        let store = EventStore::new(Arc::new(MemoryKv::new()));
        let ev = event("web", 10);
        store.save(&ev).unwrap();

        let key = EventKey::new(&ev.key(), 10);
        assert_eq!(store.get(&key).unwrap(), ev);
        assert!(store
            .get(&EventKey::new(&ev.key(), 11))
            .unwrap_err()
            .is_not_found());
    }

    #[test]
    fn test_last_event_key() {
        let store = EventStore::new(Arc::new(MemoryKv::new()));
        assert!(store.last_event_key().unwrap_err().is_not_found());

        store.save(&event("a", 99)).unwrap();
        store.save(&event("b", 100)).unwrap();
        store.save(&event("c", 7)).unwrap();
        assert_eq!(store.last_event_key().unwrap().resource_version, 100);
    }

    #[test]
    fn test_last_event_key_skips_malformed() {
        let kv = Arc::new(MemoryKv::new());
        let store = EventStore::new(kv.clone());
        store.save(&event("a", 5)).unwrap();
        kv.save(SECTION_EVENTS, "zzz-not-a-key", b"{}").unwrap();
        assert_eq!(store.last_event_key().unwrap().resource_version, 5);
    }

    #[test]
    fn test_list_since() {
        let store = EventStore::new(Arc::new(MemoryKv::new()));
        for (name, rv) in [("a", 10), ("b", 20), ("c", 30)] {
            store.save(&event(name, rv)).unwrap();
        }
        let rvs: Vec<i64> = store
            .list_since(20)
            .map(|e| e.unwrap().resource_version)
            .collect();
        assert_eq!(rvs, vec![20, 30]);

        let all: Vec<i64> = store
            .list_since(0)
            .map(|e| e.unwrap().resource_version)
            .collect();
        assert_eq!(all, vec![10, 20, 30]);
    }

    #[test]
    fn test_cleanup_before() {
        let store = EventStore::new(Arc::new(MemoryKv::new()));
        for (name, rv) in [("a", 10), ("b", 20), ("c", 30)] {
            store.save(&event(name, rv)).unwrap();
        }
        assert_eq!(store.cleanup_before(30, true).unwrap(), 2);
        assert_eq!(store.list_since(0).count(), 3);

        assert_eq!(store.cleanup_before(30, false).unwrap(), 2);
        let rvs: Vec<i64> = store
            .list_since(0)
            .map(|e| e.unwrap().resource_version)
            .collect();
        assert_eq!(rvs, vec![30]);
    }
}
