//! Revision index and revision resolution.
//!
//! Every stored revision has one metadata row whose value is the
//! `IndexableDocument` built at write time. Resolution answers "which
//! revision of an identity is visible at RV r" by scanning these rows.

use std::sync::Arc;

use revstore_types::{Action, IndexableDocument, ListRequestKey, ResourceKey};
use tracing::{debug, warn};

use crate::error::StorageError;
use crate::keys::{scope_prefix, MetaDataKey};
use crate::kv::{prefix_end, KvStore, ListOptions};
use crate::sections::SECTION_METADATA;

/// One metadata row: key plus stored document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDataObj {
    pub key: MetaDataKey,
    pub value: IndexableDocument,
}

#[derive(Clone)]
pub struct MetadataStore {
    kv: Arc<dyn KvStore>,
}

impl MetadataStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, obj: &MetaDataObj) -> Result<(), StorageError> {
        obj.key.validate()?;
        let encoded = obj.key.encode();
        self.kv
            .save(SECTION_METADATA, &encoded, &obj.value.to_bytes()?)?;
        debug!(key = %encoded, "Saved metadata");
        Ok(())
    }

    pub fn get(&self, key: &MetaDataKey) -> Result<IndexableDocument, StorageError> {
        let bytes = self.kv.get(SECTION_METADATA, &key.encode())?;
        Ok(IndexableDocument::from_bytes(&bytes)?)
    }

    /// Idempotent.
    pub fn delete(&self, key: &MetaDataKey) -> Result<(), StorageError> {
        self.kv.delete(SECTION_METADATA, &key.encode())
    }

    /// Parsed keys within raw bounds. Malformed keys are yielded as errors.
    pub fn scan<'a>(
        &'a self,
        opts: ListOptions,
    ) -> impl Iterator<Item = Result<MetaDataKey, StorageError>> + 'a {
        self.scan_encoded(opts).map(|item| item.map(|(_, key)| key))
    }

    /// Like `scan`, keeping each key as stored next to its parsed form.
    pub fn scan_encoded<'a>(
        &'a self,
        opts: ListOptions,
    ) -> impl Iterator<Item = Result<(String, MetaDataKey), StorageError>> + 'a {
        self.kv.keys(SECTION_METADATA, opts).map(|item| {
            item.and_then(|raw| {
                let key = MetaDataKey::parse(&raw)?;
                Ok((raw, key))
            })
        })
    }

    /// Keys under `scope`, ordered by identity and then ascending revision.
    pub fn keys<'a>(
        &'a self,
        scope: &ListRequestKey,
    ) -> impl Iterator<Item = Result<MetaDataKey, StorageError>> + 'a {
        let scope = scope.clone();
        self.scan(ListOptions::prefix(&scope_prefix(&scope)))
            .filter(move |item| match item {
                Ok(key) => scope.matches(&key.resource_key()),
                Err(_) => true,
            })
    }

    /// Most recent revision of `key` if it is not a tombstone.
    pub fn get_latest_resource_key(&self, key: &ResourceKey) -> Result<MetaDataKey, StorageError> {
        self.get_resource_key_at_revision(key, 0)
    }

    /// Most recent revision of `key` with RV at most `rv` (any RV when 0).
    ///
    /// Fails with `NotFound` when no such revision exists or when it is a
    /// tombstone.
    pub fn get_resource_key_at_revision(
        &self,
        key: &ResourceKey,
        rv: i64,
    ) -> Result<MetaDataKey, StorageError> {
        key.validate().map_err(StorageError::Validation)?;
        let opts = ListOptions::prefix(&scope_prefix(&key.as_list_key())).descending();
        for item in self.scan(opts) {
            let found = item?;
            if rv > 0 && found.resource_version > rv {
                continue;
            }
            if found.action == Action::Deleted {
                break;
            }
            return Ok(found);
        }
        Err(StorageError::NotFound(format!("{} at revision {}", key, rv)))
    }

    /// Snapshot of `scope` at revision `rv` (latest when 0).
    ///
    /// Yields, per identity, the most recent revision not newer than `rv`,
    /// skipping identities whose visible revision is a tombstone. Any
    /// malformed key aborts the scan with an error.
    pub fn list_resource_keys_at_revision<'a>(
        &'a self,
        scope: &ListRequestKey,
        rv: i64,
    ) -> impl Iterator<Item = Result<MetaDataKey, StorageError>> + 'a {
        LatestPerIdentity {
            inner: self.keys(scope),
            target_rv: rv,
            winner: None,
            done: false,
        }
    }

    /// Every `(group, resource)` pair present in the index, in key order.
    ///
    /// Seeks past each discovered pair instead of visiting all its rows.
    /// Only the leading path segments are read, so a pair is reported even
    /// when some of its keys are malformed. Keys without a group and
    /// resource segment are logged and skipped.
    pub fn group_resources(&self) -> Result<Vec<(String, String)>, StorageError> {
        let mut pairs = Vec::new();
        let mut start = String::new();
        loop {
            let opts = ListOptions::range(start.clone(), "").with_limit(1);
            let Some(item) = self.kv.keys(SECTION_METADATA, opts).next() else {
                break;
            };
            let raw = item?;
            match split_group_resource(&raw) {
                Some((group, resource)) => {
                    start = prefix_end(&format!("{}/{}/", group, resource));
                    pairs.push((group.to_string(), resource.to_string()));
                }
                None => {
                    warn!(key = %raw, "Skipping metadata key without group and resource");
                    // Smallest key sorting after `raw`.
                    start = format!("{}\0", raw);
                }
            }
        }
        Ok(pairs)
    }
}

fn split_group_resource(raw: &str) -> Option<(&str, &str)> {
    let mut parts = raw.splitn(3, '/');
    let group = parts.next().filter(|g| !g.is_empty())?;
    let resource = parts.next().filter(|r| !r.is_empty())?;
    parts.next()?;
    Some((group, resource))
}

fn same_identity(a: &MetaDataKey, b: &MetaDataKey) -> bool {
    a.name == b.name && a.namespace == b.namespace && a.resource == b.resource && a.group == b.group
}

/// Reduces an identity-ordered, RV-ascending key stream to one visible key
/// per identity.
struct LatestPerIdentity<I> {
    inner: I,
    target_rv: i64,
    winner: Option<MetaDataKey>,
    done: bool,
}

impl<I> LatestPerIdentity<I> {
    fn visible(candidate: Option<MetaDataKey>) -> Option<MetaDataKey> {
        candidate.filter(|k| k.action != Action::Deleted)
    }
}

impl<I> Iterator for LatestPerIdentity<I>
where
    I: Iterator<Item = Result<MetaDataKey, StorageError>>,
{
    type Item = Result<MetaDataKey, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.inner.next() {
                Some(Err(e)) => {
                    self.done = true;
                    return Some(Err(e));
                }
                Some(Ok(key)) => {
                    let flushed = match &self.winner {
                        Some(w) if !same_identity(w, &key) => self.winner.take(),
                        _ => None,
                    };
                    if self.target_rv <= 0 || key.resource_version <= self.target_rv {
                        self.winner = Some(key);
                    }
                    if let Some(visible) = Self::visible(flushed) {
                        return Some(Ok(visible));
                    }
                }
                None => {
                    self.done = true;
                    return Self::visible(self.winner.take()).map(Ok);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;

    fn store() -> MetadataStore {
        MetadataStore::new(Arc::new(MemoryKv::new()))
    }

    fn rk(name: &str) -> ResourceKey {
        ResourceKey::new("default", "apps", "deployments", name)
    }

    fn put(store: &MetadataStore, name: &str, rv: i64, action: Action) {
        let key = MetaDataKey::new(&rk(name), rv, action, "");
        store
            .save(&MetaDataObj {
                key,
                value: IndexableDocument::new(rk(name), rv),
            })
            .unwrap();
    }

    fn snapshot(store: &MetadataStore, rv: i64) -> Vec<(String, i64)> {
        store
            .list_resource_keys_at_revision(&ListRequestKey::new("default", "apps", "deployments"), rv)
            .map(|k| {
                let k = k.unwrap();
                (k.name, k.resource_version)
            })
            .collect()
    }

    #[test]
    fn test_save_and_get_document() {
        let store = store();
        put(&store, "web", 5, Action::Created);
        let key = MetaDataKey::new(&rk("web"), 5, Action::Created, "");
        let doc = store.get(&key).unwrap();
        assert_eq!(doc.resource_version, 5);
        assert_eq!(doc.key, Some(rk("web")));
    }

    #[test]
    fn test_snapshot_at_revision() {
        let store = store();
        let (rv1, rv2, rv3, rv4, rv5) = (100, 200, 300, 400, 500);
        put(&store, "a", rv1, Action::Created);
        put(&store, "a", rv3, Action::Updated);
        put(&store, "b", rv2, Action::Created);
        put(&store, "c", rv4, Action::Created);
        put(&store, "d", rv2, Action::Created);
        put(&store, "d", rv5, Action::Deleted);

        assert_eq!(
            snapshot(&store, rv2),
            vec![("a".into(), rv1), ("b".into(), rv2), ("d".into(), rv2)]
        );
        assert_eq!(
            snapshot(&store, rv3),
            vec![("a".into(), rv3), ("b".into(), rv2), ("d".into(), rv2)]
        );
        assert_eq!(
            snapshot(&store, rv5),
            vec![("a".into(), rv3), ("b".into(), rv2), ("c".into(), rv4)]
        );
        assert_eq!(snapshot(&store, 0), snapshot(&store, rv5));
        assert!(snapshot(&store, 50).is_empty());
    }

    #[test]
    fn test_latest_and_at_revision() {
        let store = store();
        put(&store, "web", 10, Action::Created);
        put(&store, "web", 20, Action::Updated);
        put(&store, "web", 30, Action::Deleted);

        assert!(store.get_latest_resource_key(&rk("web")).unwrap_err().is_not_found());
        assert_eq!(
            store
                .get_resource_key_at_revision(&rk("web"), 25)
                .unwrap()
                .resource_version,
            20
        );
        assert_eq!(
            store
                .get_resource_key_at_revision(&rk("web"), 10)
                .unwrap()
                .action,
            Action::Created
        );
        assert!(store
            .get_resource_key_at_revision(&rk("web"), 5)
            .unwrap_err()
            .is_not_found());

        put(&store, "web", 40, Action::Created);
        assert_eq!(
            store
                .get_latest_resource_key(&rk("web"))
                .unwrap()
                .resource_version,
            40
        );
    }

    #[test]
    fn test_latest_does_not_leak_across_names() {
        let store = store();
        put(&store, "web", 10, Action::Created);
        put(&store, "web-2", 20, Action::Created);
        assert_eq!(
            store
                .get_latest_resource_key(&rk("web"))
                .unwrap()
                .resource_version,
            10
        );
    }

    #[test]
    fn test_group_resources() {
        let store = store();
        put(&store, "web", 10, Action::Created);
        let other = ResourceKey::new("default", "apps", "deployments-v2", "x");
        store
            .save(&MetaDataObj {
                key: MetaDataKey::new(&other, 11, Action::Created, ""),
                value: IndexableDocument::default(),
            })
            .unwrap();
        let dash = ResourceKey::new("ns", "dashboard.grafana.app", "dashboards", "home");
        store
            .save(&MetaDataObj {
                key: MetaDataKey::new(&dash, 12, Action::Created, "f"),
                value: IndexableDocument::default(),
            })
            .unwrap();

        assert_eq!(
            store.group_resources().unwrap(),
            vec![
                ("apps".to_string(), "deployments-v2".to_string()),
                ("apps".to_string(), "deployments".to_string()),
                ("dashboard.grafana.app".to_string(), "dashboards".to_string()),
            ]
        );
    }

    #[test]
    fn test_group_resources_reads_past_malformed_keys() {
        let kv = Arc::new(MemoryKv::new());
        for raw in [
            "apps",
            "apps/deployments/default/web/oops",
            "core/configmaps/default/cfg/00000000000000000001~created~",
            "loose",
            "x//default",
        ] {
            kv.save(SECTION_METADATA, raw, b"{}").unwrap();
        }
        let store = MetadataStore::new(kv);
        assert_eq!(
            store.group_resources().unwrap(),
            vec![
                ("apps".to_string(), "deployments".to_string()),
                ("core".to_string(), "configmaps".to_string()),
            ]
        );
    }

    #[test]
    fn test_scan_encoded_keeps_stored_form() {
        let kv = Arc::new(MemoryKv::new());
        kv.save(SECTION_METADATA, "apps/deployments/default/web/7~created~", b"{}")
            .unwrap();
        let store = MetadataStore::new(kv);
        let items: Vec<_> = store
            .scan_encoded(ListOptions::prefix("apps/deployments/"))
            .map(|item| item.unwrap())
            .collect();
        assert_eq!(items.len(), 1);
        assert_eq!(items[0].0, "apps/deployments/default/web/7~created~");
        assert_eq!(items[0].1.resource_version, 7);
        assert_ne!(items[0].1.encode(), items[0].0);
    }

    #[test]
    fn test_snapshot_aborts_on_malformed_key() {
        let kv = Arc::new(MemoryKv::new());
        kv.save(SECTION_METADATA, "apps/deployments/default/web/1~created", b"{}")
            .unwrap();
        let store = MetadataStore::new(kv);
        let items: Vec<_> = store
            .list_resource_keys_at_revision(&ListRequestKey::new("", "apps", "deployments"), 0)
            .collect();
        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(StorageError::Key(_))));
    }
}
