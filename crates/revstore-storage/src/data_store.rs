//! Raw payload storage, one row per revision.

use std::sync::Arc;

use revstore_types::ListRequestKey;
use tracing::debug;

use crate::error::StorageError;
use crate::keys::{scope_prefix, DataKey};
use crate::kv::{KvStore, ListOptions};
use crate::sections::SECTION_DATA;

/// Payload rows keyed by identity, revision and action.
#[derive(Clone)]
pub struct DataStore {
    kv: Arc<dyn KvStore>,
}

impl DataStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self { kv }
    }

    pub fn save(&self, key: &DataKey, value: &[u8]) -> Result<(), StorageError> {
        key.validate()?;
        let encoded = key.encode();
        self.kv.save(SECTION_DATA, &encoded, value)?;
        debug!(key = %encoded, bytes = value.len(), "Saved payload");
        Ok(())
    }

    /// Fails with `NotFound` if the revision has no payload.
    pub fn get(&self, key: &DataKey) -> Result<Vec<u8>, StorageError> {
        self.kv.get(SECTION_DATA, &key.encode())
    }

    /// Idempotent.
    pub fn delete(&self, key: &DataKey) -> Result<(), StorageError> {
        self.kv.delete(SECTION_DATA, &key.encode())
    }

    /// Keys under `scope`, ordered by identity and then ascending revision.
    ///
    /// A namespace-only scope scans every key and filters. Malformed keys
    /// are yielded as errors.
    pub fn keys<'a>(
        &'a self,
        scope: &ListRequestKey,
    ) -> impl Iterator<Item = Result<DataKey, StorageError>> + 'a {
        let opts = ListOptions::prefix(&scope_prefix(scope));
        let scope = scope.clone();
        self.kv
            .keys(SECTION_DATA, opts)
            .map(|item| item.and_then(|k| DataKey::parse(&k)))
            .filter(move |item| match item {
                Ok(key) => scope.matches(&key.resource_key()),
                Err(_) => true,
            })
    }

    /// Keys under `scope` paired with their payloads.
    pub fn list<'a>(
        &'a self,
        scope: &ListRequestKey,
    ) -> impl Iterator<Item = Result<(DataKey, Vec<u8>), StorageError>> + 'a {
        self.keys(scope).map(move |item| {
            let key = item?;
            let value = self.get(&key)?;
            Ok((key, value))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryKv;
    use revstore_types::{Action, ResourceKey};

    fn store() -> DataStore {
        DataStore::new(Arc::new(MemoryKv::new()))
    }

    fn rk(ns: &str, name: &str) -> ResourceKey {
        ResourceKey::new(ns, "apps", "deployments", name)
    }

    #[test]
    fn test_save_get_delete() {
        let store = store();
        let key = DataKey::new(&rk("default", "web"), 10, Action::Created);

        store.save(&key, b"{}").unwrap();
        assert_eq!(store.get(&key).unwrap(), b"{}");

        store.delete(&key).unwrap();
        store.delete(&key).unwrap();
        assert!(store.get(&key).unwrap_err().is_not_found());
    }

    #[test]
    fn test_save_rejects_invalid_key() {
        let store = store();
        let key = DataKey::new(&rk("", "web"), 10, Action::Created);
        assert!(matches!(
            store.save(&key, b"{}"),
            Err(StorageError::Validation(_))
        ));
    }

    #[test]
    fn test_keys_ascending_by_revision() {
        let store = store();
        for (rv, action) in [(30, Action::Deleted), (10, Action::Created), (20, Action::Updated)] {
            store
                .save(&DataKey::new(&rk("default", "web"), rv, action), b"x")
                .unwrap();
        }
        let rvs: Vec<i64> = store
            .keys(&rk("default", "web").as_list_key())
            .map(|k| k.unwrap().resource_version)
            .collect();
        assert_eq!(rvs, vec![10, 20, 30]);
    }

    #[test]
    fn test_keys_namespace_only_scope() {
        let store = store();
        store
            .save(&DataKey::new(&rk("a", "web"), 1, Action::Created), b"1")
            .unwrap();
        store
            .save(&DataKey::new(&rk("b", "web"), 2, Action::Created), b"2")
            .unwrap();
        let other = ResourceKey::new("a", "core", "configmaps", "cfg");
        store
            .save(&DataKey::new(&other, 3, Action::Created), b"3")
            .unwrap();

        let names: Vec<String> = store
            .keys(&ListRequestKey::namespace_only("a"))
            .map(|k| k.unwrap().resource_key().to_string())
            .collect();
        assert_eq!(names, vec!["a/apps/deployments/web", "a/core/configmaps/cfg"]);
    }

    #[test]
    fn test_list_pairs_values() {
        let store = store();
        store
            .save(&DataKey::new(&rk("default", "web"), 1, Action::Created), b"v1")
            .unwrap();
        store
            .save(&DataKey::new(&rk("default", "web"), 2, Action::Updated), b"v2")
            .unwrap();

        let values: Vec<Vec<u8>> = store
            .list(&ListRequestKey::new("default", "apps", "deployments"))
            .map(|item| item.unwrap().1)
            .collect();
        assert_eq!(values, vec![b"v1".to_vec(), b"v2".to_vec()]);
    }

    #[test]
    fn test_keys_surface_malformed_rows() {
        let kv = Arc::new(MemoryKv::new());
        kv.save(SECTION_DATA, "apps/deployments/default/web/garbage", b"")
            .unwrap();
        let store = DataStore::new(kv);
        let first = store
            .keys(&ListRequestKey::new("", "apps", "deployments"))
            .next()
            .unwrap();
        assert!(matches!(first, Err(StorageError::Key(_))));
    }
}
