//! Per-type live object counts.

use std::collections::BTreeMap;

use revstore_types::{Action, ListRequestKey, ResourceError, ResourceKey, ResourceStats};

use crate::backend::StorageBackend;

#[derive(Default)]
struct Tally {
    count: i64,
    resource_version: i64,
}

type Tallies = BTreeMap<(String, String, String), Tally>;

/// Fold one finished identity into its type's tally.
fn settle(tallies: &mut Tallies, identity: Option<(ResourceKey, Action)>) {
    if let Some((key, action)) = identity {
        let tally = tallies
            .entry((key.namespace, key.group, key.resource))
            .or_default();
        if action != Action::Deleted {
            tally.count += 1;
        }
    }
}

impl StorageBackend {
    /// Count live names per `(namespace, group, resource)`.
    ///
    /// Scans every payload key of the namespace (all namespaces when
    /// empty), so cost grows with total history. Meant for diagnostics.
    /// Rows whose count is at most `min_count` are omitted.
    pub fn get_resource_stats(
        &self,
        namespace: &str,
        min_count: i64,
    ) -> Result<Vec<ResourceStats>, ResourceError> {
        let scope = ListRequestKey::namespace_only(namespace);
        let mut tallies = Tallies::new();
        let mut current: Option<(ResourceKey, Action)> = None;

        for item in self.data.keys(&scope) {
            let row = item?;
            let key = row.resource_key();

            let tally = tallies
                .entry((key.namespace.clone(), key.group.clone(), key.resource.clone()))
                .or_default();
            tally.resource_version = tally.resource_version.max(row.resource_version);

            match current.as_mut() {
                Some((seen, action)) if *seen == key => *action = row.action,
                _ => settle(&mut tallies, current.replace((key, row.action))),
            }
        }
        settle(&mut tallies, current.take());

        Ok(tallies
            .into_iter()
            .filter(|(_, tally)| tally.count > min_count)
            .map(|((namespace, group, resource), tally)| ResourceStats {
                namespace,
                group,
                resource,
                count: tally.count,
                resource_version: tally.resource_version,
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use crate::backend::tests::{backend, create, delete, payload};
    use revstore_types::{Action, ResourceKey, WriteEvent};

    #[test]
    fn test_counts_live_names() {
        let backend = backend();
        let rv_a = create(&backend, "a");
        create(&backend, "b");
        delete(&backend, "a", rv_a);
        let rv_c = create(&backend, "c");

        let stats = backend.get_resource_stats("default", 0).unwrap();
        assert_eq!(stats.len(), 1);
        assert_eq!(stats[0].group, "apps");
        assert_eq!(stats[0].resource, "deployments");
        assert_eq!(stats[0].count, 2);
        assert_eq!(stats[0].resource_version, rv_c);
    }

    #[test]
    fn test_min_count_and_namespace_filter() {
        let backend = backend();
        create(&backend, "a");
        let other = ResourceKey::new("other", "core", "configmaps", "cfg");
        backend
            .write_event(WriteEvent::new(other, Action::Created, payload("cfg", "x")))
            .unwrap();

        assert_eq!(backend.get_resource_stats("default", 0).unwrap().len(), 1);
        assert!(backend.get_resource_stats("default", 1).unwrap().is_empty());
        assert_eq!(backend.get_resource_stats("", 0).unwrap().len(), 2);
        assert!(backend.get_resource_stats("missing", 0).unwrap().is_empty());
    }
}
