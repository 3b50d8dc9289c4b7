//! In-memory key-value store.
//!
//! Ordered maps per section behind a single lock. Scans snapshot the
//! matching keys so the lock is not held while callers iterate.

use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::ops::Bound;

use crate::error::StorageError;
use crate::kv::{KeyIter, KvStore, ListOptions, SortOrder};
use crate::sections::ALL_SECTIONS;

type Section = BTreeMap<String, Vec<u8>>;

pub struct MemoryKv {
    sections: RwLock<HashMap<String, Section>>,
}

impl Default for MemoryKv {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryKv {
    pub fn new() -> Self {
        let sections = ALL_SECTIONS
            .iter()
            .map(|name| (name.to_string(), Section::new()))
            .collect();
        Self {
            sections: RwLock::new(sections),
        }
    }

    fn snapshot(&self, section: &str, opts: &ListOptions) -> Result<Vec<String>, StorageError> {
        let sections = self.sections.read();
        let map = sections
            .get(section)
            .ok_or_else(|| StorageError::SectionNotFound(section.to_string()))?;

        if !opts.start_key.is_empty() && !opts.end_key.is_empty() && opts.start_key >= opts.end_key
        {
            return Ok(Vec::new());
        }
        let lower = if opts.start_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Included(opts.start_key.clone())
        };
        let upper = if opts.end_key.is_empty() {
            Bound::Unbounded
        } else {
            Bound::Excluded(opts.end_key.clone())
        };

        let range = map.range((lower, upper)).map(|(k, _)| k.clone());
        let limit = if opts.limit == 0 { usize::MAX } else { opts.limit };
        let keys = match opts.sort {
            SortOrder::Asc => range.take(limit).collect(),
            SortOrder::Desc => range.rev().take(limit).collect(),
        };
        Ok(keys)
    }
}

impl KvStore for MemoryKv {
    fn get(&self, section: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let sections = self.sections.read();
        let map = sections
            .get(section)
            .ok_or_else(|| StorageError::SectionNotFound(section.to_string()))?;
        map.get(key)
            .cloned()
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", section, key)))
    }

    fn save(&self, section: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let mut sections = self.sections.write();
        let map = sections
            .get_mut(section)
            .ok_or_else(|| StorageError::SectionNotFound(section.to_string()))?;
        map.insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn delete(&self, section: &str, key: &str) -> Result<(), StorageError> {
        let mut sections = self.sections.write();
        let map = sections
            .get_mut(section)
            .ok_or_else(|| StorageError::SectionNotFound(section.to_string()))?;
        map.remove(key);
        Ok(())
    }

    fn keys<'a>(&'a self, section: &str, opts: ListOptions) -> KeyIter<'a> {
        match self.snapshot(section, &opts) {
            Ok(keys) => Box::new(keys.into_iter().map(Ok)),
            Err(e) => Box::new(std::iter::once(Err(e))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::SECTION_METADATA;

    fn collect(iter: KeyIter<'_>) -> Vec<String> {
        iter.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn test_point_operations() {
        let kv = MemoryKv::new();
        kv.save(SECTION_METADATA, "k", b"v").unwrap();
        assert_eq!(kv.get(SECTION_METADATA, "k").unwrap(), b"v");
        kv.delete(SECTION_METADATA, "k").unwrap();
        assert!(kv.get(SECTION_METADATA, "k").unwrap_err().is_not_found());
        assert!(matches!(
            kv.save("nope", "k", b"v"),
            Err(StorageError::SectionNotFound(_))
        ));
    }

    #[test]
    fn test_keys_matches_bounds_and_order() {
        let kv = MemoryKv::new();
        for key in ["a", "b", "c", "d"] {
            kv.save(SECTION_METADATA, key, b"").unwrap();
        }
        assert_eq!(
            collect(kv.keys(SECTION_METADATA, ListOptions::range("b", ""))),
            vec!["b", "c", "d"]
        );
        assert_eq!(
            collect(kv.keys(SECTION_METADATA, ListOptions::range("", "c").descending())),
            vec!["b", "a"]
        );
        assert_eq!(
            collect(kv.keys(SECTION_METADATA, ListOptions::default().descending().with_limit(1))),
            vec!["d"]
        );
        assert!(collect(kv.keys(SECTION_METADATA, ListOptions::range("c", "b"))).is_empty());
    }

    #[test]
    fn test_scan_is_a_snapshot() {
        let kv = MemoryKv::new();
        kv.save(SECTION_METADATA, "a", b"").unwrap();
        let mut iter = kv.keys(SECTION_METADATA, ListOptions::default());
        kv.save(SECTION_METADATA, "b", b"").unwrap();
        assert_eq!(iter.next().unwrap().unwrap(), "a");
        assert!(iter.next().is_none());
    }
}
