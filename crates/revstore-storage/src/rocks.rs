//! RocksDB adapter for the KV substrate.
//!
//! Each section is a column family. Point operations map directly onto
//! `get_cf`/`put_cf`/`delete_cf`; ordered scans use a seeked iterator that
//! stops at the range bound.

use rocksdb::{ColumnFamily, Direction, IteratorMode, Options, DB};
use std::path::Path;
use tracing::{debug, info};

use crate::error::StorageError;
use crate::kv::{KeyIter, KvStore, ListOptions, SortOrder};
use crate::sections::{build_cf_descriptors, ALL_SECTIONS};

/// RocksDB-backed key-value store.
pub struct RocksKv {
    db: DB,
}

impl RocksKv {
    /// Open the store at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        info!("Opening storage at {:?}", path);

        let mut db_opts = Options::default();
        db_opts.create_if_missing(true);
        db_opts.create_missing_column_families(true);
        db_opts.set_max_background_jobs(4);

        let db = DB::open_cf_descriptors(&db_opts, path, build_cf_descriptors())?;
        Ok(Self { db })
    }

    fn cf(&self, section: &str) -> Result<&ColumnFamily, StorageError> {
        self.db
            .cf_handle(section)
            .ok_or_else(|| StorageError::SectionNotFound(section.to_string()))
    }

    /// Flush all sections to disk.
    pub fn flush(&self) -> Result<(), StorageError> {
        for section in ALL_SECTIONS {
            self.db.flush_cf(self.cf(section)?)?;
        }
        Ok(())
    }

    /// Compact every section. Reclaims space after garbage collection.
    pub fn compact(&self) -> Result<(), StorageError> {
        info!("Starting full compaction...");
        for section in ALL_SECTIONS {
            let cf = self.cf(section)?;
            self.db.compact_range_cf::<&[u8], &[u8]>(cf, None, None);
        }
        info!("Compaction complete");
        Ok(())
    }
}

fn decode_key(bytes: &[u8]) -> Result<String, StorageError> {
    String::from_utf8(bytes.to_vec())
        .map_err(|e| StorageError::Key(format!("Invalid UTF-8: {}", e)))
}

impl KvStore for RocksKv {
    fn get(&self, section: &str, key: &str) -> Result<Vec<u8>, StorageError> {
        let cf = self.cf(section)?;
        self.db
            .get_cf(cf, key.as_bytes())?
            .ok_or_else(|| StorageError::NotFound(format!("{}/{}", section, key)))
    }

    fn save(&self, section: &str, key: &str, value: &[u8]) -> Result<(), StorageError> {
        let cf = self.cf(section)?;
        self.db.put_cf(cf, key.as_bytes(), value)?;
        debug!(section, key, "Saved");
        Ok(())
    }

    fn delete(&self, section: &str, key: &str) -> Result<(), StorageError> {
        let cf = self.cf(section)?;
        self.db.delete_cf(cf, key.as_bytes())?;
        Ok(())
    }

    fn keys<'a>(&'a self, section: &str, opts: ListOptions) -> KeyIter<'a> {
        let cf = match self.cf(section) {
            Ok(cf) => cf,
            Err(e) => return Box::new(std::iter::once(Err(e))),
        };

        let mode = match opts.sort {
            SortOrder::Asc if opts.start_key.is_empty() => IteratorMode::Start,
            SortOrder::Asc => IteratorMode::From(opts.start_key.as_bytes(), Direction::Forward),
            SortOrder::Desc if opts.end_key.is_empty() => IteratorMode::End,
            SortOrder::Desc => IteratorMode::From(opts.end_key.as_bytes(), Direction::Reverse),
        };
        let raw = self.db.iterator_cf(cf, mode);

        // Reverse seeks land on the end key itself when present; it is excluded.
        let skip_bound = opts.clone();
        let stop_bound = opts.clone();
        let iter = raw
            .map(|item| item.map_err(StorageError::from).and_then(|(k, _)| decode_key(&k)))
            .skip_while(move |item| match item {
                Ok(key) => {
                    skip_bound.sort == SortOrder::Desc
                        && !skip_bound.end_key.is_empty()
                        && key.as_str() >= skip_bound.end_key.as_str()
                }
                Err(_) => false,
            })
            .take_while(move |item| match item {
                Ok(key) => stop_bound.contains(key),
                Err(_) => true,
            });

        if opts.limit > 0 {
            Box::new(iter.take(opts.limit))
        } else {
            Box::new(iter)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sections::{SECTION_DATA, SECTION_EVENTS};
    use tempfile::TempDir;

    fn create_test_kv() -> (RocksKv, TempDir) {
        let temp_dir = TempDir::new().unwrap();
        let kv = RocksKv::open(temp_dir.path()).unwrap();
        (kv, temp_dir)
    }

    fn collect(iter: KeyIter<'_>) -> Vec<String> {
        iter.collect::<Result<Vec<_>, _>>().unwrap()
    }

    #[test]
    fn test_open_creates_sections() {
        let (kv, _temp) = create_test_kv();
        for section in ALL_SECTIONS {
            assert!(kv.cf(section).is_ok(), "section {} should exist", section);
        }
        assert!(matches!(
            kv.cf("unknown"),
            Err(StorageError::SectionNotFound(_))
        ));
    }

    #[test]
    fn test_get_save_delete() {
        let (kv, _temp) = create_test_kv();

        assert!(kv.get(SECTION_DATA, "a").unwrap_err().is_not_found());
        kv.save(SECTION_DATA, "a", b"one").unwrap();
        assert_eq!(kv.get(SECTION_DATA, "a").unwrap(), b"one");

        kv.delete(SECTION_DATA, "a").unwrap();
        kv.delete(SECTION_DATA, "a").unwrap();
        assert!(kv.get(SECTION_DATA, "a").unwrap_err().is_not_found());
    }

    #[test]
    fn test_sections_are_isolated() {
        let (kv, _temp) = create_test_kv();
        kv.save(SECTION_DATA, "k", b"data").unwrap();
        assert!(kv.get(SECTION_EVENTS, "k").unwrap_err().is_not_found());
    }

    #[test]
    fn test_keys_ranges() {
        let (kv, _temp) = create_test_kv();
        for key in ["a", "b", "c", "d", "e"] {
            kv.save(SECTION_DATA, key, b"").unwrap();
        }

        let asc = collect(kv.keys(SECTION_DATA, ListOptions::range("b", "e")));
        assert_eq!(asc, vec!["b", "c", "d"]);

        let desc = collect(kv.keys(SECTION_DATA, ListOptions::range("b", "e").descending()));
        assert_eq!(desc, vec!["d", "c", "b"]);

        let desc_open = collect(kv.keys(SECTION_DATA, ListOptions::default().descending()));
        assert_eq!(desc_open, vec!["e", "d", "c", "b", "a"]);

        let limited = collect(kv.keys(SECTION_DATA, ListOptions::default().with_limit(2)));
        assert_eq!(limited, vec!["a", "b"]);

        let between = collect(kv.keys(SECTION_DATA, ListOptions::range("bb", "dd").descending()));
        assert_eq!(between, vec!["d", "c"]);
    }

    #[test]
    fn test_keys_unknown_section_yields_error() {
        let (kv, _temp) = create_test_kv();
        let mut iter = kv.keys("unknown", ListOptions::default());
        assert!(matches!(
            iter.next(),
            Some(Err(StorageError::SectionNotFound(_)))
        ));
    }

    #[test]
    fn test_batch_get_skips_missing() {
        let (kv, _temp) = create_test_kv();
        kv.save(SECTION_DATA, "a", b"1").unwrap();
        kv.save(SECTION_DATA, "c", b"3").unwrap();

        let pairs: Vec<_> = kv
            .batch_get(SECTION_DATA, vec!["a".into(), "b".into(), "c".into()])
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            pairs,
            vec![("a".to_string(), b"1".to_vec()), ("c".to_string(), b"3".to_vec())]
        );
    }

    #[test]
    fn test_reopen_preserves_data() {
        let temp_dir = TempDir::new().unwrap();
        {
            let kv = RocksKv::open(temp_dir.path()).unwrap();
            kv.save(SECTION_DATA, "persist", b"yes").unwrap();
            kv.flush().unwrap();
        }
        let kv = RocksKv::open(temp_dir.path()).unwrap();
        assert_eq!(kv.get(SECTION_DATA, "persist").unwrap(), b"yes");
        kv.compact().unwrap();
    }
}
