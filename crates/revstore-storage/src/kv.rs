//! Ordered key-value substrate contract.
//!
//! The stores only need five primitives: point get/save/delete, an ordered
//! key scan with bounds, and a batched get. Keys are UTF-8 strings; sections
//! namespace independent key spaces.

use crate::error::StorageError;

/// Scan direction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Bounds for a key scan.
///
/// `start_key` is inclusive, `end_key` exclusive. An empty bound is open.
/// A `limit` of 0 is unbounded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub start_key: String,
    pub end_key: String,
    pub sort: SortOrder,
    pub limit: usize,
}

impl ListOptions {
    /// Every key starting with `prefix`, ascending.
    pub fn prefix(prefix: &str) -> Self {
        Self {
            start_key: prefix.to_string(),
            end_key: prefix_end(prefix),
            ..Default::default()
        }
    }

    /// Keys in `[start_key, end_key)`.
    pub fn range(start_key: impl Into<String>, end_key: impl Into<String>) -> Self {
        Self {
            start_key: start_key.into(),
            end_key: end_key.into(),
            ..Default::default()
        }
    }

    pub fn descending(mut self) -> Self {
        self.sort = SortOrder::Desc;
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Whether `key` falls within the bounds.
    pub fn contains(&self, key: &str) -> bool {
        (self.start_key.is_empty() || key >= self.start_key.as_str())
            && (self.end_key.is_empty() || key < self.end_key.as_str())
    }
}

/// Smallest key greater than every key starting with `prefix`.
///
/// An empty prefix has no upper bound and yields an empty string.
pub fn prefix_end(prefix: &str) -> String {
    let Some(last) = prefix.chars().last() else {
        return String::new();
    };
    let head = &prefix[..prefix.len() - last.len_utf8()];
    if last.is_ascii() && last != '\x7f' {
        format!("{}{}", head, (last as u8 + 1) as char)
    } else {
        format!("{}{}", prefix, char::MAX)
    }
}

/// Lazy key sequence: finite, not restartable, may be dropped early.
pub type KeyIter<'a> = Box<dyn Iterator<Item = Result<String, StorageError>> + 'a>;

/// Lazy key/value sequence.
pub type PairIter<'a> = Box<dyn Iterator<Item = Result<(String, Vec<u8>), StorageError>> + 'a>;

/// Ordered key-value store with section namespacing.
///
/// Implementations must be safe for concurrent readers and writers. No
/// multi-key atomicity is assumed by any caller.
pub trait KvStore: Send + Sync {
    /// Read one value. Absence is `StorageError::NotFound`.
    fn get(&self, section: &str, key: &str) -> Result<Vec<u8>, StorageError>;

    /// Write one value, replacing any previous value.
    fn save(&self, section: &str, key: &str, value: &[u8]) -> Result<(), StorageError>;

    /// Remove one key. Absence is not an error.
    fn delete(&self, section: &str, key: &str) -> Result<(), StorageError>;

    /// Scan keys within the given bounds.
    fn keys<'a>(&'a self, section: &str, opts: ListOptions) -> KeyIter<'a>;

    /// Read several keys; missing keys are skipped.
    fn batch_get<'a>(&'a self, section: &str, keys: Vec<String>) -> PairIter<'a> {
        let section = section.to_string();
        Box::new(keys.into_iter().filter_map(move |key| {
            match self.get(&section, &key) {
                Ok(value) => Some(Ok((key, value))),
                Err(e) if e.is_not_found() => None,
                Err(e) => Some(Err(e)),
            }
        }))
    }
}
