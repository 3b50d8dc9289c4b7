//! Storage layer error types.

use revstore_types::ResourceError;
use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StorageError {
    /// Point lookup found no entry
    #[error("Not found: {0}")]
    NotFound(String),

    /// RocksDB operation failed
    #[error("RocksDB error: {0}")]
    RocksDb(#[from] rocksdb::Error),

    /// Section (column family) not registered with the substrate
    #[error("Section not found: {0}")]
    SectionNotFound(String),

    /// Key encoding/decoding error
    #[error("Key error: {0}")]
    Key(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Malformed key fields supplied by the caller
    #[error("Validation error: {0}")]
    Validation(String),
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound(_))
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Serialization(err.to_string())
    }
}

impl From<StorageError> for ResourceError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(msg) => ResourceError::NotFound(msg),
            StorageError::Validation(msg) => ResourceError::Validation(msg),
            other => ResourceError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_error_mapping() {
        let err: ResourceError = StorageError::NotFound("k".into()).into();
        assert!(err.is_not_found());

        let err: ResourceError = StorageError::Validation("bad".into()).into();
        assert_eq!(err, ResourceError::Validation("bad".into()));

        let err: ResourceError = StorageError::Key("garbage".into()).into();
        assert!(matches!(err, ResourceError::Internal(msg) if msg.contains("garbage")));
    }
}
