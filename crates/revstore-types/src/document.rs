//! Search projection stored alongside each metadata entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::resource::ResourceKey;

/// Search-relevant fields extracted from a resource payload.
///
/// Produced by a document builder at write time and stored as the value of
/// the revision's metadata entry.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexableDocument {
    pub key: Option<ResourceKey>,
    #[serde(default)]
    pub resource_version: i64,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// Extra builder-specific fields
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl IndexableDocument {
    pub fn new(key: ResourceKey, resource_version: i64) -> Self {
        Self {
            key: Some(key),
            resource_version,
            ..Default::default()
        }
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}
