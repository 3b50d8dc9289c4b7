//! Write requests and change notifications.
//!
//! A `WriteEvent` enters the backend, becomes one stored revision, and is
//! announced to watchers as an `Event` record in the event log. Watchers
//! receive a `WrittenEvent`, which pairs the record with its payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::resource::{Action, ResourceKey};

/// A write request against one resource identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteEvent {
    /// Target identity
    pub key: ResourceKey,
    /// Kind of change
    pub action: Action,
    /// Raw payload bytes (a JSON object for the standard document builder)
    pub value: Vec<u8>,
    /// Folder the resource lives in (may be empty)
    pub folder: String,
    /// Revision the caller last observed; required for deletes
    pub previous_rv: i64,
}

impl WriteEvent {
    /// Create a write request with no folder and no previous revision.
    pub fn new(key: ResourceKey, action: Action, value: impl Into<Vec<u8>>) -> Self {
        Self {
            key,
            action,
            value: value.into(),
            folder: String::new(),
            previous_rv: 0,
        }
    }

    pub fn with_folder(mut self, folder: impl Into<String>) -> Self {
        self.folder = folder.into();
        self
    }

    pub fn with_previous_rv(mut self, previous_rv: i64) -> Self {
        self.previous_rv = previous_rv;
        self
    }
}

/// Append-only change notification stored in the event log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Event {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    pub name: String,
    pub resource_version: i64,
    pub action: Action,
    #[serde(default)]
    pub folder: String,
    #[serde(default)]
    pub previous_rv: i64,
}

impl Event {
    /// Identity this event refers to.
    pub fn key(&self) -> ResourceKey {
        ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        )
    }

    /// Serialize event to JSON bytes for storage
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Deserialize event from JSON bytes
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

/// A change delivered to watchers, carrying the payload of the revision.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WrittenEvent {
    pub key: ResourceKey,
    #[serde(rename = "type")]
    pub action: Action,
    #[serde(default)]
    pub folder: String,
    pub value: Vec<u8>,
    pub resource_version: i64,
    #[serde(default)]
    pub previous_rv: i64,
    /// Wall-clock time embedded in the resource version
    #[serde(with = "chrono::serde::ts_milliseconds")]
    pub timestamp: DateTime<Utc>,
}
