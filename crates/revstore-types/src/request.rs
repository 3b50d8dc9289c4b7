//! Request and response shapes for the backend's read paths.

use serde::{Deserialize, Serialize};

use crate::resource::{ListRequestKey, ResourceKey};

/// Point read of one identity, latest or as of a revision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadRequest {
    pub key: ResourceKey,
    /// 0 reads the latest revision
    pub resource_version: i64,
}

impl ReadRequest {
    pub fn latest(key: ResourceKey) -> Self {
        Self {
            key,
            resource_version: 0,
        }
    }

    pub fn at(key: ResourceKey, resource_version: i64) -> Self {
        Self {
            key,
            resource_version,
        }
    }
}

/// One resolved revision with its payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadResponse {
    pub key: ResourceKey,
    pub value: Vec<u8>,
    pub resource_version: i64,
    #[serde(default)]
    pub folder: String,
}

/// Snapshot list over a scope.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListRequest {
    pub key: ListRequestKey,
    /// Page size; 0 means unbounded
    pub limit: i64,
    /// Opaque continue token from a previous page
    pub next_page_token: String,
    /// Snapshot revision for the first page; 0 pins the current clock
    pub resource_version: i64,
}

impl ListRequest {
    pub fn new(key: ListRequestKey) -> Self {
        Self {
            key,
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = token.into();
        self
    }
}

/// One page of a list or history call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListResponse {
    pub items: Vec<ReadResponse>,
    /// Snapshot revision the page was read at
    pub resource_version: i64,
    /// Present when more rows exist
    pub next_page_token: Option<String>,
}

/// How a requested revision filters history rows.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VersionMatch {
    /// Rows at or below the requested revision (all rows when 0)
    #[default]
    Unset,
    /// Only the row with exactly the requested revision
    Exact,
    /// Rows at or above the requested revision
    NotOlderThan,
}

/// Which view of an identity's history to return.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListSource {
    #[default]
    History,
    /// The most recent deletion, while the identity has not been recreated
    Trash,
}

/// Raw revision history of a single identity.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HistoryRequest {
    /// Must name exactly one identity
    pub key: ListRequestKey,
    pub resource_version: i64,
    pub version_match: VersionMatch,
    pub source: ListSource,
    pub limit: i64,
    pub next_page_token: String,
}

impl HistoryRequest {
    pub fn new(key: &ResourceKey) -> Self {
        Self {
            key: key.as_list_key(),
            ..Default::default()
        }
    }

    pub fn trash(key: &ResourceKey) -> Self {
        Self {
            key: key.as_list_key(),
            source: ListSource::Trash,
            ..Default::default()
        }
    }

    pub fn with_version(mut self, resource_version: i64, version_match: VersionMatch) -> Self {
        self.resource_version = resource_version;
        self.version_match = version_match;
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.next_page_token = token.into();
        self
    }
}

/// Live-object tally for one resource type within a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceStats {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    /// Names whose latest revision is not a deletion
    pub count: i64,
    /// Highest revision seen for the type
    pub resource_version: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_history_request_builders() {
        let key = ResourceKey::new("default", "apps", "deployments", "web");
        let req = HistoryRequest::new(&key)
            .with_version(10, VersionMatch::NotOlderThan)
            .with_limit(5);
        assert!(req.key.is_single_resource());
        assert_eq!(req.source, ListSource::History);
        assert_eq!(req.version_match, VersionMatch::NotOlderThan);

        let trash = HistoryRequest::trash(&key);
        assert_eq!(trash.source, ListSource::Trash);
    }

    #[test]
    fn test_version_match_default() {
        assert_eq!(VersionMatch::default(), VersionMatch::Unset);
    }
}
