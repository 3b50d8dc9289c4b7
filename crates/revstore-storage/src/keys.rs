//! Key encoding and decoding for the three sections.
//!
//! Formats:
//! - data: `{group}/{resource}/{namespace}/{name}/{rv:019}~{action}`
//! - metadata: `{group}/{resource}/{namespace}/{name}/{rv:019}~{action}~{folder}`
//! - events: `{rv:019}~{namespace}~{group}~{resource}~{name}`
//!
//! The RV is zero-padded to 19 digits so lexicographic order matches
//! numeric order for every non-negative i64. Parsing accepts any width.

use revstore_types::{Action, ListRequestKey, ResourceKey};

use crate::error::StorageError;

const PATH_SEPARATOR: char = '/';
const FIELD_SEPARATOR: char = '~';

/// Render an RV in its fixed-width key form.
pub fn format_rv(rv: i64) -> String {
    format!("{:019}", rv)
}

fn parse_rv(s: &str, key: &str) -> Result<i64, StorageError> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(StorageError::Key(format!(
            "invalid resource version '{}' in key {}",
            s, key
        )));
    }
    s.parse()
        .map_err(|e| StorageError::Key(format!("invalid resource version in key {}: {}", key, e)))
}

fn parse_action(s: &str, key: &str) -> Result<Action, StorageError> {
    s.parse()
        .map_err(|e| StorageError::Key(format!("{} in key {}", e, key)))
}

fn require_parts(parts: &[&str], key: &str) -> Result<(), StorageError> {
    if parts.iter().any(|p| p.is_empty()) {
        return Err(StorageError::Key(format!("empty field in key {}", key)));
    }
    Ok(())
}

fn validate_write_key(key: &ResourceKey, rv: i64) -> Result<(), StorageError> {
    key.validate().map_err(StorageError::Validation)?;
    if rv <= 0 {
        return Err(StorageError::Validation(format!(
            "resource version must be positive, got {}",
            rv
        )));
    }
    Ok(())
}

/// Splits `g/r/ns/name/{tail}` into the identity and the revision segment.
fn split_path(s: &str) -> Result<(ResourceKey, &str), StorageError> {
    let parts: Vec<&str> = s.split(PATH_SEPARATOR).collect();
    if parts.len() != 5 {
        return Err(StorageError::Key(format!("invalid key format: {}", s)));
    }
    require_parts(&parts, s)?;
    let key = ResourceKey::new(parts[2], parts[0], parts[1], parts[3]);
    Ok((key, parts[4]))
}

/// Scan prefix for a list scope.
///
/// Fields are appended in key order (group, resource, namespace, name) and
/// stop at the first empty one. A scope without group yields the empty
/// prefix: the caller scans everything and filters.
pub fn scope_prefix(scope: &ListRequestKey) -> String {
    let mut prefix = String::new();
    for part in [&scope.group, &scope.resource, &scope.namespace, &scope.name] {
        if part.is_empty() {
            break;
        }
        prefix.push_str(part);
        prefix.push(PATH_SEPARATOR);
    }
    prefix
}

/// Key of one payload row in the data section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DataKey {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    pub name: String,
    pub resource_version: i64,
    pub action: Action,
}

impl DataKey {
    pub fn new(key: &ResourceKey, resource_version: i64, action: Action) -> Self {
        Self {
            namespace: key.namespace.clone(),
            group: key.group.clone(),
            resource: key.resource.clone(),
            name: key.name.clone(),
            resource_version,
            action,
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        )
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        validate_write_key(&self.resource_key(), self.resource_version)
    }

    pub fn encode(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}~{}",
            self.group,
            self.resource,
            self.namespace,
            self.name,
            format_rv(self.resource_version),
            self.action
        )
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let (key, tail) = split_path(s)?;
        let fields: Vec<&str> = tail.split(FIELD_SEPARATOR).collect();
        if fields.len() != 2 {
            return Err(StorageError::Key(format!("invalid data key format: {}", s)));
        }
        Ok(Self::new(
            &key,
            parse_rv(fields[0], s)?,
            parse_action(fields[1], s)?,
        ))
    }
}

/// Key of one revision index row in the metadata section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetaDataKey {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    pub name: String,
    pub resource_version: i64,
    pub action: Action,
    /// May be empty.
    pub folder: String,
}

impl MetaDataKey {
    pub fn new(
        key: &ResourceKey,
        resource_version: i64,
        action: Action,
        folder: impl Into<String>,
    ) -> Self {
        Self {
            namespace: key.namespace.clone(),
            group: key.group.clone(),
            resource: key.resource.clone(),
            name: key.name.clone(),
            resource_version,
            action,
            folder: folder.into(),
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        )
    }

    /// The payload row this entry indexes.
    pub fn data_key(&self) -> DataKey {
        DataKey::new(&self.resource_key(), self.resource_version, self.action)
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        validate_write_key(&self.resource_key(), self.resource_version)?;
        if self.folder.contains(PATH_SEPARATOR) || self.folder.contains(FIELD_SEPARATOR) {
            return Err(StorageError::Validation(format!(
                "folder '{}' must not contain '{}' or '{}'",
                self.folder, PATH_SEPARATOR, FIELD_SEPARATOR
            )));
        }
        Ok(())
    }

    pub fn encode(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}~{}~{}",
            self.group,
            self.resource,
            self.namespace,
            self.name,
            format_rv(self.resource_version),
            self.action,
            self.folder
        )
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let (key, tail) = split_path(s)?;
        let fields: Vec<&str> = tail.split(FIELD_SEPARATOR).collect();
        if fields.len() != 3 {
            return Err(StorageError::Key(format!(
                "invalid metadata key format: {}",
                s
            )));
        }
        Ok(Self::new(
            &key,
            parse_rv(fields[0], s)?,
            parse_action(fields[1], s)?,
            fields[2],
        ))
    }
}

/// Key of one change notification in the events section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventKey {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    pub name: String,
    pub resource_version: i64,
}

impl EventKey {
    pub fn new(key: &ResourceKey, resource_version: i64) -> Self {
        Self {
            namespace: key.namespace.clone(),
            group: key.group.clone(),
            resource: key.resource.clone(),
            name: key.name.clone(),
            resource_version,
        }
    }

    pub fn resource_key(&self) -> ResourceKey {
        ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        )
    }

    pub fn validate(&self) -> Result<(), StorageError> {
        validate_write_key(&self.resource_key(), self.resource_version)
    }

    pub fn encode(&self) -> String {
        format!(
            "{}~{}~{}~{}~{}",
            format_rv(self.resource_version),
            self.namespace,
            self.group,
            self.resource,
            self.name
        )
    }

    pub fn parse(s: &str) -> Result<Self, StorageError> {
        let parts: Vec<&str> = s.split(FIELD_SEPARATOR).collect();
        if parts.len() != 5 {
            return Err(StorageError::Key(format!("invalid event key format: {}", s)));
        }
        require_parts(&parts, s)?;
        let key = ResourceKey::new(parts[1], parts[2], parts[3], parts[4]);
        Ok(Self::new(&key, parse_rv(parts[0], s)?))
    }

    /// Lowest key whose RV is at least `rv`.
    pub fn start_at(rv: i64) -> String {
        format_rv(rv.max(0))
    }
}
