//! Resource identity and write actions.
//!
//! A resource identity is the tuple `(namespace, group, resource, name)`.
//! Every stored revision of a resource is addressed by its identity plus a
//! resource version (RV).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Separator between key path segments.
const PATH_SEPARATOR: char = '/';

/// Separator between the fields of a revision segment.
const FIELD_SEPARATOR: char = '~';

/// Kind of change recorded by a revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Identity established (first write, or re-creation after a delete)
    Created,
    /// New content for a live identity
    Updated,
    /// Tombstone: the identity is absent until a later `Created`
    Deleted,
}

impl Action {
    /// Lowercase name used inside storage keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Created => "created",
            Action::Updated => "updated",
            Action::Deleted => "deleted",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Action {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "created" => Ok(Action::Created),
            "updated" => Ok(Action::Updated),
            "deleted" => Ok(Action::Deleted),
            other => Err(format!("unknown action '{}'", other)),
        }
    }
}

/// Check one key field: non-empty and free of key separators.
pub fn validate_key_part(field: &str, value: &str) -> Result<(), String> {
    if value.is_empty() {
        return Err(format!("{} is required", field));
    }
    if value.contains(PATH_SEPARATOR) || value.contains(FIELD_SEPARATOR) {
        return Err(format!(
            "{} '{}' must not contain '{}' or '{}'",
            field, value, PATH_SEPARATOR, FIELD_SEPARATOR
        ));
    }
    Ok(())
}

/// Identity of one logical resource, independent of revision.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ResourceKey {
    pub namespace: String,
    pub group: String,
    pub resource: String,
    pub name: String,
}

impl ResourceKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        resource: impl Into<String>,
        name: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            resource: resource.into(),
            name: name.into(),
        }
    }

    /// All four identity fields must be present and well formed.
    pub fn validate(&self) -> Result<(), String> {
        validate_key_part("namespace", &self.namespace)?;
        validate_key_part("group", &self.group)?;
        validate_key_part("resource", &self.resource)?;
        validate_key_part("name", &self.name)?;
        Ok(())
    }

    /// Scope covering exactly this identity.
    pub fn as_list_key(&self) -> ListRequestKey {
        ListRequestKey {
            namespace: self.namespace.clone(),
            group: self.group.clone(),
            resource: self.resource.clone(),
            name: self.name.clone(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}/{}",
            self.namespace, self.group, self.resource, self.name
        )
    }
}

/// Scope of a list or scan: group and resource, optionally narrowed to a
/// namespace and then to a single name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListRequestKey {
    #[serde(default)]
    pub namespace: String,
    pub group: String,
    pub resource: String,
    #[serde(default)]
    pub name: String,
}

impl ListRequestKey {
    pub fn new(
        namespace: impl Into<String>,
        group: impl Into<String>,
        resource: impl Into<String>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            group: group.into(),
            resource: resource.into(),
            name: String::new(),
        }
    }

    /// Narrow the scope to one name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Scope over every group and resource of one namespace.
    ///
    /// Such a scope is not a contiguous key range; scans over it filter.
    pub fn namespace_only(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            ..Default::default()
        }
    }

    /// Group and resource are required; a name requires a namespace.
    pub fn validate(&self) -> Result<(), String> {
        validate_key_part("group", &self.group)?;
        validate_key_part("resource", &self.resource)?;
        if !self.namespace.is_empty() {
            validate_key_part("namespace", &self.namespace)?;
        }
        if !self.name.is_empty() {
            if self.namespace.is_empty() {
                return Err("name requires a namespace".to_string());
            }
            validate_key_part("name", &self.name)?;
        }
        Ok(())
    }

    /// True when every identity field is set.
    pub fn is_single_resource(&self) -> bool {
        !self.namespace.is_empty()
            && !self.group.is_empty()
            && !self.resource.is_empty()
            && !self.name.is_empty()
    }

    /// Convert a fully specified scope into an identity.
    pub fn to_resource_key(&self) -> Option<ResourceKey> {
        if !self.is_single_resource() {
            return None;
        }
        Some(ResourceKey::new(
            self.namespace.clone(),
            self.group.clone(),
            self.resource.clone(),
            self.name.clone(),
        ))
    }

    /// Whether an identity falls inside this scope.
    pub fn matches(&self, key: &ResourceKey) -> bool {
        (self.namespace.is_empty() || self.namespace == key.namespace)
            && (self.group.is_empty() || self.group == key.group)
            && (self.resource.is_empty() || self.resource == key.resource)
            && (self.name.is_empty() || self.name == key.name)
    }
}
