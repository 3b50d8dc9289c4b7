//! # revstore-types
//!
//! Shared domain types for the revstore resource storage engine.
//!
//! This crate defines the data structures used by every layer:
//! - Resources: identity tuple, write actions, list scopes
//! - Events: write requests, change notifications, watch output
//! - Documents: the search projection stored next to each revision
//! - Requests: read/list/history request and response shapes
//! - Settings: layered configuration
//!
//! ## Usage
//!
//! ```rust
//! use revstore_types::{Action, ResourceKey};
//!
//! let key = ResourceKey::new("default", "apps", "deployments", "web");
//! assert!(key.validate().is_ok());
//! assert_eq!(Action::Created.to_string(), "created");
//! ```

pub mod config;
pub mod document;
pub mod error;
pub mod event;
pub mod request;
pub mod resource;

pub use config::{ConfigError, GcSettings, NotifierSettings, Settings};
pub use document::IndexableDocument;
pub use error::ResourceError;
pub use event::{Event, WriteEvent, WrittenEvent};
pub use request::{
    HistoryRequest, ListRequest, ListResponse, ListSource, ReadRequest, ReadResponse,
    ResourceStats, VersionMatch,
};
pub use resource::{validate_key_part, Action, ListRequestKey, ResourceKey};
