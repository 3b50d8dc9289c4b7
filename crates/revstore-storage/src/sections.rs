//! Section definitions for the KV substrate.
//!
//! Each section is an independent key space:
//! - unified/data: raw payloads, one per revision
//! - unified/metadata: revision index entries (action, folder, document)
//! - unified/events: append-only change notifications ordered by RV
//!
//! The RocksDB adapter maps every section to its own column family.

use rocksdb::{ColumnFamilyDescriptor, Options};

/// Section name for resource payloads
pub const SECTION_DATA: &str = "unified/data";

/// Section name for revision index entries
pub const SECTION_METADATA: &str = "unified/metadata";

/// Section name for the change notification log
pub const SECTION_EVENTS: &str = "unified/events";

/// All section names
pub const ALL_SECTIONS: &[&str] = &[SECTION_DATA, SECTION_METADATA, SECTION_EVENTS];

/// Payloads are written once and read by exact key; compress them.
fn data_options() -> Options {
    let mut opts = Options::default();
    opts.set_compression_type(rocksdb::DBCompressionType::Zstd);
    opts
}

/// Event log is append-only and mostly tailed.
fn events_options() -> Options {
    let mut opts = Options::default();
    opts.set_compaction_style(rocksdb::DBCompactionStyle::Universal);
    opts
}

/// Build all column family descriptors
pub fn build_cf_descriptors() -> Vec<ColumnFamilyDescriptor> {
    vec![
        ColumnFamilyDescriptor::new(SECTION_DATA, data_options()),
        ColumnFamilyDescriptor::new(SECTION_METADATA, Options::default()),
        ColumnFamilyDescriptor::new(SECTION_EVENTS, events_options()),
    ]
}
