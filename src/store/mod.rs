//! Flat-file record storage
//!
//! Per-subject entry lists kept in memory and mirrored to a pretty-printed
//! JSON file after every mutation. Used for warnings and strikes.

mod entry;
mod error;
mod file;
mod records;

pub use entry::Entry;
pub use error::{StorageError, StorageResult};
pub use file::JsonFile;
pub use records::RecordStore;

/// Current on-disk schema version written by every store
pub const SCHEMA_VERSION: u32 = 1;
