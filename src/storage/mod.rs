//! Storage module for persisting job output
//!
//! This module handles:
//! - The write-once job sink and its SQLite implementation
//! - Schema management for persisted jobs and page results
//! - Screenshot image stores addressed by opaque handles

mod images;
mod schema;
mod sqlite;
mod traits;

pub use images::{open_image_store, FsImageStore, ImageHandle, ImageStore, MemoryImageStore};
pub use schema::{initialize_schema, SCHEMA_SQL};
pub use sqlite::SqliteJobSink;
pub use traits::{JobSink, StorageError, StorageResult};
