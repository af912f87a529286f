//! Amcache hive ingestion
//!
//! Decodes an acquired hive, stores each inventory category in its own SQLite
//! table with first-write-wins deduplication, and derives JSON/CSV exports.

pub mod config;
pub mod decoder;
pub mod error;
pub mod export;
pub mod logging;
pub mod pipeline;
pub mod store;
pub mod tree;

pub use config::{IngestConfig, OutputKind};
pub use decoder::NtHiveDecoder;
pub use error::{ConfigError, DecodeError, PipelineError, StoreError};
pub use export::{to_flat_table, to_tree, FlatTable, TreeDocument, TreeRecord};
pub use pipeline::{InputMode, Pipeline, RunOutcome};
pub use store::{AcquisitionRecord, IngestionStore, ProcessedEntry};
pub use tree::{HiveDecoder, KeyNode, NamedValue};
