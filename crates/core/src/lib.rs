//! Shared vocabulary for Amcache acquisition and ingestion
//!
//! Error categories, per-Category schema kinds, locale labels and the
//! registry value model used by both `amc-acquire` and `amc-ingest`.

pub mod error;
pub mod locale;
pub mod schema;
pub mod summary;
pub mod value;

pub use error::{ErrorCode, ErrorReport};
pub use locale::{locale_label, UNKNOWN_LOCALE};
pub use schema::{Column, ColumnSource, SchemaKind, FLAT_COLUMNS};
pub use summary::IngestionSummary;
pub use value::RegValue;
