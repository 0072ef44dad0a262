//! File readers and ingestion reporting.
//!
//! Most callers should use [`read_dataset`] (from [`unified`]) which:
//!
//! - picks a reader by file extension through a [`FormatRegistry`]
//! - loads the whole file into an untyped [`crate::types::DataSet`]
//!
//! Format-specific functions are also available under:
//! - [`csv`]
//! - [`json`]
//! - [`parquet`]
//! - `excel` (feature `excel`)
//!
//! [`observability`] holds the report payload and the observers that receive it.

pub mod csv;
#[cfg(feature = "excel")]
pub mod excel;
pub mod json;
pub mod observability;
pub mod parquet;
pub mod unified;

pub use observability::{
    CompositeObserver, FileObserver, IngestionObserver, IngestionReport, IngestionSeverity, Outcome,
    TracingObserver,
};
pub use unified::{FormatRegistry, IngestionFormat, is_transient, read_dataset};
