//! `dropzone-ingest` watches a directory and loads every tabular file dropped into it into a
//! SQLite table, inferring column types on the way.
//!
//! Each file goes through one [`pipeline::IngestionPipeline`] run:
//!
//! 1. **Read** ([`ingestion::read_dataset`]): the extension picks a reader (CSV, TSV, JSON,
//!    NDJSON, Parquet, Excel); the file becomes an untyped [`types::DataSet`].
//! 2. **Infer** ([`inference::infer_schema`]): each column becomes Integer, Real or Text.
//! 3. **Synchronize** ([`store::synchronize_table`]): the table named after the file
//!    ([`store::table_name`]) is created on first sighting, otherwise checked for compatibility.
//! 4. **Insert** ([`store::insert_rows`]): all rows in one transaction, or none.
//!
//! Failures are classified by [`ErrorKind`] and end only the file that caused them; the file is
//! left where it is. [`service::IngestService`] runs the watcher, the bounded event queue and
//! the worker pool.
//!
//! ## What you can ingest
//!
//! - **CSV / TSV**: `.csv`, `.tsv` (UTF-8, with a windows-1252 retry for legacy exports)
//! - **JSON**: `.json` (array of flat objects), `.ndjson` / `.jsonl` (one object per line)
//! - **Parquet**: `.parquet`, `.pq` (flat schemas)
//! - **Excel/workbooks** (Cargo feature `excel`, on by default): `.xlsx`, `.xls`, `.xlsm`,
//!   `.xlsb`, `.ods` (first sheet)
//!
//! ## Ingesting a single file
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use dropzone_ingest::pipeline::{IngestionPipeline, PipelineOptions};
//! use dropzone_ingest::store::SqliteStore;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let store = Arc::new(SqliteStore::open("database.db")?);
//! let pipeline = IngestionPipeline::new(store, PipelineOptions::default());
//!
//! let report = pipeline.ingest_path("uploads/Sales Report Q1.csv");
//! println!("{} -> {}: {}", report.file.display(), report.table, report.detail);
//! # Ok(())
//! # }
//! ```
//!
//! ## Running the watcher
//!
//! ```no_run
//! use dropzone_ingest::config::Config;
//! use dropzone_ingest::service::IngestService;
//! use dropzone_ingest::watcher::ShutdownHandle;
//!
//! # fn main() -> Result<(), dropzone_ingest::error::WatchError> {
//! let shutdown = ShutdownHandle::new();
//! let summary = IngestService::new(Config::default())?.run(shutdown)?;
//! println!("{summary}");
//! # Ok(())
//! # }
//! ```
//!
//! ## Modules
//!
//! - [`ingestion`]: format readers, the extension registry, and terminal-state reporting
//! - [`inference`]: column type inference
//! - [`store`]: SQLite store, table naming, table synchronization, row insertion
//! - [`pipeline`]: the per-file state machine and per-table locking
//! - [`execution`]: the worker pool
//! - [`watcher`]: directory watching and debouncing
//! - [`service`] / [`config`]: wiring and configuration
//! - [`types`] / [`error`]: shared data and error types

pub mod config;
pub mod error;
pub mod execution;
pub mod inference;
pub mod ingestion;
pub mod pipeline;
pub mod service;
pub mod store;
pub mod types;
pub mod watcher;

pub use error::{ErrorKind, IngestionError, IngestionResult};
