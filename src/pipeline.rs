//! Per-file ingestion: read → infer → synchronize → insert, as one state machine run.
//!
//! ```text
//! Detected → Debounced → Reading → SchemaResolved → Inserting → Committed
//!                 └──────────┴───────────┴──────────────┴──────→ Failed(kind)
//! ```
//!
//! `Detected → Debounced` happens in the watcher; [`IngestionPipeline::ingest`] drives the rest.
//! Files with the same table name are serialized through [`TableLocks`]; everything before the
//! lock (reading, inference) runs in parallel.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, SystemTime};

use rusqlite::TransactionBehavior;
use serde::Serialize;
use tracing::{debug, warn};

use crate::error::{ErrorKind, IngestionError, IngestionResult};
use crate::inference::infer_schema;
use crate::ingestion::{
    FormatRegistry, IngestionObserver, IngestionReport, IngestionSeverity, TracingObserver, is_transient,
    read_dataset,
};
use crate::store::{SqliteStore, insert_rows, synchronize_table, table_name};
use crate::types::DataSet;

/// One file-creation occurrence, produced by the watcher.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestEvent {
    /// Path of the created file.
    pub path: PathBuf,
    /// When the creation was first noticed.
    pub detected_at: SystemTime,
}

impl IngestEvent {
    /// An event detected now.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            detected_at: SystemTime::now(),
        }
    }
}

/// States of one file's ingestion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum IngestState {
    Detected,
    Debounced,
    Reading,
    SchemaResolved,
    Inserting,
    Committed,
    Failed(ErrorKind),
}

impl IngestState {
    /// `Committed` and `Failed` are terminal.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Failed(_))
    }
}

impl fmt::Display for IngestState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed(kind) => write!(f, "Failed({kind})"),
            other => write!(f, "{other:?}"),
        }
    }
}

/// Tracks and logs the state of a single run.
struct Run<'a> {
    path: &'a Path,
    state: IngestState,
}

impl<'a> Run<'a> {
    fn detected(path: &'a Path) -> Self {
        Self {
            path,
            state: IngestState::Detected,
        }
    }

    fn advance(&mut self, next: IngestState) {
        debug_assert!(!self.state.is_terminal(), "transition out of terminal state");
        debug!(file = %self.path.display(), from = %self.state, to = %next, "ingest transition");
        self.state = next;
    }
}

/// One exclusion lock per table name.
///
/// Held from before the store transaction begins until it commits or rolls back, so two files
/// feeding the same table can never both see "table absent" or validate against a stale schema.
#[derive(Debug, Default)]
pub struct TableLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl TableLocks {
    /// The lock for `table`, created on first use.
    pub fn lock_for(&self, table: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(table.to_string()).or_default())
    }
}

/// Options controlling pipeline behavior.
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Extension → reader mapping.
    pub formats: FormatRegistry,
    /// Pause before the single retry of an I/O-related read failure.
    pub read_retry_delay: Duration,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            formats: FormatRegistry::default(),
            read_retry_delay: Duration::from_millis(500),
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Orchestrates reader, inferencer, synchronizer and inserter for one file at a time.
///
/// Cheap to share behind an [`Arc`]; every method takes `&self`.
pub struct IngestionPipeline {
    store: Arc<SqliteStore>,
    locks: TableLocks,
    options: PipelineOptions,
    observer: Arc<dyn IngestionObserver>,
}

impl fmt::Debug for IngestionPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestionPipeline")
            .field("store", &self.store)
            .field("options", &self.options)
            .finish()
    }
}

impl IngestionPipeline {
    /// Create a pipeline writing into `store`, reporting through [`TracingObserver`].
    pub fn new(store: Arc<SqliteStore>, options: PipelineOptions) -> Self {
        Self {
            store,
            locks: TableLocks::default(),
            options,
            observer: Arc::new(TracingObserver),
        }
    }

    /// Replace the observer that receives terminal reports.
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Drive one debounced event to a terminal state.
    ///
    /// Never fails: the outcome is in the returned report, which has also been delivered to the
    /// observer. The source file is never moved or deleted.
    pub fn ingest(&self, event: &IngestEvent) -> IngestionReport {
        let path = event.path.as_path();
        let table = table_name(path);
        let mut run = Run::detected(path);
        let waited = event.detected_at.elapsed().unwrap_or_default();
        debug!(file = %path.display(), waited_ms = waited.as_millis() as u64, "file settled");
        run.advance(IngestState::Debounced);

        let report = match self.run(&mut run, &table) {
            Ok(rows) => {
                run.advance(IngestState::Committed);
                IngestionReport::committed(path, &table, rows)
            }
            Err(err) => {
                run.advance(IngestState::Failed(err.kind()));
                let report = IngestionReport::failed(path, &table, &err);
                let severity = IngestionSeverity::for_error(&err);
                self.observer.on_failure(&report, severity);
                if severity >= self.options.alert_at_or_above {
                    self.observer.on_alert(&report, severity);
                }
                return report;
            }
        };

        self.observer.on_success(&report);
        report
    }

    /// Same as [`Self::ingest`] for a path with no watcher involved.
    pub fn ingest_path(&self, path: impl Into<PathBuf>) -> IngestionReport {
        self.ingest(&IngestEvent::new(path))
    }

    fn run(&self, run: &mut Run<'_>, table: &str) -> IngestionResult<usize> {
        run.advance(IngestState::Reading);
        let dataset = self.read_with_retry(run.path)?;
        let schema = infer_schema(&dataset);

        let lock = self.locks.lock_for(table);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut conn = self
            .store
            .connection()
            .map_err(|e| IngestionError::transaction(table, e))?;
        let tx = conn
            .transaction_with_behavior(TransactionBehavior::Immediate)
            .map_err(|e| IngestionError::transaction(table, e))?;

        let target = synchronize_table(&tx, run.path, &schema)?;
        run.advance(IngestState::SchemaResolved);

        run.advance(IngestState::Inserting);
        let rows = insert_rows(&tx, &target, &dataset)?;
        tx.commit()
            .map_err(|e| IngestionError::transaction(table, e))?;
        Ok(rows)
    }

    fn read_with_retry(&self, path: &Path) -> IngestionResult<DataSet> {
        match read_dataset(path, &self.options.formats) {
            Err(err) if is_transient(&err) => {
                warn!(
                    file = %path.display(),
                    error = %err,
                    delay_ms = self.options.read_retry_delay.as_millis() as u64,
                    "read failed, retrying once"
                );
                thread::sleep(self.options.read_retry_delay);
                read_dataset(path, &self.options.formats)
            }
            other => other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_table_shares_one_lock() {
        let locks = TableLocks::default();
        let a = locks.lock_for("orders");
        let b = locks.lock_for("orders");
        let c = locks.lock_for("customers");
        assert!(Arc::ptr_eq(&a, &b));
        assert!(!Arc::ptr_eq(&a, &c));
    }

    #[test]
    fn terminal_states() {
        assert!(IngestState::Committed.is_terminal());
        assert!(IngestState::Failed(ErrorKind::ReadError).is_terminal());
        assert!(!IngestState::Inserting.is_terminal());
        assert!(!IngestState::Detected.is_terminal());
        assert_eq!(
            IngestState::Failed(ErrorKind::SchemaConflict).to_string(),
            "Failed(SchemaConflict)"
        );
    }

    #[test]
    fn missing_file_fails_after_one_retry() {
        let dir = tempfile::tempdir().unwrap();
        let store = Arc::new(SqliteStore::open(dir.path().join("db.sqlite")).unwrap());
        let pipeline = IngestionPipeline::new(
            store,
            PipelineOptions {
                read_retry_delay: Duration::from_millis(1),
                ..Default::default()
            },
        );
        let report = pipeline.ingest_path(dir.path().join("gone.csv"));
        assert_eq!(
            report.outcome,
            crate::ingestion::Outcome::Failed {
                kind: ErrorKind::ReadError
            }
        );
        assert_eq!(report.table, "gone");
    }
}
