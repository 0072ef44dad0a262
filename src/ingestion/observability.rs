use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tracing::{error, info, warn};

use crate::error::{ErrorKind, IngestionError};

/// Severity classification used for observer callbacks and alerting thresholds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub enum IngestionSeverity {
    /// Warning-level event (file skipped, nothing wrong with the store).
    Warning,
    /// Error-level event (file rejected).
    Error,
    /// Critical error (I/O or store failures).
    Critical,
}

impl IngestionSeverity {
    /// Severity assigned to a failed ingestion.
    pub fn for_error(e: &IngestionError) -> Self {
        match e.kind() {
            ErrorKind::UnsupportedFormat => Self::Warning,
            ErrorKind::ReadError if super::unified::is_transient(e) => Self::Critical,
            ErrorKind::ReadError | ErrorKind::SchemaConflict => Self::Error,
            ErrorKind::TransactionError => Self::Critical,
        }
    }
}

/// Terminal result of one file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    /// All rows were committed.
    Committed { rows: usize },
    /// Nothing was written.
    Failed { kind: ErrorKind },
}

/// Payload reported for every terminal state: `{file, table, outcome, detail}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IngestionReport {
    /// Source file path.
    pub file: PathBuf,
    /// Target table name derived from the file name.
    pub table: String,
    /// Committed or failed.
    pub outcome: Outcome,
    /// Human-readable summary or error message.
    pub detail: String,
}

impl IngestionReport {
    pub fn committed(file: &Path, table: &str, rows: usize) -> Self {
        Self {
            file: file.to_path_buf(),
            table: table.to_string(),
            outcome: Outcome::Committed { rows },
            detail: format!("inserted {rows} rows into '{table}'"),
        }
    }

    pub fn failed(file: &Path, table: &str, error: &IngestionError) -> Self {
        Self {
            file: file.to_path_buf(),
            table: table.to_string(),
            outcome: Outcome::Failed { kind: error.kind() },
            detail: error.to_string(),
        }
    }

    /// True for [`Outcome::Committed`].
    pub fn is_committed(&self) -> bool {
        matches!(self.outcome, Outcome::Committed { .. })
    }
}

/// Observer interface for terminal ingestion states.
///
/// Implementors can record metrics, logs, or trigger alerts.
pub trait IngestionObserver: Send + Sync {
    /// Called when a file was committed.
    fn on_success(&self, _report: &IngestionReport) {}

    /// Called when a file reached `Failed`.
    fn on_failure(&self, _report: &IngestionReport, _severity: IngestionSeverity) {}

    /// Called when a failure meets the alert threshold.
    ///
    /// Default behavior forwards to [`Self::on_failure`].
    fn on_alert(&self, report: &IngestionReport, severity: IngestionSeverity) {
        self.on_failure(report, severity)
    }
}

/// An observer that fans out callbacks to a list of observers.
#[derive(Default)]
pub struct CompositeObserver {
    observers: Vec<Arc<dyn IngestionObserver>>,
}

impl CompositeObserver {
    /// Create a new composite observer from a list of observers.
    pub fn new(observers: Vec<Arc<dyn IngestionObserver>>) -> Self {
        Self { observers }
    }
}

impl fmt::Debug for CompositeObserver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeObserver")
            .field("observers_len", &self.observers.len())
            .finish()
    }
}

impl IngestionObserver for CompositeObserver {
    fn on_success(&self, report: &IngestionReport) {
        for o in &self.observers {
            o.on_success(report);
        }
    }

    fn on_failure(&self, report: &IngestionReport, severity: IngestionSeverity) {
        for o in &self.observers {
            o.on_failure(report, severity);
        }
    }

    fn on_alert(&self, report: &IngestionReport, severity: IngestionSeverity) {
        for o in &self.observers {
            o.on_alert(report, severity);
        }
    }
}

/// Logs terminal states through `tracing`.
#[derive(Debug, Default)]
pub struct TracingObserver;

impl IngestionObserver for TracingObserver {
    fn on_success(&self, report: &IngestionReport) {
        info!(
            file = %report.file.display(),
            table = %report.table,
            "{}",
            report.detail
        );
    }

    fn on_failure(&self, report: &IngestionReport, severity: IngestionSeverity) {
        let kind = match &report.outcome {
            Outcome::Failed { kind } => kind.to_string(),
            Outcome::Committed { .. } => "none".to_string(),
        };
        if severity >= IngestionSeverity::Error {
            error!(file = %report.file.display(), table = %report.table, %kind, "{}", report.detail);
        } else {
            warn!(file = %report.file.display(), table = %report.table, %kind, "{}", report.detail);
        }
    }

    fn on_alert(&self, report: &IngestionReport, severity: IngestionSeverity) {
        error!(
            file = %report.file.display(),
            table = %report.table,
            ?severity,
            alert = true,
            "{}",
            report.detail
        );
    }
}

/// Appends one JSON line per terminal state to a local file.
#[derive(Debug)]
pub struct FileObserver {
    path: PathBuf,
    lock: Mutex<()>,
}

#[derive(Serialize)]
struct ReportLine<'a> {
    ts: u64,
    severity: Option<IngestionSeverity>,
    alert: bool,
    #[serde(flatten)]
    report: &'a IngestionReport,
}

impl FileObserver {
    /// Create a file observer that appends events to `path`.
    ///
    /// Writes are best-effort; failures to open/write the log file are logged and dropped.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            lock: Mutex::new(()),
        }
    }

    fn append(&self, report: &IngestionReport, severity: Option<IngestionSeverity>, alert: bool) {
        let line = ReportLine {
            ts: unix_ts(),
            severity,
            alert,
            report,
        };
        let Ok(json) = serde_json::to_string(&line) else {
            return;
        };

        let _guard = self.lock.lock().ok();
        let written = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .and_then(|mut f| writeln!(f, "{json}"));
        if let Err(e) = written {
            warn!(path = %self.path.display(), error = %e, "failed to append ingestion report");
        }
    }
}

impl IngestionObserver for FileObserver {
    fn on_success(&self, report: &IngestionReport) {
        self.append(report, None, false);
    }

    fn on_failure(&self, report: &IngestionReport, severity: IngestionSeverity) {
        self.append(report, Some(severity), false);
    }

    fn on_alert(&self, report: &IngestionReport, severity: IngestionSeverity) {
        self.append(report, Some(severity), true);
    }
}

fn unix_ts() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ReadError;

    #[test]
    fn report_serializes_with_outcome_tag() {
        let report = IngestionReport::committed(Path::new("uploads/orders.csv"), "orders", 3);
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["table"], "orders");
        assert_eq!(json["outcome"]["status"], "committed");
        assert_eq!(json["outcome"]["rows"], 3);
    }

    #[test]
    fn severity_follows_error_kind() {
        let unsupported = IngestionError::UnsupportedFormat {
            path: PathBuf::from("a.txt"),
            message: "x".to_string(),
        };
        assert_eq!(IngestionSeverity::for_error(&unsupported), IngestionSeverity::Warning);

        let parse = IngestionError::from(ReadError::malformed("bad"));
        assert_eq!(IngestionSeverity::for_error(&parse), IngestionSeverity::Error);

        let tx = IngestionError::transaction("orders", "disk full");
        assert_eq!(IngestionSeverity::for_error(&tx), IngestionSeverity::Critical);
    }

    #[test]
    fn file_observer_appends_json_lines() {
        let dir = tempfile::tempdir().unwrap();
        let log = dir.path().join("reports.jsonl");
        let obs = FileObserver::new(&log);

        let err = IngestionError::from(ReadError::malformed("bad json"));
        obs.on_success(&IngestionReport::committed(Path::new("a.csv"), "a", 1));
        obs.on_failure(
            &IngestionReport::failed(Path::new("b.json"), "b", &err),
            IngestionSeverity::Error,
        );

        let text = std::fs::read_to_string(&log).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        let second: serde_json::Value = serde_json::from_str(lines[1]).unwrap();
        assert_eq!(second["outcome"]["kind"], "ReadError");
        assert_eq!(second["severity"], "Error");
    }
}
