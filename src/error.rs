use std::fmt;
use std::path::PathBuf;

use serde::Serialize;
use thiserror::Error;

use crate::types::DataType;

/// Convenience result type for ingestion operations.
pub type IngestionResult<T> = Result<T, IngestionError>;

/// Classification of a failed ingestion, used for reporting and retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ErrorKind {
    UnsupportedFormat,
    ReadError,
    SchemaConflict,
    TransactionError,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::UnsupportedFormat => "UnsupportedFormat",
            Self::ReadError => "ReadError",
            Self::SchemaConflict => "SchemaConflict",
            Self::TransactionError => "TransactionError",
        };
        f.write_str(s)
    }
}

/// Error type returned by every stage of a single-file ingestion.
///
/// None of these are fatal to the watcher: each one ends the ingestion of exactly one file.
#[derive(Debug, Error)]
pub enum IngestionError {
    /// The file extension is not registered with any reader.
    #[error("unsupported format: {message} ({})", .path.display())]
    UnsupportedFormat { path: PathBuf, message: String },

    /// The file exists but could not be read or parsed into a dataset.
    #[error("read error: {0}")]
    Read(#[from] ReadError),

    /// An existing table's columns do not accept the incoming schema.
    #[error("schema conflict on table '{table}': {}", format_conflicts(.conflicts))]
    SchemaConflict {
        table: String,
        conflicts: Vec<ColumnConflict>,
    },

    /// The store rejected the create/insert/commit, or a value could not be coerced.
    #[error("transaction error on table '{table}': {message}")]
    Transaction { table: String, message: String },
}

impl IngestionError {
    /// The taxonomy bucket this error belongs to.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UnsupportedFormat { .. } => ErrorKind::UnsupportedFormat,
            Self::Read(_) => ErrorKind::ReadError,
            Self::SchemaConflict { .. } => ErrorKind::SchemaConflict,
            Self::Transaction { .. } => ErrorKind::TransactionError,
        }
    }

    pub(crate) fn transaction(table: &str, err: impl fmt::Display) -> Self {
        Self::Transaction {
            table: table.to_string(),
            message: err.to_string(),
        }
    }
}

/// Failures while turning a file into a [`crate::types::DataSet`].
#[derive(Debug, Error)]
pub enum ReadError {
    /// Underlying I/O error (e.g. file vanished, permission denied, locked).
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// Delimited-text parse error (ragged rows, bad quoting).
    #[error("csv error: {0}")]
    Csv(#[from] csv::Error),

    /// Invalid JSON syntax.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Parquet decoding error.
    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[cfg(feature = "excel")]
    /// Workbook decoding error (feature-gated behind `excel`).
    #[error("excel error: {0}")]
    Excel(#[from] calamine::Error),

    /// The content parsed but does not flatten to a single rectangular table.
    #[error("malformed input: {message}")]
    Malformed { message: String },
}

impl ReadError {
    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        Self::Malformed {
            message: message.into(),
        }
    }
}

/// One reason an incoming schema was rejected by an existing table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnConflict {
    /// Column exists in the table but not in the file.
    Missing { column: String },
    /// Column exists in the file but not in the table.
    Unexpected { column: String },
    /// Column exists on both sides but the table's type cannot hold the file's values.
    Incompatible {
        column: String,
        existing: DataType,
        incoming: DataType,
    },
}

impl fmt::Display for ColumnConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Missing { column } => write!(f, "missing column '{column}'"),
            Self::Unexpected { column } => write!(f, "unexpected column '{column}'"),
            Self::Incompatible {
                column,
                existing,
                incoming,
            } => write!(f, "column '{column}' is {existing} in table but {incoming} in file"),
        }
    }
}

fn format_conflicts(conflicts: &[ColumnConflict]) -> String {
    conflicts
        .iter()
        .map(|c| c.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Failures opening the persistent store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Underlying `SQLite` failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File-system I/O failure (e.g. creating the database directory).
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failures of the watcher itself. These are the only errors that end the process.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("notify error: {0}")]
    Notify(#[from] notify::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The watched directory was removed or became unreadable.
    #[error("watched directory is no longer available: {}", .0.display())]
    DirectoryUnavailable(PathBuf),

    #[error("invalid ignore pattern '{pattern}': {message}")]
    InvalidPattern { pattern: String, message: String },

    #[error("worker pool error: {0}")]
    Pool(#[from] rayon::ThreadPoolBuildError),

    /// The notification channel closed while the watcher was running.
    #[error("filesystem notification channel closed")]
    ChannelClosed,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn schema_conflict_lists_every_mismatch() {
        let err = IngestionError::SchemaConflict {
            table: "orders".to_string(),
            conflicts: vec![
                ColumnConflict::Missing {
                    column: "name".to_string(),
                },
                ColumnConflict::Unexpected {
                    column: "amount".to_string(),
                },
            ],
        };
        let msg = err.to_string();
        assert!(msg.contains("table 'orders'"), "got: {msg}");
        assert!(msg.contains("missing column 'name'"), "got: {msg}");
        assert!(msg.contains("unexpected column 'amount'"), "got: {msg}");
        assert_eq!(err.kind(), ErrorKind::SchemaConflict);
    }

    #[test]
    fn read_errors_classify_as_read_error() {
        let inner = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "locked");
        let err = IngestionError::from(ReadError::from(inner));
        assert_eq!(err.kind(), ErrorKind::ReadError);
        assert!(err.to_string().contains("io error"));
    }

    #[test]
    fn error_kind_displays_taxonomy_name() {
        assert_eq!(ErrorKind::TransactionError.to_string(), "TransactionError");
        assert_eq!(ErrorKind::UnsupportedFormat.to_string(), "UnsupportedFormat");
    }
}
