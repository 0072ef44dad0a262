//! Runtime configuration for the ingestion service.
//!
//! [`Config`] is a plain struct; the `dropzone` binary fills it from command-line flags and
//! environment variables, tests build it directly.

use std::path::PathBuf;
use std::time::Duration;

use glob::Pattern;

use crate::error::WatchError;
use crate::execution::ExecutorOptions;
use crate::ingestion::{FormatRegistry, IngestionFormat, IngestionSeverity};
use crate::pipeline::PipelineOptions;
use crate::store::DEFAULT_BUSY_TIMEOUT;
use crate::watcher::WatcherOptions;

/// File names matched by these globs are never ingested (hidden files, Office lock files).
pub const DEFAULT_IGNORE: &[&str] = &[".*", "~$*"];

#[derive(Debug, Clone)]
pub struct Config {
    /// Directory watched (non-recursively) for new files.
    pub watch_dir: PathBuf,
    /// SQLite database file.
    pub database: PathBuf,
    /// Extension → reader mapping.
    pub formats: FormatRegistry,
    /// How long size and mtime must stay unchanged before a file is read.
    pub debounce: Duration,
    /// Cadence of stability checks and shutdown polling.
    pub poll_interval: Duration,
    /// Worker threads; `None` uses available parallelism.
    pub workers: Option<usize>,
    /// Capacity of the watcher → worker channel.
    pub queue_capacity: usize,
    /// Pause before retrying an I/O-related read failure.
    pub read_retry_delay: Duration,
    /// How long a file waits for another file's load to release the database write lock.
    pub busy_timeout: Duration,
    /// File-name globs to ignore.
    pub ignore: Vec<String>,
    /// Enqueue files already present in `watch_dir` at startup.
    pub ingest_existing: bool,
    /// Append one JSON line per terminal state to this file.
    pub report_log: Option<PathBuf>,
    /// Failures at or above this severity also raise an alert.
    pub alert_at_or_above: IngestionSeverity,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            watch_dir: PathBuf::from("uploads"),
            database: PathBuf::from("database.db"),
            formats: FormatRegistry::default(),
            debounce: Duration::from_millis(1_000),
            poll_interval: Duration::from_millis(250),
            workers: None,
            queue_capacity: 64,
            read_retry_delay: Duration::from_millis(500),
            busy_timeout: DEFAULT_BUSY_TIMEOUT,
            ignore: DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect(),
            ingest_existing: false,
            report_log: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

impl Config {
    /// Compile the ignore globs.
    pub fn ignore_patterns(&self) -> Result<Vec<Pattern>, WatchError> {
        self.ignore
            .iter()
            .map(|p| {
                Pattern::new(p).map_err(|e| WatchError::InvalidPattern {
                    pattern: p.clone(),
                    message: e.to_string(),
                })
            })
            .collect()
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            formats: self.formats.clone(),
            read_retry_delay: self.read_retry_delay,
            alert_at_or_above: self.alert_at_or_above,
        }
    }

    pub fn executor_options(&self) -> ExecutorOptions {
        ExecutorOptions {
            workers: self.workers,
            max_in_flight: None,
        }
    }

    pub fn watcher_options(&self) -> Result<WatcherOptions, WatchError> {
        Ok(WatcherOptions {
            dir: self.watch_dir.clone(),
            debounce: self.debounce,
            poll_interval: self.poll_interval,
            ignore: self.ignore_patterns()?,
        })
    }
}

/// Parse an `EXT=KIND` mapping such as `txt=tsv`.
pub fn parse_extension_mapping(s: &str) -> Result<(String, IngestionFormat), String> {
    let (ext, kind) = s
        .split_once('=')
        .ok_or_else(|| format!("expected EXT=KIND, got '{s}'"))?;
    let ext = ext.trim().trim_start_matches('.');
    if ext.is_empty() {
        return Err(format!("empty extension in '{s}'"));
    }
    Ok((ext.to_ascii_lowercase(), kind.parse()?))
}
