//! The long-running ingestion service: watcher thread → bounded channel → dispatcher → workers.

use std::fs;
use std::sync::Arc;
use std::sync::mpsc;
use std::thread;

use tracing::{error, info};

use crate::config::Config;
use crate::error::WatchError;
use crate::execution::{IngestExecutor, IngestMetricsSnapshot};
use crate::ingestion::{CompositeObserver, FileObserver, IngestionObserver, TracingObserver};
use crate::pipeline::IngestionPipeline;
use crate::store::SqliteStore;
use crate::watcher::{DirectoryWatcher, ShutdownHandle};

/// Wires the components together for one watched directory.
pub struct IngestService {
    config: Config,
    store: Arc<SqliteStore>,
    observer: Arc<dyn IngestionObserver>,
}

impl IngestService {
    /// Prepare the service: create the watch directory if missing and open the store.
    ///
    /// Reports go to `tracing`, plus a JSON-lines file when `config.report_log` is set.
    pub fn new(config: Config) -> Result<Self, WatchError> {
        fs::create_dir_all(&config.watch_dir)?;
        let store = Arc::new(SqliteStore::open_with_busy_timeout(&config.database, config.busy_timeout)?);
        info!(
            watch_dir = %config.watch_dir.display(),
            database = %store.path().display(),
            busy_timeout_ms = config.busy_timeout.as_millis() as u64,
            "ingestion service ready"
        );

        let mut observers: Vec<Arc<dyn IngestionObserver>> = vec![Arc::new(TracingObserver)];
        if let Some(path) = &config.report_log {
            observers.push(Arc::new(FileObserver::new(path)));
        }

        Ok(Self {
            config,
            store,
            observer: Arc::new(CompositeObserver::new(observers)),
        })
    }

    /// Replace the report observer.
    pub fn with_observer(mut self, observer: Arc<dyn IngestionObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Shared handle to the store.
    pub fn store(&self) -> Arc<SqliteStore> {
        Arc::clone(&self.store)
    }

    /// Watch until `shutdown` is triggered or watching fails.
    ///
    /// Shutdown stops the watcher, drains events already queued and waits for every in-flight
    /// ingestion to commit or roll back. A watcher failure does the same before being returned.
    pub fn run(self, shutdown: ShutdownHandle) -> Result<IngestMetricsSnapshot, WatchError> {
        let watcher_opts = self.config.watcher_options()?;
        let pipeline = Arc::new(
            IngestionPipeline::new(Arc::clone(&self.store), self.config.pipeline_options())
                .with_observer(Arc::clone(&self.observer)),
        );
        let executor = IngestExecutor::new(pipeline, self.config.executor_options())?;
        let metrics = executor.metrics();

        let (tx, rx) = mpsc::sync_channel(self.config.queue_capacity.max(1));
        let dispatcher = thread::Builder::new()
            .name("ingest-dispatch".to_string())
            .spawn(move || {
                for event in rx {
                    executor.submit(event);
                }
                executor.wait_idle();
            })?;

        let watcher = DirectoryWatcher::new(watcher_opts, shutdown.clone()).with_backfill(self.config.ingest_existing);
        let watched = watcher.run(tx);
        if let Err(e) = &watched {
            error!(error = %e, "watcher failed; finishing in-flight ingestions");
            shutdown.trigger();
        }

        if dispatcher.join().is_err() {
            error!("dispatcher thread panicked");
        }
        let summary = metrics.snapshot();
        info!(%summary, "ingestion service stopped");
        watched.map(|()| summary)
    }
}
