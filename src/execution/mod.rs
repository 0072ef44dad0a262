//! Worker pool that runs [`IngestionPipeline`] for debounced events.
//!
//! This module sits between the watcher's event channel and the pipeline and provides:
//!
//! - Parallel execution across files (a dedicated rayon pool)
//! - A bound on in-flight files, so [`IngestExecutor::submit`] blocks and the channel fills up
//! - Running metrics for the service summary

mod metrics;
mod semaphore;

use std::sync::Arc;
use std::time::Duration;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{debug, error};

use crate::pipeline::{IngestEvent, IngestionPipeline};

pub use metrics::{IngestMetrics, IngestMetricsSnapshot};

use semaphore::{Permit, Semaphore};

/// Configuration for the [`IngestExecutor`].
#[derive(Debug, Clone, Default)]
pub struct ExecutorOptions {
    /// Number of worker threads.
    ///
    /// If `None`, uses the platform's available parallelism.
    pub workers: Option<usize>,
    /// Upper bound on files being ingested at once.
    ///
    /// If `None`, equals the worker count.
    pub max_in_flight: Option<usize>,
}

/// Runs ingestions on a bounded pool of worker threads.
pub struct IngestExecutor {
    pool: ThreadPool,
    permits: Arc<Semaphore>,
    pipeline: Arc<IngestionPipeline>,
    metrics: Arc<IngestMetrics>,
}

impl IngestExecutor {
    /// Create an executor for `pipeline`.
    ///
    /// # Panics
    ///
    /// Panics if `workers == Some(0)` or `max_in_flight == Some(0)`.
    pub fn new(pipeline: Arc<IngestionPipeline>, opts: ExecutorOptions) -> Result<Self, rayon::ThreadPoolBuildError> {
        if let Some(n) = opts.workers {
            assert!(n > 0, "workers must be > 0 when set");
        }
        let workers = opts
            .workers
            .unwrap_or_else(|| std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1))
            .max(1);
        let max_in_flight = opts.max_in_flight.unwrap_or(workers);

        let pool = ThreadPoolBuilder::new()
            .num_threads(workers)
            .thread_name(|i| format!("ingest-worker-{i}"))
            .panic_handler(|payload| {
                let message = payload
                    .downcast_ref::<&str>()
                    .map(|s| s.to_string())
                    .or_else(|| payload.downcast_ref::<String>().cloned())
                    .unwrap_or_else(|| "unknown panic".to_string());
                error!(panic = %message, "ingestion worker panicked");
            })
            .build()?;

        debug!(workers, max_in_flight, "executor ready");
        Ok(Self {
            pool,
            permits: Arc::new(Semaphore::new(max_in_flight)),
            pipeline,
            metrics: Arc::new(IngestMetrics::new()),
        })
    }

    /// Get a handle to running metrics.
    pub fn metrics(&self) -> Arc<IngestMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Queue `event` for ingestion, blocking while the in-flight bound is reached.
    pub fn submit(&self, event: IngestEvent) {
        let waited = self.permits.acquire();
        if waited > Duration::ZERO {
            self.metrics.on_throttle_wait(waited);
        }

        let permits = Arc::clone(&self.permits);
        let pipeline = Arc::clone(&self.pipeline);
        let metrics = Arc::clone(&self.metrics);
        self.pool.spawn(move || {
            let _permit = Permit(&permits);
            metrics.on_file_start();
            let report = pipeline.ingest(&event);
            metrics.on_file_end(&report);
        });
    }

    /// Block until every submitted ingestion has reached a terminal state.
    pub fn wait_idle(&self) {
        self.permits.wait_idle();
    }

    /// Files currently being ingested.
    pub fn in_flight(&self) -> usize {
        self.permits.in_use()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    use crate::pipeline::PipelineOptions;
    use crate::store::{SqliteStore, row_count};

    #[test]
    fn submitted_files_are_all_ingested_before_wait_idle_returns() {
        let dir = tempfile::tempdir().unwrap();
        for i in 0..6 {
            fs::write(dir.path().join(format!("batch_{i}.csv")), "id,qty\n1,2\n3,4\n").unwrap();
        }
        let store = Arc::new(SqliteStore::open(dir.path().join("db.sqlite")).unwrap());
        let pipeline = Arc::new(IngestionPipeline::new(Arc::clone(&store), PipelineOptions::default()));
        let executor = IngestExecutor::new(
            pipeline,
            ExecutorOptions {
                workers: Some(3),
                max_in_flight: Some(2),
            },
        )
        .unwrap();

        for i in 0..6 {
            executor.submit(IngestEvent::new(dir.path().join(format!("batch_{i}.csv"))));
        }
        executor.wait_idle();

        let snap = executor.metrics().snapshot();
        assert_eq!(snap.files_committed, 6);
        assert_eq!(snap.rows_inserted, 12);
        assert!(snap.max_active <= 2);
        assert_eq!(executor.in_flight(), 0);

        let conn = store.connection().unwrap();
        for i in 0..6 {
            assert_eq!(row_count(&conn, &format!("batch_{i}")).unwrap(), 2);
        }
    }

    #[test]
    fn same_table_files_serialize_and_sum() {
        let dir = tempfile::tempdir().unwrap();
        let sub_a = dir.path().join("a");
        let sub_b = dir.path().join("b");
        fs::create_dir_all(&sub_a).unwrap();
        fs::create_dir_all(&sub_b).unwrap();
        fs::write(sub_a.join("orders.csv"), "id,amount\n1,2.5\n2,3\n").unwrap();
        fs::write(sub_b.join("Orders.csv"), "id,amount\n3,4\n4,5.25\n5,1\n").unwrap();

        let store = Arc::new(SqliteStore::open(dir.path().join("db.sqlite")).unwrap());
        let pipeline = Arc::new(IngestionPipeline::new(Arc::clone(&store), PipelineOptions::default()));
        let executor = IngestExecutor::new(
            pipeline,
            ExecutorOptions {
                workers: Some(2),
                max_in_flight: Some(2),
            },
        )
        .unwrap();
        executor.submit(IngestEvent::new(sub_a.join("orders.csv")));
        executor.submit(IngestEvent::new(sub_b.join("Orders.csv")));
        executor.wait_idle();

        let conn = store.connection().unwrap();
        assert_eq!(row_count(&conn, "orders").unwrap(), 5);
        assert_eq!(executor.metrics().snapshot().files_failed, 0);
    }
}
