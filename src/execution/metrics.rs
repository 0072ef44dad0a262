use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use crate::ingestion::{IngestionReport, Outcome};

/// Running counters for the ingestion service.
///
/// Workers update these as files reach terminal states; callers can snapshot them at any time.
pub struct IngestMetrics {
    started_at: Instant,

    files_started: AtomicU64,
    files_committed: AtomicU64,
    files_failed: AtomicU64,
    rows_inserted: AtomicU64,
    throttle_wait_ns: AtomicU64,

    active: AtomicUsize,
    max_active: AtomicUsize,
}

impl IngestMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Instant::now(),
            files_started: AtomicU64::new(0),
            files_committed: AtomicU64::new(0),
            files_failed: AtomicU64::new(0),
            rows_inserted: AtomicU64::new(0),
            throttle_wait_ns: AtomicU64::new(0),
            active: AtomicUsize::new(0),
            max_active: AtomicUsize::new(0),
        }
    }

    pub fn on_file_start(&self) {
        let _ = self.files_started.fetch_add(1, Ordering::SeqCst);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        update_max_usize(&self.max_active, now);
    }

    pub fn on_file_end(&self, report: &IngestionReport) {
        match report.outcome {
            Outcome::Committed { rows } => {
                let _ = self.files_committed.fetch_add(1, Ordering::SeqCst);
                let _ = self.rows_inserted.fetch_add(rows as u64, Ordering::SeqCst);
            }
            Outcome::Failed { .. } => {
                let _ = self.files_failed.fetch_add(1, Ordering::SeqCst);
            }
        }
        let _ = self.active.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn on_throttle_wait(&self, d: Duration) {
        let add = d.as_nanos().min(u64::MAX as u128) as u64;
        let _ = self.throttle_wait_ns.fetch_add(add, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> IngestMetricsSnapshot {
        IngestMetricsSnapshot {
            uptime: self.started_at.elapsed(),
            files_started: self.files_started.load(Ordering::SeqCst),
            files_committed: self.files_committed.load(Ordering::SeqCst),
            files_failed: self.files_failed.load(Ordering::SeqCst),
            rows_inserted: self.rows_inserted.load(Ordering::SeqCst),
            throttle_wait: Duration::from_nanos(self.throttle_wait_ns.load(Ordering::SeqCst)),
            max_active: self.max_active.load(Ordering::SeqCst),
        }
    }
}

impl Default for IngestMetrics {
    fn default() -> Self {
        Self::new()
    }
}

fn update_max_usize(dst: &AtomicUsize, now: usize) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst.compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`IngestMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestMetricsSnapshot {
    pub uptime: Duration,
    pub files_started: u64,
    pub files_committed: u64,
    pub files_failed: u64,
    pub rows_inserted: u64,
    pub throttle_wait: Duration,
    pub max_active: usize,
}

impl fmt::Display for IngestMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "files={}/{} committed, failed={}, rows_inserted={}, max_active={}, throttle_wait={:?}, uptime={:?}",
            self.files_committed,
            self.files_started,
            self.files_failed,
            self.rows_inserted,
            self.max_active,
            self.throttle_wait,
            self.uptime
        )
    }
}
