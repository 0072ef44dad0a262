//! Directory watching and write-stability debouncing.
//!
//! [`DirectoryWatcher::run`] owns the monitoring thread: it turns `notify` creation/rename events
//! into pending paths, waits until each file's size and modification time stop changing for the
//! debounce window, then sends an [`IngestEvent`] into the bounded channel that feeds the workers.
//! The [`Debouncer`] itself is pure bookkeeping driven by an injected clock and probe.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError, SyncSender};
use std::time::{Duration, Instant, SystemTime};

use glob::Pattern;
use notify::event::{CreateKind, ModifyKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::error::WatchError;
use crate::pipeline::IngestEvent;

/// Watcher configuration.
#[derive(Debug, Clone)]
pub struct WatcherOptions {
    /// Directory to watch. Never recursive.
    pub dir: PathBuf,
    /// Quiet period a file must stay unchanged for.
    pub debounce: Duration,
    /// Cadence of stability and shutdown checks.
    pub poll_interval: Duration,
    /// File-name globs that are never dispatched.
    pub ignore: Vec<Pattern>,
}

/// Cooperative shutdown flag shared between the signal handler and the service threads.
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask every holder to stop.
    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// What "unchanged" means for a file: same size and same modification time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    pub len: u64,
    pub modified: Option<SystemTime>,
}

impl Fingerprint {
    /// Current fingerprint of a regular file, or `None` if it is gone or not a file.
    pub fn of(path: &Path) -> Option<Self> {
        let meta = fs::metadata(path).ok()?;
        if !meta.is_file() {
            return None;
        }
        Some(Self {
            len: meta.len(),
            modified: meta.modified().ok(),
        })
    }
}

#[derive(Debug)]
struct Pending {
    fingerprint: Option<Fingerprint>,
    unchanged_since: Instant,
    detected_at: SystemTime,
}

/// Collapses notifications per path and releases each path once it is write-stable.
#[derive(Debug)]
pub struct Debouncer {
    window: Duration,
    pending: HashMap<PathBuf, Pending>,
    dispatched: HashMap<PathBuf, Instant>,
}

impl Debouncer {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
            dispatched: HashMap::new(),
        }
    }

    /// Record a creation notification. Returns `false` when it collapses into an earlier one:
    /// the path is already pending, or was dispatched less than one window ago.
    pub fn observe(&mut self, path: PathBuf, now: Instant, detected_at: SystemTime) -> bool {
        if self.pending.contains_key(&path) {
            return false;
        }
        if let Some(at) = self.dispatched.get(&path) {
            if now.saturating_duration_since(*at) < self.window {
                return false;
            }
        }
        self.pending.insert(
            path,
            Pending {
                fingerprint: None,
                unchanged_since: now,
                detected_at,
            },
        );
        true
    }

    /// Probe every pending path and return the ones that have been stable for a full window,
    /// oldest detection first. Paths that vanished are dropped.
    pub fn poll(&mut self, now: Instant, probe: impl Fn(&Path) -> Option<Fingerprint>) -> Vec<IngestEvent> {
        let window = self.window;
        self.dispatched
            .retain(|_, at| now.saturating_duration_since(*at) < window);

        let mut ready = Vec::new();
        self.pending.retain(|path, pending| {
            let Some(current) = probe(path) else {
                debug!(file = %path.display(), "pending file vanished");
                return false;
            };
            if pending.fingerprint != Some(current) {
                pending.fingerprint = Some(current);
                pending.unchanged_since = now;
                return true;
            }
            if now.saturating_duration_since(pending.unchanged_since) >= window {
                ready.push(IngestEvent {
                    path: path.clone(),
                    detected_at: pending.detected_at,
                });
                return false;
            }
            true
        });

        ready.sort_by(|a, b| a.detected_at.cmp(&b.detected_at).then_with(|| a.path.cmp(&b.path)));
        for event in &ready {
            self.dispatched.insert(event.path.clone(), now);
        }
        ready
    }

    /// Paths still waiting to become stable.
    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Forget every pending path, returning how many were dropped.
    pub fn discard_pending(&mut self) -> usize {
        let n = self.pending.len();
        self.pending.clear();
        n
    }
}

/// Paths a notification introduces into the directory: creations and renames-in.
/// Folder creations are ignored.
pub fn created_paths(event: &notify::Event) -> Vec<PathBuf> {
    match event.kind {
        EventKind::Create(CreateKind::Folder) => Vec::new(),
        EventKind::Create(_) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::To | RenameMode::Any)) => event.paths.clone(),
        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => event.paths.last().cloned().into_iter().collect(),
        _ => Vec::new(),
    }
}

/// Watches one directory and feeds stable files into the ingestion channel.
#[derive(Debug)]
pub struct DirectoryWatcher {
    opts: WatcherOptions,
    shutdown: ShutdownHandle,
    backfill: bool,
}

impl DirectoryWatcher {
    pub fn new(opts: WatcherOptions, shutdown: ShutdownHandle) -> Self {
        Self {
            opts,
            shutdown,
            backfill: false,
        }
    }

    /// Also dispatch the files already present when watching starts.
    pub fn with_backfill(mut self, backfill: bool) -> Self {
        self.backfill = backfill;
        self
    }

    /// True when the file name matches an ignore glob.
    pub fn is_ignored(&self, path: &Path) -> bool {
        let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
            return false;
        };
        self.opts.ignore.iter().any(|p| p.matches(name))
    }

    /// Regular files directly inside the watched directory, excluding ignored names.
    pub fn existing_files(&self) -> Result<Vec<PathBuf>, WatchError> {
        let mut out = Vec::new();
        for entry in WalkDir::new(&self.opts.dir).min_depth(1).max_depth(1).sort_by_file_name() {
            let entry = entry.map_err(|e| match e.into_io_error() {
                Some(io) => WatchError::Io(io),
                None => WatchError::DirectoryUnavailable(self.opts.dir.clone()),
            })?;
            if entry.file_type().is_file() && !self.is_ignored(entry.path()) {
                out.push(entry.into_path());
            }
        }
        Ok(out)
    }

    /// Run until shutdown is triggered or watching becomes impossible.
    ///
    /// On shutdown, paths that have not yet become stable are discarded; everything already sent
    /// stays in the channel for the workers to drain. Returns an error only for failures of the
    /// monitoring itself.
    pub fn run(self, events: SyncSender<IngestEvent>) -> Result<(), WatchError> {
        let dir = self.opts.dir.as_path();
        if !dir.is_dir() {
            return Err(WatchError::DirectoryUnavailable(dir.to_path_buf()));
        }

        let (tx, rx) = mpsc::channel();
        let mut watcher = RecommendedWatcher::new(tx, notify::Config::default())?;
        watcher.watch(dir, RecursiveMode::NonRecursive)?;
        info!(dir = %dir.display(), debounce_ms = self.opts.debounce.as_millis() as u64, "watching");

        let mut debouncer = Debouncer::new(self.opts.debounce);
        if self.backfill {
            let existing = self.existing_files()?;
            info!(files = existing.len(), "queueing existing files");
            for path in existing {
                debouncer.observe(path, Instant::now(), SystemTime::now());
            }
        }

        loop {
            if self.shutdown.is_triggered() {
                let dropped = debouncer.discard_pending();
                info!(discarded = dropped, "watcher stopping");
                return Ok(());
            }

            match rx.recv_timeout(self.opts.poll_interval) {
                Ok(Ok(event)) => self.observe_event(&mut debouncer, &event),
                Ok(Err(e)) => warn!(error = %e, "filesystem notification error"),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => return Err(WatchError::ChannelClosed),
            }

            if !dir.is_dir() {
                return Err(WatchError::DirectoryUnavailable(dir.to_path_buf()));
            }

            for event in debouncer.poll(Instant::now(), Fingerprint::of) {
                debug!(file = %event.path.display(), from = "Detected", to = "Debounced", "ingest transition");
                events.send(event).map_err(|_| WatchError::ChannelClosed)?;
            }
        }
    }

    fn observe_event(&self, debouncer: &mut Debouncer, event: &notify::Event) {
        for path in created_paths(event) {
            if self.is_ignored(&path) || path.is_dir() {
                debug!(file = %path.display(), "ignored");
                continue;
            }
            if debouncer.observe(path.clone(), Instant::now(), SystemTime::now()) {
                debug!(file = %path.display(), "detected");
            } else {
                debug!(file = %path.display(), "duplicate notification collapsed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    const WINDOW: Duration = Duration::from_millis(100);

    fn fp(len: u64) -> Option<Fingerprint> {
        Some(Fingerprint {
            len,
            modified: None,
        })
    }

    #[test]
    fn releases_only_after_a_full_quiet_window() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        assert!(d.observe(PathBuf::from("a.csv"), t0, SystemTime::now()));

        let size = RefCell::new(10);
        let probe = |_: &Path| fp(*size.borrow());

        assert!(d.poll(t0, probe).is_empty());
        *size.borrow_mut() = 20; // still being written
        assert!(d.poll(t0 + Duration::from_millis(80), probe).is_empty());
        assert!(d.poll(t0 + Duration::from_millis(150), probe).is_empty());

        let ready = d.poll(t0 + Duration::from_millis(180), probe);
        assert_eq!(ready.len(), 1);
        assert_eq!(ready[0].path, PathBuf::from("a.csv"));
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn duplicate_notifications_collapse() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        assert!(d.observe(PathBuf::from("a.csv"), t0, SystemTime::now()));
        assert!(!d.observe(PathBuf::from("a.csv"), t0 + Duration::from_millis(5), SystemTime::now()));

        d.poll(t0, |_| fp(1));
        assert_eq!(d.poll(t0 + WINDOW, |_| fp(1)).len(), 1);

        // Echo of the same creation shortly after dispatch.
        assert!(!d.observe(PathBuf::from("a.csv"), t0 + WINDOW + Duration::from_millis(10), SystemTime::now()));
        // A genuinely later creation is accepted again.
        d.poll(t0 + WINDOW * 3, |_| fp(1));
        assert!(d.observe(PathBuf::from("a.csv"), t0 + WINDOW * 3, SystemTime::now()));
    }

    #[test]
    fn vanished_files_are_dropped() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.observe(PathBuf::from("tmp.csv"), t0, SystemTime::now());
        assert!(d.poll(t0 + WINDOW * 2, |_| None).is_empty());
        assert_eq!(d.pending_len(), 0);
    }

    #[test]
    fn discard_pending_on_shutdown() {
        let t0 = Instant::now();
        let mut d = Debouncer::new(WINDOW);
        d.observe(PathBuf::from("a.csv"), t0, SystemTime::now());
        d.observe(PathBuf::from("b.csv"), t0, SystemTime::now());
        assert_eq!(d.discard_pending(), 2);
    }

    #[test]
    fn only_creations_and_renames_in_count() {
        let create = notify::Event::new(EventKind::Create(CreateKind::File)).add_path(PathBuf::from("/d/a.csv"));
        let folder = notify::Event::new(EventKind::Create(CreateKind::Folder)).add_path(PathBuf::from("/d/sub"));
        let rename = notify::Event::new(EventKind::Modify(ModifyKind::Name(RenameMode::Both)))
            .add_path(PathBuf::from("/elsewhere/x.csv"))
            .add_path(PathBuf::from("/d/x.csv"));
        let write = notify::Event::new(EventKind::Modify(ModifyKind::Any)).add_path(PathBuf::from("/d/a.csv"));

        assert_eq!(created_paths(&create), vec![PathBuf::from("/d/a.csv")]);
        assert!(created_paths(&folder).is_empty());
        assert_eq!(created_paths(&rename), vec![PathBuf::from("/d/x.csv")]);
        assert!(created_paths(&write).is_empty());
    }

    #[test]
    fn ignore_globs_match_file_names() {
        let watcher = DirectoryWatcher::new(
            WatcherOptions {
                dir: PathBuf::from("uploads"),
                debounce: WINDOW,
                poll_interval: WINDOW,
                ignore: vec![Pattern::new(".*").unwrap(), Pattern::new("~$*").unwrap()],
            },
            ShutdownHandle::new(),
        );
        assert!(watcher.is_ignored(Path::new("uploads/.DS_Store")));
        assert!(watcher.is_ignored(Path::new("uploads/~$report.xlsx")));
        assert!(!watcher.is_ignored(Path::new("uploads/report.xlsx")));
    }

    #[test]
    fn existing_files_are_listed_non_recursively() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("b.csv"), "x\n1\n").unwrap();
        fs::write(dir.path().join("a.json"), "[]").unwrap();
        fs::write(dir.path().join(".hidden.csv"), "x\n1\n").unwrap();
        fs::create_dir(dir.path().join("nested")).unwrap();
        fs::write(dir.path().join("nested/c.csv"), "x\n1\n").unwrap();

        let watcher = DirectoryWatcher::new(
            WatcherOptions {
                dir: dir.path().to_path_buf(),
                debounce: WINDOW,
                poll_interval: WINDOW,
                ignore: vec![Pattern::new(".*").unwrap()],
            },
            ShutdownHandle::new(),
        );
        let files = watcher.existing_files().unwrap();
        assert_eq!(files, vec![dir.path().join("a.json"), dir.path().join("b.csv")]);
    }
}
