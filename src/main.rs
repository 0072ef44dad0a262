use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use dropzone_ingest::config::{Config, DEFAULT_IGNORE, parse_extension_mapping};
use dropzone_ingest::ingestion::{FormatRegistry, IngestionFormat};
use dropzone_ingest::service::IngestService;
use dropzone_ingest::watcher::ShutdownHandle;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "dropzone",
    version,
    about = "Watch a folder and load every CSV/JSON/Parquet/Excel file dropped into it into SQLite"
)]
struct Cli {
    /// Directory to watch (non-recursive); created if missing
    #[arg(long, env = "DROPZONE_WATCH_DIR", default_value = "uploads")]
    watch_dir: PathBuf,

    /// SQLite database file
    #[arg(long, env = "DROPZONE_DATABASE", default_value = "database.db")]
    database: PathBuf,

    /// Extra extension mapping, e.g. `txt=tsv` (repeatable)
    #[arg(long = "extension", value_name = "EXT=KIND", value_parser = parse_extension_mapping)]
    extensions: Vec<(String, IngestionFormat)>,

    /// How long a file must stay unchanged before it is read
    #[arg(long, env = "DROPZONE_DEBOUNCE_MS", default_value_t = 1_000)]
    debounce_ms: u64,

    /// Stability check cadence
    #[arg(long, env = "DROPZONE_POLL_INTERVAL_MS", default_value_t = 250)]
    poll_interval_ms: u64,

    /// Worker threads (default: available parallelism)
    #[arg(long, env = "DROPZONE_WORKERS", value_parser = clap::value_parser!(u64).range(1..))]
    workers: Option<u64>,

    /// Events queued between the watcher and the workers
    #[arg(long, env = "DROPZONE_QUEUE_CAPACITY", default_value_t = 64)]
    queue_capacity: usize,

    /// Pause before retrying a read that failed with an I/O error
    #[arg(long, env = "DROPZONE_READ_RETRY_DELAY_MS", default_value_t = 500)]
    read_retry_delay_ms: u64,

    /// Wait for another file's load to release the database write lock
    #[arg(long, env = "DROPZONE_BUSY_TIMEOUT_MS", default_value_t = 30_000)]
    busy_timeout_ms: u64,

    /// File-name glob to ignore (repeatable; replaces the defaults `.*` and `~$*`)
    #[arg(long = "ignore", value_name = "GLOB")]
    ignore: Vec<String>,

    /// Also ingest files already in the directory at startup
    #[arg(long, env = "DROPZONE_INGEST_EXISTING")]
    ingest_existing: bool,

    /// Append one JSON line per ingested or rejected file to this path
    #[arg(long, env = "DROPZONE_REPORT_LOG")]
    report_log: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace); RUST_LOG takes precedence
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Cli {
    fn into_config(self) -> Config {
        let mut formats = FormatRegistry::default();
        for (ext, kind) in &self.extensions {
            formats.register(ext, *kind);
        }
        let ignore = if self.ignore.is_empty() {
            DEFAULT_IGNORE.iter().map(|s| s.to_string()).collect()
        } else {
            self.ignore
        };

        Config {
            watch_dir: self.watch_dir,
            database: self.database,
            formats,
            debounce: Duration::from_millis(self.debounce_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms.max(1)),
            workers: self.workers.map(|n| n as usize),
            queue_capacity: self.queue_capacity,
            read_retry_delay: Duration::from_millis(self.read_retry_delay_ms),
            busy_timeout: Duration::from_millis(self.busy_timeout_ms),
            ignore,
            ingest_existing: self.ingest_existing,
            report_log: self.report_log,
            ..Config::default()
        }
    }
}

/// Initialize structured logging with tracing-subscriber.
///
/// Uses the `RUST_LOG` env var if set, otherwise falls back to the provided level.
fn init_logging(log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let config = cli.into_config();
    let shutdown = ShutdownHandle::new();
    let on_signal = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        info!("interrupt received, finishing in-flight ingestions");
        on_signal.trigger();
    }) {
        error!(error = %e, "failed to install signal handler");
        return ExitCode::FAILURE;
    }

    let service = match IngestService::new(config) {
        Ok(service) => service,
        Err(e) => {
            error!(error = %e, "failed to start");
            return ExitCode::FAILURE;
        }
    };

    match service.run(shutdown) {
        Ok(summary) => {
            info!(%summary, "bye");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "watcher stopped");
            ExitCode::FAILURE
        }
    }
}
