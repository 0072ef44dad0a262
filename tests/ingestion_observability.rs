use std::fs;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use dropzone_ingest::ErrorKind;
use dropzone_ingest::ingestion::{
    CompositeObserver, FileObserver, IngestionObserver, IngestionReport, IngestionSeverity, Outcome,
};
use dropzone_ingest::pipeline::{IngestionPipeline, PipelineOptions};
use dropzone_ingest::store::SqliteStore;

#[derive(Default)]
struct RecordingObserver {
    successes: Mutex<Vec<IngestionReport>>,
    failures: Mutex<Vec<(ErrorKind, IngestionSeverity)>>,
    alerts: Mutex<Vec<IngestionSeverity>>,
}

impl IngestionObserver for RecordingObserver {
    fn on_success(&self, report: &IngestionReport) {
        self.successes.lock().unwrap().push(report.clone());
    }

    fn on_failure(&self, report: &IngestionReport, severity: IngestionSeverity) {
        if let Outcome::Failed { kind } = report.outcome {
            self.failures.lock().unwrap().push((kind, severity));
        }
    }

    fn on_alert(&self, _report: &IngestionReport, severity: IngestionSeverity) {
        self.alerts.lock().unwrap().push(severity);
    }
}

fn pipeline_with(
    dir: &std::path::Path,
    observer: Arc<dyn IngestionObserver>,
    alert_at_or_above: IngestionSeverity,
) -> IngestionPipeline {
    let store = Arc::new(SqliteStore::open(dir.join("db.sqlite")).unwrap());
    IngestionPipeline::new(
        store,
        PipelineOptions {
            alert_at_or_above,
            read_retry_delay: Duration::from_millis(5),
            ..Default::default()
        },
    )
    .with_observer(observer)
}

#[test]
fn every_terminal_state_reaches_the_observer() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());
    let pipeline = pipeline_with(dir.path(), obs.clone(), IngestionSeverity::Critical);

    let good = dir.path().join("good.csv");
    fs::write(&good, "a,b\n1,x\n").unwrap();
    let bad = dir.path().join("bad.json");
    fs::write(&bad, "{not json").unwrap();
    let odd = dir.path().join("odd.xml");
    fs::write(&odd, "<a/>").unwrap();

    pipeline.ingest_path(&good);
    pipeline.ingest_path(&bad);
    pipeline.ingest_path(&odd);

    let successes = obs.successes.lock().unwrap();
    assert_eq!(successes.len(), 1);
    assert_eq!(successes[0].table, "good");
    assert_eq!(successes[0].outcome, Outcome::Committed { rows: 1 });

    assert_eq!(
        *obs.failures.lock().unwrap(),
        vec![
            (ErrorKind::ReadError, IngestionSeverity::Error),
            (ErrorKind::UnsupportedFormat, IngestionSeverity::Warning),
        ]
    );
    assert!(obs.alerts.lock().unwrap().is_empty());
}

#[test]
fn alerts_fire_at_or_above_threshold() {
    let dir = tempfile::tempdir().unwrap();
    let obs = Arc::new(RecordingObserver::default());
    let pipeline = pipeline_with(dir.path(), obs.clone(), IngestionSeverity::Error);

    let bad = dir.path().join("bad.json");
    fs::write(&bad, "[1, 2]").unwrap();
    let odd = dir.path().join("odd.xml");
    fs::write(&odd, "<a/>").unwrap();

    pipeline.ingest_path(&bad);
    pipeline.ingest_path(&odd);

    assert_eq!(*obs.alerts.lock().unwrap(), vec![IngestionSeverity::Error]);
}

#[test]
fn file_observer_writes_json_lines_through_composite() {
    let dir = tempfile::tempdir().unwrap();
    let log = dir.path().join("reports.jsonl");
    let recorder = Arc::new(RecordingObserver::default());
    let observers: Vec<Arc<dyn IngestionObserver>> = vec![recorder.clone(), Arc::new(FileObserver::new(&log))];
    let composite = Arc::new(CompositeObserver::new(observers));
    let pipeline = pipeline_with(dir.path(), composite, IngestionSeverity::Critical);

    let good = dir.path().join("Daily Totals.csv");
    fs::write(&good, "day,total\nmon,3\ntue,4\n").unwrap();
    pipeline.ingest_path(&good);
    pipeline.ingest_path(dir.path().join("orphan.csv"));

    let lines: Vec<serde_json::Value> = fs::read_to_string(&log)
        .unwrap()
        .lines()
        .map(|l| serde_json::from_str(l).unwrap())
        .collect();
    // The missing file is Critical: one failure line plus one alert line.
    assert_eq!(lines.len(), 3);
    assert_eq!(lines[0]["table"], "daily_totals");
    assert_eq!(lines[0]["outcome"]["status"], "committed");
    assert_eq!(lines[0]["outcome"]["rows"], 2);
    assert_eq!(lines[1]["outcome"]["status"], "failed");
    assert_eq!(lines[1]["outcome"]["kind"], "ReadError");
    assert_eq!(lines[1]["severity"], "Critical");
    assert_eq!(lines[1]["alert"], false);
    assert_eq!(lines[2]["alert"], true);
    assert_eq!(recorder.successes.lock().unwrap().len(), 1);
}
