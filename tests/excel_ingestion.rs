#![cfg(feature = "excel_test_writer")]

use std::path::Path;
use std::sync::Arc;

use dropzone_ingest::ingestion::excel::read_excel_from_path;
use dropzone_ingest::ingestion::Outcome;
use dropzone_ingest::pipeline::{IngestionPipeline, PipelineOptions};
use dropzone_ingest::store::{SqliteStore, row_count, table_columns};
use dropzone_ingest::types::{DataType, Field, Value};

fn write_people_xlsx(path: &Path) {
    use rust_xlsxwriter::Workbook;

    let mut wb = Workbook::new();
    let ws = wb.add_worksheet();
    ws.set_name("People").unwrap();

    // A blank first row; the header is the first non-empty row.
    ws.write_string(1, 0, "id").unwrap();
    ws.write_string(1, 1, "name").unwrap();
    ws.write_string(1, 2, "score").unwrap();
    ws.write_string(1, 3, "active").unwrap();

    ws.write_number(2, 0, 1).unwrap();
    ws.write_string(2, 1, "Ada").unwrap();
    ws.write_number(2, 2, 98.5).unwrap();
    ws.write_boolean(2, 3, true).unwrap();

    // Fully empty row in the middle is skipped.
    ws.write_number(4, 0, 2).unwrap();
    ws.write_string(4, 1, "  Grace ").unwrap();
    ws.write_number(4, 2, 87).unwrap();
    ws.write_boolean(4, 3, false).unwrap();

    let other = wb.add_worksheet();
    other.set_name("Ignored").unwrap();
    other.write_string(0, 0, "unused").unwrap();

    wb.save(path).unwrap();
}

#[test]
fn excel_reads_first_sheet_only() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("people.xlsx");
    write_people_xlsx(&path);

    let ds = read_excel_from_path(&path).unwrap();
    assert_eq!(ds.columns, vec!["id", "name", "score", "active"]);
    assert_eq!(ds.row_count(), 2);
    assert_eq!(ds.rows[0][0], Value::Integer(1));
    assert_eq!(ds.rows[0][2], Value::Real(98.5));
    assert_eq!(ds.rows[1][1], Value::Text("Grace".to_string()));
    assert_eq!(ds.rows[1][2], Value::Integer(87));
}

#[test]
fn excel_workbook_lands_in_a_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("Team Roster.xlsx");
    write_people_xlsx(&path);

    let store = Arc::new(SqliteStore::open(dir.path().join("db.sqlite")).unwrap());
    let pipeline = IngestionPipeline::new(Arc::clone(&store), PipelineOptions::default());
    let report = pipeline.ingest_path(&path);

    assert_eq!(report.outcome, Outcome::Committed { rows: 2 });
    let conn = store.connection().unwrap();
    assert_eq!(row_count(&conn, "team_roster").unwrap(), 2);
    assert_eq!(
        table_columns(&conn, "team_roster").unwrap().unwrap(),
        vec![
            Field::new("id", DataType::Integer),
            Field::new("name", DataType::Text),
            Field::new("score", DataType::Real),
            Field::new("active", DataType::Text),
        ]
    );
}
