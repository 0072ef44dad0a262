#![cfg(feature = "excel")]

use std::path::Path;

use calamine::{Data, Reader, open_workbook_auto};

use crate::error::ReadError;
use crate::types::{DataSet, Value};

use super::csv::header_names;

/// Read the first sheet of a workbook (`.xlsx`, `.xls`, `.ods`, etc.) into an untyped `DataSet`.
///
/// Behavior:
/// - Detects the first non-empty row as the header row
/// - Skips rows after the header whose cells are all empty, blank or errors
/// - Keeps typed cells typed: whole-number floats become integers, other floats stay real,
///   strings/bools/dates become text, empty and error cells become null
pub fn read_excel_from_path(path: impl AsRef<Path>) -> Result<DataSet, ReadError> {
    let mut workbook = open_workbook_auto(path)?;

    let sheet = workbook
        .sheet_names()
        .first()
        .cloned()
        .ok_or_else(|| ReadError::malformed("workbook has no sheets"))?;
    let range = workbook.worksheet_range(&sheet)?;

    read_sheet_range(&range).map_err(|e| match e {
        ReadError::Malformed { message } => ReadError::malformed(format!("sheet '{sheet}': {message}")),
        other => other,
    })
}

fn read_sheet_range(range: &calamine::Range<Data>) -> Result<DataSet, ReadError> {
    let mut rows_iter = range
        .rows()
        .filter(|row| row.iter().any(|c| !matches!(c, Data::Empty)));

    let header = rows_iter
        .next()
        .ok_or_else(|| ReadError::malformed("sheet has no non-empty rows (no header row found)"))?;
    let header_cells: Vec<String> = header.iter().map(cell_to_header_string).collect();
    let columns = header_names(header_cells.iter().map(String::as_str))?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for row in rows_iter {
        let out_row: Vec<Value> = (0..columns.len())
            .map(|idx| convert_cell(row.get(idx).unwrap_or(&Data::Empty)))
            .collect();
        if out_row.iter().all(Value::is_null) {
            continue;
        }
        rows.push(out_row);
    }

    Ok(DataSet::new(columns, rows))
}

fn cell_to_header_string(c: &Data) -> String {
    match c {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) => float_cell(*f).to_string(),
        Data::Empty => "".to_string(),
        other => other.to_string(),
    }
}

fn convert_cell(c: &Data) -> Value {
    match c {
        Data::Empty | Data::Error(_) => Value::Null,
        Data::Int(i) => Value::Integer(*i),
        Data::Float(f) => float_cell(*f),
        Data::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Value::Null
            } else {
                Value::Text(trimmed.to_owned())
            }
        }
        other => Value::Text(other.to_string()),
    }
}

// Workbooks store every number as a float; whole numbers in i64 range read back as integers.
fn float_cell(f: f64) -> Value {
    const I64_BOUND: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if f.is_finite() && f.fract() == 0.0 && f >= -I64_BOUND && f < I64_BOUND {
        Value::Integer(f as i64)
    } else {
        Value::Real(f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn whole_floats_become_integers() {
        assert_eq!(float_cell(3.0), Value::Integer(3));
        assert_eq!(float_cell(-2.0), Value::Integer(-2));
        assert_eq!(float_cell(2.5), Value::Real(2.5));
        assert_eq!(float_cell(1e300), Value::Real(1e300));
    }

    #[test]
    fn empty_and_error_cells_are_null() {
        assert_eq!(convert_cell(&Data::Empty), Value::Null);
        assert_eq!(convert_cell(&Data::String("  ".to_string())), Value::Null);
        assert_eq!(convert_cell(&Data::Bool(true)), Value::Text("true".to_string()));
    }

    #[test]
    fn whole_float_headers_outside_i64_keep_their_value() {
        assert_eq!(cell_to_header_string(&Data::Float(2024.0)), "2024");
        assert_eq!(cell_to_header_string(&Data::Float(1.5)), "1.5");
        assert_eq!(cell_to_header_string(&Data::Float(1e20)), 1e20_f64.to_string());
        assert_ne!(cell_to_header_string(&Data::Float(1e20)), i64::MAX.to_string());
    }

    #[test]
    fn blank_rows_after_the_header_are_skipped() {
        let mut range = calamine::Range::new((0, 0), (3, 1));
        range.set_value((0, 0), Data::String("id".to_string()));
        range.set_value((0, 1), Data::Float(1e20));
        range.set_value((1, 0), Data::Float(1.0));
        range.set_value((1, 1), Data::String("x".to_string()));
        range.set_value((2, 0), Data::String("   ".to_string()));
        range.set_value((3, 0), Data::Float(2.0));

        let ds = read_sheet_range(&range).unwrap();
        assert_eq!(ds.columns, vec!["id".to_string(), 1e20_f64.to_string()]);
        assert_eq!(ds.row_count(), 2);
        assert_eq!(ds.rows[1], vec![Value::Integer(2), Value::Null]);
    }
}
