//! JSON reader.
//!
//! Supported inputs:
//! - `.json`: a top-level JSON array of flat objects: `[{"a":1}, {"a":2}]`
//! - `.ndjson` / `.jsonl`: one flat object per line: `{"a":1}\n{"a":2}\n`
//!
//! Values must be scalars. Nested objects or arrays do not flatten into one table and are
//! rejected. Columns are the union of keys in first-seen order; a key absent from a record
//! reads as null.

use std::fs;
use std::path::Path;

use serde_json::Map;

use crate::error::ReadError;
use crate::types::{DataSet, Value};

/// Read a `.json` file (array of records) into an untyped [`DataSet`].
pub fn read_json_from_path(path: impl AsRef<Path>) -> Result<DataSet, ReadError> {
    let bytes = fs::read(path)?;
    read_json_from_str(utf8_text(&bytes)?)
}

/// Read a JSON array of records from an in-memory string.
pub fn read_json_from_str(input: &str) -> Result<DataSet, ReadError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ReadError::malformed("json input is empty"));
    }

    match serde_json::from_str::<serde_json::Value>(trimmed)? {
        serde_json::Value::Array(items) => records_to_dataset(&items),
        _ => Err(ReadError::malformed(
            "json must be a top-level array of objects",
        )),
    }
}

/// Read a newline-delimited JSON file into an untyped [`DataSet`].
pub fn read_ndjson_from_path(path: impl AsRef<Path>) -> Result<DataSet, ReadError> {
    let bytes = fs::read(path)?;
    read_ndjson_from_str(utf8_text(&bytes)?)
}

/// Read newline-delimited JSON records from an in-memory string.
pub fn read_ndjson_from_str(input: &str) -> Result<DataSet, ReadError> {
    let mut values = Vec::new();
    for (i, line) in input.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let v = serde_json::from_str::<serde_json::Value>(line)
            .map_err(|e| ReadError::malformed(format!("invalid ndjson at line {}: {}", i + 1, e)))?;
        values.push(v);
    }
    records_to_dataset(&values)
}

// Undecodable bytes are a content problem, not an I/O one.
fn utf8_text(bytes: &[u8]) -> Result<&str, ReadError> {
    std::str::from_utf8(bytes)
        .map_err(|e| ReadError::malformed(format!("json is not valid utf-8: {e}")))
}

fn records_to_dataset(values: &[serde_json::Value]) -> Result<DataSet, ReadError> {
    let mut objects: Vec<&Map<String, serde_json::Value>> = Vec::with_capacity(values.len());
    let mut columns: Vec<String> = Vec::new();

    for (idx0, v) in values.iter().enumerate() {
        let row_num = idx0 + 1;
        let obj = v
            .as_object()
            .ok_or_else(|| ReadError::malformed(format!("record {row_num} is not a json object")))?;
        for key in obj.keys() {
            if !columns.iter().any(|c| c == key) {
                columns.push(key.clone());
            }
        }
        objects.push(obj);
    }

    let mut rows: Vec<Vec<Value>> = Vec::with_capacity(objects.len());
    for (idx0, obj) in objects.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let mut row = Vec::with_capacity(columns.len());
        for column in &columns {
            let value = match obj.get(column) {
                None => Value::Null,
                Some(jv) => convert_json_value(row_num, column, jv)?,
            };
            row.push(value);
        }
        rows.push(row);
    }

    Ok(DataSet::new(columns, rows))
}

fn convert_json_value(row: usize, column: &str, v: &serde_json::Value) -> Result<Value, ReadError> {
    match v {
        serde_json::Value::Null => Ok(Value::Null),
        serde_json::Value::Bool(b) => Ok(Value::Text(b.to_string())),
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(Value::Text(trimmed.to_owned()))
            }
        }
        serde_json::Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Value::Integer(i))
            } else if let Some(f) = n.as_f64() {
                Ok(Value::Real(f))
            } else {
                Err(ReadError::malformed(format!(
                    "record {row} field '{column}': number {n} is not representable"
                )))
            }
        }
        serde_json::Value::Array(_) | serde_json::Value::Object(_) => Err(ReadError::malformed(
            format!("record {row} field '{column}' is nested; only flat records are supported"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_union_in_first_seen_order() {
        let ds = read_json_from_str(r#"[{"b":1,"a":"x"},{"a":"y","c":2.5}]"#).unwrap();
        assert_eq!(ds.columns, vec!["b", "a", "c"]);
        assert_eq!(ds.rows[0], vec![Value::Integer(1), Value::Text("x".into()), Value::Null]);
        assert_eq!(ds.rows[1], vec![Value::Null, Value::Text("y".into()), Value::Real(2.5)]);
    }

    #[test]
    fn non_utf8_bytes_are_malformed() {
        let err = utf8_text(b"[{\"city\": \"Z\xfcrich\"}]").unwrap_err();
        assert!(matches!(err, ReadError::Malformed { .. }), "{err}");
    }

    #[test]
    fn top_level_object_is_rejected() {
        let err = read_json_from_str(r#"{"id":1}"#).unwrap_err();
        assert!(err.to_string().contains("top-level array"));
    }

    #[test]
    fn booleans_read_as_text() {
        let ds = read_ndjson_from_str("{\"ok\":true}\n\n{\"ok\":false}\n").unwrap();
        assert_eq!(ds.rows[1][0], Value::Text("false".into()));
    }
}
