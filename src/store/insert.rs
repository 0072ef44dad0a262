//! Row loading.

use rusqlite::Transaction;
use rusqlite::types::Value as SqlValue;

use crate::error::{IngestionError, IngestionResult};
use crate::types::{DataSet, DataType, NULL, Value};

use super::{TargetTable, quote_ident};

/// Insert every row of `dataset` into `target` inside `tx`, returning the number of rows.
///
/// Dataset columns are matched to table columns by name. Each value is coerced to the column's
/// declared type; the first value that cannot be coerced aborts with
/// [`IngestionError::Transaction`]. The caller owns the transaction: committing makes the whole
/// file visible, dropping it rolls every row back.
pub fn insert_rows(tx: &Transaction<'_>, target: &TargetTable, dataset: &DataSet) -> IngestionResult<usize> {
    let table = target.name.as_str();

    let mut projection = Vec::with_capacity(target.columns.len());
    for column in &target.columns {
        let idx = dataset.index_of(&column.name).ok_or_else(|| {
            IngestionError::transaction(table, format!("dataset has no column '{}'", column.name))
        })?;
        projection.push((idx, column));
    }

    let column_list = target
        .columns
        .iter()
        .map(|c| quote_ident(&c.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = (1..=target.columns.len())
        .map(|i| format!("?{i}"))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!(
        "INSERT INTO {} ({column_list}) VALUES ({placeholders})",
        quote_ident(table)
    );

    let mut stmt = tx
        .prepare(&sql)
        .map_err(|e| IngestionError::transaction(table, e))?;

    for (row_idx0, row) in dataset.rows.iter().enumerate() {
        let mut params = Vec::with_capacity(projection.len());
        for &(idx, column) in &projection {
            let value = row.get(idx).unwrap_or(&NULL);
            let coerced = coerce(value, column.data_type).map_err(|message| {
                IngestionError::transaction(
                    table,
                    format!(
                        "row {} column '{}': {message} (raw='{value}')",
                        row_idx0 + 1,
                        column.name
                    ),
                )
            })?;
            params.push(coerced);
        }
        stmt.execute(rusqlite::params_from_iter(params))
            .map_err(|e| IngestionError::transaction(table, format!("row {}: {e}", row_idx0 + 1)))?;
    }

    Ok(dataset.row_count())
}

/// Convert a raw dataset value into the SQL value stored in a column of type `target`.
pub fn coerce(value: &Value, target: DataType) -> Result<SqlValue, String> {
    match (target, value) {
        (_, Value::Null) => Ok(SqlValue::Null),

        (DataType::Integer, Value::Integer(i)) => Ok(SqlValue::Integer(*i)),
        (DataType::Integer, Value::Text(s)) => s
            .trim()
            .parse::<i64>()
            .map(SqlValue::Integer)
            .map_err(|e| format!("expected integer: {e}")),
        (DataType::Integer, Value::Real(_)) => Err("expected integer, got real".to_string()),

        (DataType::Real, Value::Integer(i)) => {
            let f = *i as f64;
            // Beyond 2^53 the conversion would silently round.
            if f as i64 == *i && f.abs() < 9_007_199_254_740_992.0 {
                Ok(SqlValue::Real(f))
            } else {
                Err("integer out of range for real".to_string())
            }
        }
        (DataType::Real, Value::Real(f)) if f.is_finite() => Ok(SqlValue::Real(*f)),
        (DataType::Real, Value::Real(_)) => Err("non-finite real".to_string()),
        (DataType::Real, Value::Text(s)) => {
            let s = s.trim();
            if is_whole_number_text(s) {
                return match s.parse::<i64>() {
                    Ok(i) => coerce(&Value::Integer(i), DataType::Real),
                    Err(_) => Err("integer out of range for real".to_string()),
                };
            }
            match s.parse::<f64>() {
                Ok(f) if f.is_finite() => Ok(SqlValue::Real(f)),
                Ok(_) => Err("real out of range".to_string()),
                Err(e) => Err(format!("expected real: {e}")),
            }
        }

        (DataType::Text, v) => Ok(SqlValue::Text(v.to_string())),
    }
}

fn is_whole_number_text(s: &str) -> bool {
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit())
}
