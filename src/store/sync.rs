//! Table synchronization: create the target table on first sighting, otherwise check that the
//! existing table can take the incoming schema. Never alters an existing table.

use std::collections::HashMap;
use std::path::Path;

use rusqlite::Connection;
use tracing::debug;

use crate::error::{ColumnConflict, IngestionError, IngestionResult};
use crate::types::{Field, Schema};

use super::{TargetTable, naming::table_name, quote_ident, table_columns};

/// Resolve the table for `path` and make sure it can receive `schema`.
///
/// - Table absent: creates it with exactly `schema`'s columns, in order.
/// - Table present: column names must match as sets and every existing column type must accept
///   the incoming one (see [`crate::types::DataType::accepts`]). Otherwise returns
///   [`IngestionError::SchemaConflict`] listing every mismatch, having changed nothing.
///
/// Run this inside the same transaction as the insert so a failed load never leaves a freshly
/// created empty table behind.
pub fn synchronize_table(conn: &Connection, path: &Path, schema: &Schema) -> IngestionResult<TargetTable> {
    let name = table_name(path);
    let existing = table_columns(conn, &name).map_err(|e| IngestionError::transaction(&name, e))?;

    match existing {
        None => {
            create_table(conn, &name, schema)?;
            debug!(table = %name, columns = schema.fields.len(), "created table");
            Ok(TargetTable {
                name,
                columns: schema.fields.clone(),
                created: true,
            })
        }
        Some(columns) => {
            let conflicts = schema_conflicts(&columns, schema);
            if !conflicts.is_empty() {
                return Err(IngestionError::SchemaConflict {
                    table: name,
                    conflicts,
                });
            }
            Ok(TargetTable {
                name,
                columns,
                created: false,
            })
        }
    }
}

fn create_table(conn: &Connection, name: &str, schema: &Schema) -> IngestionResult<()> {
    let columns = schema
        .fields
        .iter()
        .map(|f| format!("{} {}", quote_ident(&f.name), f.data_type.sql_name()))
        .collect::<Vec<_>>()
        .join(", ");
    let ddl = format!("CREATE TABLE {} ({columns})", quote_ident(name));
    conn.execute_batch(&ddl)
        .map_err(|e| IngestionError::transaction(name, e))
}

/// Every reason `existing` cannot accept `incoming`, in a stable order: table columns first
/// (missing or incompatible), then unexpected file columns.
pub fn schema_conflicts(existing: &[Field], incoming: &Schema) -> Vec<ColumnConflict> {
    let incoming_by_name: HashMap<&str, &Field> = incoming
        .fields
        .iter()
        .map(|f| (f.name.as_str(), f))
        .collect();

    let mut conflicts = Vec::new();
    for column in existing {
        match incoming_by_name.get(column.name.as_str()) {
            None => conflicts.push(ColumnConflict::Missing {
                column: column.name.clone(),
            }),
            Some(field) if !column.data_type.accepts(field.data_type) => {
                conflicts.push(ColumnConflict::Incompatible {
                    column: column.name.clone(),
                    existing: column.data_type,
                    incoming: field.data_type,
                });
            }
            Some(_) => {}
        }
    }
    for field in &incoming.fields {
        if !existing.iter().any(|c| c.name == field.name) {
            conflicts.push(ColumnConflict::Unexpected {
                column: field.name.clone(),
            });
        }
    }
    conflicts
}
