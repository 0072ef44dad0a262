//! Parquet reader.

use std::collections::HashMap;
use std::path::Path;

use parquet::file::reader::{ChunkReader, FileReader};
use parquet::file::serialized_reader::SerializedFileReader;
use parquet::record::Field;

use crate::error::ReadError;
use crate::types::{DataSet, Value};

/// Read a Parquet file into an untyped [`DataSet`].
///
/// Notes:
/// - Only flat files are accepted: every top-level column must be a primitive
/// - Uses the Parquet record API (`RowIter`)
pub fn read_parquet_from_path(path: impl AsRef<Path>) -> Result<DataSet, ReadError> {
    let reader = SerializedFileReader::try_from(path.as_ref())?;
    let columns = flat_column_names(&reader)?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for (idx0, row_res) in reader.into_iter().enumerate() {
        let row_num = idx0 + 1;
        let row = row_res?;

        let map: HashMap<&str, &Field> = row
            .get_column_iter()
            .map(|(name, field)| (name.as_str(), field))
            .collect();

        let mut out_row: Vec<Value> = Vec::with_capacity(columns.len());
        for name in &columns {
            let value = match map.get(name.as_str()) {
                None => Value::Null,
                Some(f) => convert_parquet_field(row_num, name, f)?,
            };
            out_row.push(value);
        }
        rows.push(out_row);
    }

    Ok(DataSet::new(columns, rows))
}

fn flat_column_names<R: ChunkReader + 'static>(reader: &SerializedFileReader<R>) -> Result<Vec<String>, ReadError> {
    let schema = reader.metadata().file_metadata().schema_descr();
    let mut names = Vec::new();
    for field in schema.root_schema().get_fields() {
        if !field.is_primitive() {
            return Err(ReadError::malformed(format!(
                "column '{}' is nested; only flat files are supported",
                field.name()
            )));
        }
        names.push(field.name().to_string());
    }
    Ok(names)
}

fn convert_parquet_field(row: usize, column: &str, f: &Field) -> Result<Value, ReadError> {
    let value = match f {
        Field::Null => Value::Null,
        Field::Byte(v) => Value::Integer(i64::from(*v)),
        Field::Short(v) => Value::Integer(i64::from(*v)),
        Field::Int(v) => Value::Integer(i64::from(*v)),
        Field::Long(v) => Value::Integer(*v),
        Field::UByte(v) => Value::Integer(i64::from(*v)),
        Field::UShort(v) => Value::Integer(i64::from(*v)),
        Field::UInt(v) => Value::Integer(i64::from(*v)),
        Field::ULong(v) => match i64::try_from(*v) {
            Ok(i) => Value::Integer(i),
            Err(_) => Value::Real(*v as f64),
        },
        Field::Float(v) => Value::Real(f64::from(*v)),
        Field::Double(v) => Value::Real(*v),
        Field::Str(s) => {
            if s.trim().is_empty() {
                Value::Null
            } else {
                Value::Text(s.trim().to_owned())
            }
        }
        Field::Group(_) | Field::ListInternal(_) | Field::MapInternal(_) => {
            return Err(ReadError::malformed(format!(
                "row {row} column '{column}' is nested; only flat files are supported"
            )));
        }
        other => Value::Text(other.to_string()),
    };
    Ok(value)
}
