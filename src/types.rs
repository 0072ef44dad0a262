//! Core data model types for ingestion.
//!
//! Readers produce an untyped [`DataSet`] (column names + raw scalar cells). Schema inference
//! turns it into a [`Schema`] of typed [`Field`]s, which is what gets persisted.

use std::fmt;

use serde::Serialize;

/// Column type as persisted in the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DataType {
    /// 64-bit signed integer (`INTEGER`).
    Integer,
    /// 64-bit floating point number (`REAL`).
    Real,
    /// UTF-8 string (`TEXT`).
    Text,
}

impl DataType {
    /// SQL type name used in `CREATE TABLE`.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Integer => "INTEGER",
            Self::Real => "REAL",
            Self::Text => "TEXT",
        }
    }

    /// Map a declared SQLite column type back to a [`DataType`] using SQLite's affinity rules.
    ///
    /// Tables created by this crate always round-trip exactly; tables created elsewhere get the
    /// closest affinity.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            Self::Real
        } else {
            Self::Text
        }
    }

    /// Whether a column declared as `self` can hold values inferred as `incoming`.
    ///
    /// Integers widen into real and text columns, reals into text columns; text only fits text.
    pub fn accepts(self, incoming: DataType) -> bool {
        matches!(
            (self, incoming),
            (Self::Text, _)
                | (Self::Real, Self::Real | Self::Integer)
                | (Self::Integer, Self::Integer)
        )
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Integer => "Integer",
            Self::Real => "Real",
            Self::Text => "Text",
        };
        f.write_str(s)
    }
}

/// A single named, typed column in a [`Schema`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Field {
    /// Field/column name.
    pub name: String,
    /// Field data type.
    pub data_type: DataType,
}

impl Field {
    /// Create a new field.
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
        }
    }
}

/// An ordered list of typed columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schema {
    /// Ordered list of fields.
    pub fields: Vec<Field>,
}

impl Schema {
    /// Create a new schema from fields.
    pub fn new(fields: Vec<Field>) -> Self {
        Self { fields }
    }

    /// Iterate field names in order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    /// Returns the field with the given name, if present.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// A single raw scalar cell in a [`DataSet`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Missing/empty value.
    Null,
    /// 64-bit signed integer (typed sources such as JSON numbers or workbook cells).
    Integer(i64),
    /// 64-bit float.
    Real(f64),
    /// Text exactly as read (after trimming).
    Text(String),
}

pub(crate) static NULL: Value = Value::Null;

impl Value {
    /// True for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Integer(v) => write!(f, "{v}"),
            Self::Real(v) => write!(f, "{v}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// In-memory tabular dataset read from one file.
///
/// Rows are stored as `Vec<Vec<Value>>`; cell `i` of every row belongs to `columns[i]`.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSet {
    /// Column names in source order.
    pub columns: Vec<String>,
    /// Row-major value storage, in source order.
    pub rows: Vec<Vec<Value>>,
}

impl DataSet {
    /// Create a dataset from column names and rows.
    pub fn new(columns: Vec<String>, rows: Vec<Vec<Value>>) -> Self {
        Self { columns, rows }
    }

    /// Number of rows in the dataset.
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Returns the index of a column by name, if present.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Iterate the values of one column, top to bottom. Short rows yield [`Value::Null`].
    pub fn column_values(&self, idx: usize) -> impl Iterator<Item = &Value> {
        self.rows.iter().map(move |row| row.get(idx).unwrap_or(&NULL))
    }
}
