//! Schema inference: derive a typed [`Schema`] from an untyped [`DataSet`].
//!
//! Each column gets the narrowest of `Integer ⊂ Real ⊂ Text` that accepts every non-null value.
//! Columns with no non-null values (including every column of an empty dataset) are `Text`.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::{DataSet, DataType, Field, Schema, Value};

static DECIMAL_LITERAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?([0-9]+\.?[0-9]*|\.[0-9]+)([eE][+-]?[0-9]+)?$").expect("valid decimal regex")
});

/// Infer one [`Field`] per dataset column, in the dataset's column order.
///
/// ```rust
/// use dropzone_ingest::inference::infer_schema;
/// use dropzone_ingest::types::{DataSet, DataType, Value};
///
/// let ds = DataSet::new(
///     vec!["id".into(), "price".into(), "sku".into()],
///     vec![
///         vec![Value::Text("1".into()), Value::Text("2.5".into()), Value::Text("007".into())],
///         vec![Value::Text("2".into()), Value::Text("3".into()), Value::Text("008".into())],
///     ],
/// );
/// let schema = infer_schema(&ds);
/// let types: Vec<DataType> = schema.fields.iter().map(|f| f.data_type).collect();
/// assert_eq!(types, vec![DataType::Integer, DataType::Real, DataType::Text]);
/// ```
pub fn infer_schema(dataset: &DataSet) -> Schema {
    let fields = dataset
        .columns
        .iter()
        .enumerate()
        .map(|(idx, name)| Field::new(name.clone(), infer_column(dataset.column_values(idx))))
        .collect();
    Schema::new(fields)
}

/// Infer the type of a single column from its values.
pub fn infer_column<'a>(values: impl IntoIterator<Item = &'a Value>) -> DataType {
    let mut seen_value = false;
    let mut all_integer = true;

    for value in values {
        match value {
            Value::Null => continue,
            Value::Integer(_) => {}
            Value::Real(_) => all_integer = false,
            Value::Text(s) => {
                if is_integer_text(s) {
                    // stays Integer
                } else if is_real_text(s) {
                    all_integer = false;
                } else {
                    return DataType::Text;
                }
            }
        }
        seen_value = true;
    }

    match (seen_value, all_integer) {
        (false, _) => DataType::Text,
        (true, true) => DataType::Integer,
        (true, false) => DataType::Real,
    }
}

/// Text that round-trips through `i64` without losing anything.
pub fn is_integer_text(s: &str) -> bool {
    let s = s.trim();
    let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
    !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && !has_leading_zero(digits)
        && s.parse::<i64>().is_ok()
}

/// A plain decimal or scientific literal with a finite `f64` value.
///
/// `inf`, `NaN`, hex and leading-zero forms such as `007.5` are not numbers here.
pub fn is_real_text(s: &str) -> bool {
    let s = s.trim();
    let unsigned = s.strip_prefix(['+', '-']).unwrap_or(s);
    DECIMAL_LITERAL.is_match(s)
        && !has_leading_zero(unsigned)
        && s.parse::<f64>().is_ok_and(f64::is_finite)
}

fn has_leading_zero(unsigned: &str) -> bool {
    let bytes = unsigned.as_bytes();
    bytes.first() == Some(&b'0') && bytes.get(1).is_some_and(u8::is_ascii_digit)
}
