//! Delimited-text (CSV/TSV) reader.

use std::collections::HashSet;
use std::fs;
use std::path::Path;

use encoding_rs::{UTF_8, WINDOWS_1252};
use tracing::debug;

use crate::error::ReadError;
use crate::types::{DataSet, Value};

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// Read a delimited text file into an untyped [`DataSet`].
///
/// Rules:
///
/// - The first record is the header row.
/// - Content is decoded as UTF-8; if that fails, it is decoded once more as windows-1252
///   (a superset of Latin-1) before giving up.
/// - Every row must have as many fields as the header.
/// - Cells are trimmed; empty cells become [`Value::Null`], everything else stays
///   [`Value::Text`] so type inference sees the raw text.
pub fn read_delimited_from_path(path: impl AsRef<Path>, delimiter: u8) -> Result<DataSet, ReadError> {
    let path = path.as_ref();
    let bytes = fs::read(path)?;
    let text = decode_text(&bytes);
    if text.is_latin1_fallback {
        debug!(file = %path.display(), "content is not UTF-8, decoded as windows-1252");
    }
    read_delimited_from_str(&text.content, delimiter)
}

/// Read delimited text that is already decoded.
pub fn read_delimited_from_str(input: &str, delimiter: u8) -> Result<DataSet, ReadError> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .delimiter(delimiter)
        .from_reader(input.as_bytes());
    read_delimited_from_reader(&mut rdr)
}

/// Read delimited text from an existing CSV reader (configured with `has_headers(true)`).
pub fn read_delimited_from_reader<R: std::io::Read>(rdr: &mut csv::Reader<R>) -> Result<DataSet, ReadError> {
    let headers = rdr.headers()?.clone();
    let columns = header_names(headers.iter())?;

    let mut rows: Vec<Vec<Value>> = Vec::new();
    for result in rdr.records() {
        let record = result?;
        let row = record
            .iter()
            .map(|raw| {
                let trimmed = raw.trim();
                if trimmed.is_empty() {
                    Value::Null
                } else {
                    Value::Text(trimmed.to_owned())
                }
            })
            .collect();
        rows.push(row);
    }

    Ok(DataSet::new(columns, rows))
}

/// Normalise header cells: trim, name blanks `column_<n>` (1-based), reject duplicates.
pub(crate) fn header_names<'a>(cells: impl Iterator<Item = &'a str>) -> Result<Vec<String>, ReadError> {
    let mut seen = HashSet::new();
    let mut columns = Vec::new();
    for (idx0, cell) in cells.enumerate() {
        let trimmed = cell.trim();
        let name = if trimmed.is_empty() {
            format!("column_{}", idx0 + 1)
        } else {
            trimmed.to_owned()
        };
        if !seen.insert(name.clone()) {
            return Err(ReadError::malformed(format!("duplicate column name '{name}'")));
        }
        columns.push(name);
    }
    Ok(columns)
}

struct DecodedText {
    content: String,
    is_latin1_fallback: bool,
}

fn decode_text(bytes: &[u8]) -> DecodedText {
    let body = bytes.strip_prefix(UTF8_BOM).unwrap_or(bytes);
    match UTF_8.decode_without_bom_handling_and_without_replacement(body) {
        Some(s) => DecodedText {
            content: s.into_owned(),
            is_latin1_fallback: false,
        },
        None => {
            // Every byte maps to a character in windows-1252, so this cannot fail.
            let (s, _) = WINDOWS_1252.decode_without_bom_handling(body);
            DecodedText {
                content: s.into_owned(),
                is_latin1_fallback: true,
            }
        }
    }
}
