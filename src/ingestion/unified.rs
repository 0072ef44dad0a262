//! Unified reader entrypoint.
//!
//! Most callers should use [`read_dataset`], which picks a reader from the file extension via a
//! [`FormatRegistry`] and loads the whole file into an untyped [`crate::types::DataSet`].
//! Dispatch never sniffs content: an unregistered extension is
//! [`IngestionError::UnsupportedFormat`].

use std::collections::HashMap;
use std::error::Error as StdError;
use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::{IngestionError, IngestionResult, ReadError};
use crate::types::DataSet;

use super::{csv, json, parquet};

/// Supported reader kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IngestionFormat {
    /// Comma-separated values.
    Csv,
    /// Tab-separated values.
    Tsv,
    /// JSON array of flat records.
    Json,
    /// Newline-delimited JSON records.
    NdJson,
    /// Apache Parquet.
    Parquet,
    /// Spreadsheet/workbook formats (feature-gated behind `excel`).
    Excel,
}

impl IngestionFormat {
    /// Short name used in configuration (`EXT=KIND`).
    pub fn name(self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Tsv => "tsv",
            Self::Json => "json",
            Self::NdJson => "ndjson",
            Self::Parquet => "parquet",
            Self::Excel => "excel",
        }
    }
}

impl fmt::Display for IngestionFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for IngestionFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "csv" => Ok(Self::Csv),
            "tsv" => Ok(Self::Tsv),
            "json" => Ok(Self::Json),
            "ndjson" | "jsonl" => Ok(Self::NdJson),
            "parquet" => Ok(Self::Parquet),
            "excel" | "xlsx" => Ok(Self::Excel),
            other => Err(format!(
                "unknown reader kind '{other}' (expected csv, tsv, json, ndjson, parquet or excel)"
            )),
        }
    }
}

/// Extension → reader mapping. Extensions are stored lowercase without the leading dot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatRegistry {
    by_extension: HashMap<String, IngestionFormat>,
}

impl FormatRegistry {
    /// A registry with no extensions at all.
    pub fn empty() -> Self {
        Self {
            by_extension: HashMap::new(),
        }
    }

    /// Map `ext` (case-insensitive, leading dot optional) to `format`, replacing any previous entry.
    pub fn register(&mut self, ext: &str, format: IngestionFormat) {
        let key = ext.trim().trim_start_matches('.').to_ascii_lowercase();
        self.by_extension.insert(key, format);
    }

    /// Look up an extension (case-insensitive).
    pub fn lookup(&self, ext: &str) -> Option<IngestionFormat> {
        self.by_extension.get(&ext.to_ascii_lowercase()).copied()
    }

    /// Resolve the reader for `path` from its extension.
    pub fn format_for(&self, path: &Path) -> IngestionResult<IngestionFormat> {
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .ok_or_else(|| IngestionError::UnsupportedFormat {
                path: path.to_path_buf(),
                message: "path has no extension".to_string(),
            })?;

        self.lookup(ext).ok_or_else(|| IngestionError::UnsupportedFormat {
            path: path.to_path_buf(),
            message: format!("extension '{ext}' is not registered"),
        })
    }
}

impl Default for FormatRegistry {
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register("csv", IngestionFormat::Csv);
        registry.register("tsv", IngestionFormat::Tsv);
        registry.register("json", IngestionFormat::Json);
        registry.register("ndjson", IngestionFormat::NdJson);
        registry.register("jsonl", IngestionFormat::NdJson);
        registry.register("parquet", IngestionFormat::Parquet);
        registry.register("pq", IngestionFormat::Parquet);
        for ext in ["xlsx", "xls", "xlsm", "xlsb", "ods"] {
            registry.register(ext, IngestionFormat::Excel);
        }
        registry
    }
}

/// Load one file into an in-memory [`DataSet`].
///
/// Fails with [`IngestionError::UnsupportedFormat`] when the extension is not registered and
/// with [`IngestionError::Read`] when the file cannot be read or does not flatten into a
/// single rectangular table. Reading has no side effects.
///
/// ```no_run
/// use dropzone_ingest::ingestion::{read_dataset, FormatRegistry};
///
/// # fn main() -> Result<(), dropzone_ingest::IngestionError> {
/// let ds = read_dataset("uploads/Sales Report Q1.csv", &FormatRegistry::default())?;
/// println!("columns={:?} rows={}", ds.columns, ds.row_count());
/// # Ok(())
/// # }
/// ```
pub fn read_dataset(path: impl AsRef<Path>, registry: &FormatRegistry) -> IngestionResult<DataSet> {
    let path = path.as_ref();
    let format = registry.format_for(path)?;

    let ds = match format {
        IngestionFormat::Csv => csv::read_delimited_from_path(path, b',')?,
        IngestionFormat::Tsv => csv::read_delimited_from_path(path, b'\t')?,
        IngestionFormat::Json => json::read_json_from_path(path)?,
        IngestionFormat::NdJson => json::read_ndjson_from_path(path)?,
        IngestionFormat::Parquet => parquet::read_parquet_from_path(path)?,
        IngestionFormat::Excel => read_excel_dispatch(path)?,
    };

    if ds.columns.is_empty() {
        return Err(ReadError::malformed("file has no columns").into());
    }
    Ok(ds)
}

fn read_excel_dispatch(path: &Path) -> Result<DataSet, ReadError> {
    #[cfg(feature = "excel")]
    {
        super::excel::read_excel_from_path(path)
    }

    #[cfg(not(feature = "excel"))]
    {
        let _ = path;
        Err(ReadError::malformed(
            "excel ingestion not enabled (enable cargo feature 'excel')",
        ))
    }
}

/// True when the failure is rooted in I/O (locks, permissions, vanished files) rather than
/// content. Only these are worth one retry.
pub fn is_transient(err: &IngestionError) -> bool {
    match err {
        IngestionError::Read(ReadError::Io(_)) => true,
        IngestionError::Read(ReadError::Csv(e)) => matches!(e.kind(), ::csv::ErrorKind::Io(_)),
        IngestionError::Read(ReadError::Parquet(e)) => error_chain_contains_io(e),
        #[cfg(feature = "excel")]
        IngestionError::Read(ReadError::Excel(e)) => error_chain_contains_io(e),
        _ => false,
    }
}

fn error_chain_contains_io(e: &(dyn StdError + 'static)) -> bool {
    let mut cur: Option<&(dyn StdError + 'static)> = Some(e);
    while let Some(err) = cur {
        if err.is::<std::io::Error>() {
            return true;
        }
        cur = err.source();
    }
    false
}
