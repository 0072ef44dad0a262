//! File identity → table name.

use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;

static NON_WORD_RUN: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\W+").expect("valid non-word regex"));

/// Derive the target table name from a file path.
///
/// `lowercase(collapse_non_word_runs_to_single_underscore(strip_extension(basename(path))))`.
/// Only the last extension is stripped; "word" characters are Unicode letters, digits and `_`.
///
/// ```rust
/// use dropzone_ingest::store::table_name;
///
/// assert_eq!(table_name("uploads/Sales Report Q1.csv"), "sales_report_q1");
/// assert_eq!(table_name("a--b  c.CSV"), "a_b_c");
/// ```
pub fn table_name(path: impl AsRef<Path>) -> String {
    let stem = path
        .as_ref()
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    NON_WORD_RUN.replace_all(&stem, "_").to_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_runs_and_lowercases() {
        assert_eq!(table_name("Sales Report Q1.csv"), "sales_report_q1");
        assert_eq!(table_name("a--b  c.CSV"), "a_b_c");
        assert_eq!(table_name("/tmp/drop/ORDERS.json"), "orders");
    }

    #[test]
    fn only_last_extension_is_stripped() {
        assert_eq!(table_name("archive.2024.csv"), "archive_2024");
        assert_eq!(table_name("no_extension"), "no_extension");
    }

    #[test]
    fn edge_separators_are_kept_as_underscores() {
        assert_eq!(table_name(" (draft) sales .xlsx"), "_draft_sales_");
        assert_eq!(table_name("Café Ümsatz.csv"), "café_ümsatz");
    }

    #[test]
    fn naming_is_deterministic() {
        let a = table_name("Q3 — Revenue.parquet");
        let b = table_name("Q3 — Revenue.parquet");
        assert_eq!(a, b);
        assert_eq!(a, "q3_revenue");
    }
}
