//! Filesystem-backed extraction and publishing.
//!
//! Tables are newline-delimited JSON files. A row is a non-blank line and
//! every row must parse as JSON.

mod extract;
mod publish;

use crate::catalog::TableId;

pub use extract::DirectoryExtractor;
pub use publish::DirectoryPublisher;

pub(crate) fn table_file_name(table: &TableId) -> String {
    format!("{}.ndjson", table)
}

pub(crate) fn count_rows(content: &str) -> std::result::Result<u64, String> {
    let mut rows = 0;
    for (line_no, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        serde_json::from_str::<serde_json::Value>(line)
            .map_err(|e| format!("line {}: {}", line_no + 1, e))?;
        rows += 1;
    }
    Ok(rows)
}
