//! Source file discovery and CSV loading.

use crate::error::{ProcessingError, Result};
use polars::io::csv::read::{CsvEncoding, CsvParseOptions, CsvReadOptions};
use polars::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

/// List files in `dir` whose extension matches `extension` (case-insensitive).
///
/// Sorted by file name so concatenation order, and therefore output bytes,
/// do not depend on the platform's directory iteration order.
pub fn discover_input_files(dir: &Path, extension: &str) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ProcessingError::InputDirNotFound(dir.to_path_buf()));
    }

    let extension = extension.trim_start_matches('.');
    let mut files = Vec::new();
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let matches = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case(extension));
        if path.is_file() && matches {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(ProcessingError::NoInputFiles {
            dir: dir.to_path_buf(),
            extension: extension.to_string(),
        });
    }

    files.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
    debug!("Discovered {} input files in {}", files.len(), dir.display());
    Ok(files)
}

/// Read one CSV export with every column as text.
///
/// Reading as text keeps vintages whose columns would infer to different
/// dtypes concatenable. Invalid UTF-8 is decoded lossily; anything the CSV
/// parser rejects is a [`ProcessingError::FileParse`] naming the file.
pub fn read_source_file(path: &Path) -> Result<DataFrame> {
    let parse_error = |source| ProcessingError::FileParse {
        path: path.to_path_buf(),
        source,
    };

    CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(0))
        .with_parse_options(
            CsvParseOptions::default()
                .with_quote_char(Some(b'"'))
                .with_encoding(CsvEncoding::LossyUtf8),
        )
        .try_into_reader_with_file_path(Some(path.to_path_buf()))
        .map_err(parse_error)?
        .finish()
        .map_err(parse_error)
}
