//! Schema unification across heterogeneous CAERS exports.
//!
//! This module provides functionality for:
//! - Discovering and reading source CSV files
//! - Normalizing column names to one canonical scheme
//! - Stripping whitespace from string cells
//! - Concatenating files by column name

mod reader;
mod sanitizers;

pub use reader::{discover_input_files, read_source_file};
pub use sanitizers::{
    UnparsedDate, normalize_column_name, normalize_columns, normalize_dates, parse_report_date,
    strip_string_columns,
};

use crate::error::Result;
use crate::types::{RowIssue, RowIssueKind, columns};
use crate::utils::{column_names, require_columns, string_column};
use polars::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// One raw table and the file it came from.
#[derive(Debug, Clone)]
pub struct SourceTable {
    pub path: PathBuf,
    pub frame: DataFrame,
}

/// Output of [`SchemaUnifier::unify`].
#[derive(Debug, Clone)]
pub struct UnifiedTable {
    pub frame: DataFrame,
    /// Source files in concatenation order.
    pub files: Vec<PathBuf>,
    /// Rows contributed by each file, parallel to `files`.
    pub rows_per_file: Vec<usize>,
    /// Created-date values that could not be parsed, with their raw text.
    pub date_issues: Vec<RowIssue>,
}

impl UnifiedTable {
    /// File name and zero-based data row a unified row was read from.
    pub fn source_of(&self, row: usize) -> Option<(String, usize)> {
        let mut start = 0;
        for (path, rows) in self.files.iter().zip(&self.rows_per_file) {
            if row < start + rows {
                let name = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| path.display().to_string());
                return Some((name, row - start));
            }
            start += rows;
        }
        None
    }
}

/// Builds one canonical table from many source files.
pub struct SchemaUnifier;

impl SchemaUnifier {
    /// Read `paths` in order and unify them.
    pub fn unify_files(&self, paths: &[PathBuf]) -> Result<UnifiedTable> {
        let mut sources = Vec::with_capacity(paths.len());
        for path in paths {
            let frame = read_source_file(path)?;
            debug!(
                "Loaded {} rows x {} columns from {}",
                frame.height(),
                frame.width(),
                path.display()
            );
            sources.push(SourceTable {
                path: path.clone(),
                frame,
            });
        }
        self.unify(sources)
    }

    /// Normalize each source table and concatenate them by column name.
    pub fn unify(&self, sources: Vec<SourceTable>) -> Result<UnifiedTable> {
        let mut files = Vec::with_capacity(sources.len());
        let mut rows_per_file = Vec::with_capacity(sources.len());
        let mut frames = Vec::with_capacity(sources.len());

        for source in sources {
            let frame = self.clean_source(source.frame, &source.path)?;
            rows_per_file.push(frame.height());
            files.push(source.path);
            frames.push(frame);
        }

        let combined = concat_aligned(frames)?;
        require_columns(&combined, &columns::REQUIRED)?;

        let (frame, unparsed) = normalize_dates(combined, columns::CAERS_CREATED_DATE)?;
        if !unparsed.is_empty() {
            warn!(
                "{} '{}' values could not be parsed and were cleared",
                unparsed.len(),
                columns::CAERS_CREATED_DATE
            );
        }

        info!(
            "Unified {} files into {} rows x {} columns",
            files.len(),
            frame.height(),
            frame.width()
        );

        let mut unified = UnifiedTable {
            frame,
            files,
            rows_per_file,
            date_issues: Vec::new(),
        };
        unified.date_issues = date_issues(&unified, unparsed)?;
        Ok(unified)
    }

    fn clean_source(&self, frame: DataFrame, path: &Path) -> Result<DataFrame> {
        let frame = normalize_columns(frame, path)?;
        strip_string_columns(frame)
    }
}

fn date_issues(unified: &UnifiedTable, unparsed: Vec<UnparsedDate>) -> Result<Vec<RowIssue>> {
    if unparsed.is_empty() {
        return Ok(Vec::new());
    }
    let report_ids = string_column(&unified.frame, columns::REPORT_ID)?;

    Ok(unparsed
        .into_iter()
        .map(|date| {
            let message = format!("'{}' is not a recognized date", date.raw);
            RowIssue::new(
                report_ids.get(date.row).map(str::to_string),
                date.row,
                columns::CAERS_CREATED_DATE,
                RowIssueKind::InvalidDate,
                Some(date.raw),
                message,
            )
            .at_source(unified.source_of(date.row))
        })
        .collect())
}

/// Stack tables by column name.
///
/// Columns are ordered by first appearance; a column missing from a table
/// is filled with nulls for that table's rows. No rows are dropped.
pub fn concat_aligned(frames: Vec<DataFrame>) -> Result<DataFrame> {
    let mut order: Vec<String> = Vec::new();
    for frame in &frames {
        for name in column_names(frame) {
            if !order.contains(&name) {
                order.push(name);
            }
        }
    }

    let mut combined: Option<DataFrame> = None;
    for frame in frames {
        let aligned = align_to(frame, &order)?;
        match combined.as_mut() {
            Some(acc) => {
                acc.vstack_mut(&aligned)?;
            }
            None => combined = Some(aligned),
        }
    }

    Ok(combined.unwrap_or_else(DataFrame::empty))
}

fn align_to(mut frame: DataFrame, order: &[String]) -> Result<DataFrame> {
    let height = frame.height();
    for name in order {
        if frame.get_column_index(name).is_none() {
            let dtype = DataType::String;
            frame.with_column(Series::full_null(name.as_str().into(), height, &dtype))?;
        }
    }
    Ok(frame.select(order.iter().map(String::as_str))?)
}
