//! One-to-many expansion of comma-separated, set-valued fields.
//!
//! A report whose `outcomes` reads `"Death, Hospitalization"` becomes two
//! rows that share every other field, including `report_id`, so exploded
//! rows always join back to their source report.

use crate::config::EmptyValuePolicy;
use crate::error::Result;
use crate::types::columns;
use crate::utils::string_column;
use polars::prelude::*;
use std::collections::HashMap;
use tracing::{debug, info};

/// Split a comma-separated field into trimmed, non-empty, distinct pieces
/// in order of first appearance.
pub fn split_multi_value(text: &str) -> Vec<String> {
    let mut pieces: Vec<String> = Vec::new();
    for piece in text.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        if !pieces.iter().any(|p| p == piece) {
            pieces.push(piece.to_string());
        }
    }
    pieces
}

/// Expand `column` into one row per piece.
///
/// Rows of one source row stay contiguous and in source-text order; source
/// rows keep their table order. Returns the exploded table and the number of
/// source rows that had no usable piece.
pub fn explode_column(
    df: &DataFrame,
    column: &str,
    policy: EmptyValuePolicy,
) -> Result<(DataFrame, usize)> {
    let values = string_column(df, column)?;

    let mut indices: Vec<IdxSize> = Vec::with_capacity(df.height());
    let mut exploded: Vec<Option<String>> = Vec::with_capacity(df.height());
    let mut empty_rows = 0;

    for (row, value) in values.into_iter().enumerate() {
        let pieces = value.map(split_multi_value).unwrap_or_default();

        if pieces.is_empty() {
            empty_rows += 1;
            if policy == EmptyValuePolicy::NullRow {
                indices.push(row as IdxSize);
                exploded.push(None);
            }
            continue;
        }

        for piece in pieces {
            indices.push(row as IdxSize);
            exploded.push(Some(piece));
        }
    }

    let take = IdxCa::from_vec("idx".into(), indices);
    let mut out = df.take(&take)?;
    out.replace(column, Series::new(column.into(), exploded))?;

    debug!(
        "Exploded '{}': {} rows -> {} rows ({} without values)",
        column,
        df.height(),
        out.height(),
        empty_rows
    );

    Ok((out, empty_rows))
}

/// Table-level outcome explosion.
#[derive(Debug, Clone, Copy, Default)]
pub struct OutcomeExploder {
    policy: EmptyValuePolicy,
}

impl OutcomeExploder {
    pub fn new(policy: EmptyValuePolicy) -> Self {
        Self { policy }
    }

    /// One row per (report, outcome).
    pub fn explode(&self, df: &DataFrame) -> Result<(DataFrame, usize)> {
        let (exploded, empty_reports) = explode_column(df, columns::OUTCOMES, self.policy)?;
        info!(
            "Exploded {} reports into {} outcome rows",
            df.height(),
            exploded.height()
        );
        Ok((exploded, empty_reports))
    }
}

/// Count how many rows mention each term of a set-valued column.
///
/// Uses the same split rules as [`explode_column`]. Sorted by count
/// descending, then term ascending.
pub fn term_frequencies(df: &DataFrame, column: &str) -> Result<Vec<(String, usize)>> {
    let (exploded, _) = explode_column(df, column, EmptyValuePolicy::Drop)?;
    let terms = string_column(&exploded, column)?;

    let mut counts: HashMap<String, usize> = HashMap::new();
    for term in terms.into_iter().flatten() {
        *counts.entry(term.to_string()).or_insert(0) += 1;
    }

    let mut counts: Vec<(String, usize)> = counts.into_iter().collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    Ok(counts)
}
