//! Shared utilities for the CAERS processing pipeline.
//!
//! Column access helpers used by several stages, so that a missing column
//! always surfaces as the same [`ProcessingError::ColumnNotFound`].

use crate::error::{ProcessingError, Result};
use polars::prelude::*;

// =============================================================================
// Column Access
// =============================================================================

/// Check if a DataType holds text.
#[inline]
pub fn is_string_dtype(dtype: &DataType) -> bool {
    matches!(dtype, DataType::String)
}

/// Names of all columns, owned, in table order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .into_iter()
        .map(|s| s.to_string())
        .collect()
}

/// Fetch a column as text, casting non-string columns.
///
/// A missing column is reported as [`ProcessingError::ColumnNotFound`].
pub fn string_column(df: &DataFrame, name: &str) -> Result<StringChunked> {
    let column = df
        .column(name)
        .map_err(|_| ProcessingError::ColumnNotFound(name.to_string()))?;
    let series = column.as_materialized_series();
    if is_string_dtype(series.dtype()) {
        return Ok(series.str()?.clone());
    }
    let casted = series.cast(&DataType::String)?;
    Ok(casted.str()?.clone())
}

/// Owned values of a text column, mostly for assertions and reports.
pub fn string_values(df: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let values = string_column(df, name)?;
    Ok(values
        .into_iter()
        .map(|v| v.map(str::to_string))
        .collect())
}

/// Fail with [`ProcessingError::ColumnNotFound`] for the first absent column.
pub fn require_columns(df: &DataFrame, required: &[&str]) -> Result<()> {
    let present = column_names(df);
    match required
        .iter()
        .find(|name| !present.iter().any(|p| p == *name))
    {
        Some(missing) => Err(ProcessingError::ColumnNotFound((*missing).to_string())),
        None => Ok(()),
    }
}

// =============================================================================
// Numeric Helpers
// =============================================================================

/// Round half away from zero to a fixed number of decimal places.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_to() {
        assert_eq!(round_to(1.0 / 12.0, 4), 0.0833);
        assert_eq!(round_to(1.0 / 365.0, 4), 0.0027);
        assert_eq!(round_to(1.0 / 52.0, 4), 0.0192);
        assert_eq!(round_to(10.0, 4), 10.0);
    }

    #[test]
    fn test_string_column_casts_numbers() {
        let df = df!["patient_age" => [24i64, 3]].unwrap();
        let values = string_values(&df, "patient_age").unwrap();
        assert_eq!(values, vec![Some("24".to_string()), Some("3".to_string())]);
    }

    #[test]
    fn test_string_column_missing() {
        let df = df!["report_id" => ["1"]].unwrap();
        let err = string_column(&df, "product").unwrap_err();
        assert_eq!(err.error_code(), "COLUMN_NOT_FOUND");
    }

    #[test]
    fn test_require_columns_reports_first_missing() {
        let df = df!["report_id" => ["1"], "product" => ["x"]].unwrap();
        assert!(require_columns(&df, &["report_id", "product"]).is_ok());
        let err = require_columns(&df, &["report_id", "outcomes", "category"]).unwrap_err();
        assert!(matches!(err, ProcessingError::ColumnNotFound(ref c) if c == "outcomes"));
    }
}
