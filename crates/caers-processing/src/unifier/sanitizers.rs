//! Column-name and cell sanitization applied to every source file.

use crate::error::{ProcessingError, Result};
use crate::utils::{column_names, is_string_dtype};
use chrono::{NaiveDate, NaiveDateTime};
use once_cell::sync::Lazy;
use polars::prelude::*;
use regex::Regex;
use std::collections::HashSet;
use std::path::Path;
use tracing::debug;

static WHITESPACE_RUN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s+").expect("Invalid regex: whitespace run"));

/// Historical column names mapped to their canonical spelling.
const COLUMN_RENAMES: [(&str, &str); 2] = [
    ("meddra_preferred_terms", "medra_preferred_terms"),
    ("description", "category"),
];

const DATETIME_FORMATS: [&str; 3] = ["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%m/%d/%Y %H:%M:%S"];

/// Canonical form of a source column name.
///
/// Lower-cases, collapses whitespace runs to `_`, then applies the known
/// historical renames. `"MedDRA  Preferred Terms"` becomes
/// `"medra_preferred_terms"`.
pub fn normalize_column_name(name: &str) -> String {
    let lowered = name.trim_start_matches('\u{feff}').trim().to_lowercase();
    let snake = WHITESPACE_RUN.replace_all(&lowered, "_");

    match COLUMN_RENAMES.iter().find(|(from, _)| *from == snake) {
        Some((_, to)) => (*to).to_string(),
        None => snake.into_owned(),
    }
}

/// Rename every column of `df` to its canonical form.
///
/// Fails when two columns of the same file collapse onto one name, since
/// keeping either would silently discard data.
pub fn normalize_columns(mut df: DataFrame, path: &Path) -> Result<DataFrame> {
    let normalized: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| normalize_column_name(name))
        .collect();

    let mut seen = HashSet::new();
    if let Some(duplicate) = normalized.iter().find(|name| !seen.insert(name.as_str())) {
        return Err(ProcessingError::DuplicateColumn {
            path: path.to_path_buf(),
            column: duplicate.clone(),
        });
    }

    df.set_column_names(normalized.iter().map(String::as_str))?;
    Ok(df)
}

/// Strip leading and trailing whitespace from every string cell.
///
/// Non-string columns and nulls pass through unchanged.
pub fn strip_string_columns(df: DataFrame) -> Result<DataFrame> {
    let mut df = df;

    for col_name in &column_names(&df) {
        let series = df.column(col_name)?.as_materialized_series();
        if !is_string_dtype(series.dtype()) {
            continue;
        }

        let stripped: Vec<Option<String>> = series
            .str()?
            .into_iter()
            .map(|value| value.map(|v| v.trim().to_string()))
            .collect();

        df.replace(col_name, Series::new(col_name.as_str().into(), stripped))?;
    }

    Ok(df)
}

/// Parse a report date in any of the formats seen in CAERS exports.
pub fn parse_report_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();

    for format in DATETIME_FORMATS {
        if let Ok(datetime) = NaiveDateTime::parse_from_str(raw, format) {
            return Some(datetime.date());
        }
    }

    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return Some(date);
    }

    // Two-digit years need %y; %Y would read "17" as year 17.
    let (_, year) = raw.rsplit_once('/')?;
    let format = if year.len() == 2 { "%m/%d/%y" } else { "%m/%d/%Y" };
    NaiveDate::parse_from_str(raw, format).ok()
}

/// A date value that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnparsedDate {
    /// Zero-based row in the table passed to [`normalize_dates`].
    pub row: usize,
    /// The value as found.
    pub raw: String,
}

/// Rewrite a date column as ISO-8601 `YYYY-MM-DD`.
///
/// Values that cannot be parsed become null and are returned with their row
/// so the caller can keep the raw text. A table without the column is
/// returned as-is.
pub fn normalize_dates(df: DataFrame, column: &str) -> Result<(DataFrame, Vec<UnparsedDate>)> {
    let mut df = df;
    if df.get_column_index(column).is_none() {
        return Ok((df, Vec::new()));
    }

    let series = df
        .column(column)?
        .as_materialized_series()
        .cast(&DataType::String)?;
    let mut unparsed = Vec::new();
    let dates: Vec<Option<String>> = series
        .str()?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value.map(str::trim) {
            None | Some("") => None,
            Some(raw) => match parse_report_date(raw) {
                Some(date) => Some(date.format("%Y-%m-%d").to_string()),
                None => {
                    unparsed.push(UnparsedDate {
                        row,
                        raw: raw.to_string(),
                    });
                    None
                }
            },
        })
        .collect();

    df.replace(column, Series::new(column.into(), dates))?;

    if !unparsed.is_empty() {
        debug!(
            "{} values of '{}' could not be parsed as dates",
            unparsed.len(),
            column
        );
    }
    Ok((df, unparsed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::string_values;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_normalize_column_name() {
        assert_eq!(normalize_column_name("Report ID"), "report_id");
        assert_eq!(normalize_column_name("  Patient   Age "), "patient_age");
        assert_eq!(normalize_column_name("PRODUCT"), "product");
        assert_eq!(
            normalize_column_name("MedDRA Preferred Terms"),
            "medra_preferred_terms"
        );
        assert_eq!(normalize_column_name("Description"), "category");
        assert_eq!(normalize_column_name("\u{feff}report_id"), "report_id");
    }

    #[test]
    fn test_normalize_columns_rejects_collisions() {
        let df = df!["Product" => ["a"], "product" => ["b"]].unwrap();
        let err = normalize_columns(df, Path::new("raw/a.csv")).unwrap_err();
        match err {
            ProcessingError::DuplicateColumn { path, column } => {
                assert_eq!(path, Path::new("raw/a.csv"));
                assert_eq!(column, "product");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_strip_string_columns_keeps_other_types() {
        let df = df![
            "product" => [Some("  Kind Bar "), None, Some("")],
            "patient_age" => [Some(1i64), None, Some(3)],
        ]
        .unwrap();

        let stripped = strip_string_columns(df).unwrap();
        assert_eq!(
            string_values(&stripped, "product").unwrap(),
            vec![Some("Kind Bar".to_string()), None, Some(String::new())]
        );
        assert_eq!(
            stripped.column("patient_age").unwrap().dtype(),
            &DataType::Int64
        );
    }

    #[test]
    fn test_parse_report_date() {
        let expected = NaiveDate::from_ymd_opt(2017, 1, 3);
        assert_eq!(parse_report_date("01/03/2017"), expected);
        assert_eq!(parse_report_date("1/3/2017"), expected);
        assert_eq!(parse_report_date("01/03/17"), expected);
        assert_eq!(parse_report_date("2017-01-03"), expected);
        assert_eq!(parse_report_date("2017-01-03 10:20:00"), expected);
        assert_eq!(parse_report_date("yesterday"), None);
    }

    #[test]
    fn test_normalize_dates() {
        let df = df![
            "caers_created_date" => [Some("04/01/2016"), Some("garbage"), None],
        ]
        .unwrap();
        let (df, unparsed) = normalize_dates(df, "caers_created_date").unwrap();
        assert_eq!(
            unparsed,
            vec![UnparsedDate {
                row: 1,
                raw: "garbage".to_string()
            }]
        );
        assert_eq!(
            string_values(&df, "caers_created_date").unwrap(),
            vec![Some("2016-04-01".to_string()), None, None]
        );
    }

    #[test]
    fn test_normalize_dates_without_column() {
        let df = df!["report_id" => ["1"]].unwrap();
        let (df, unparsed) = normalize_dates(df, "caers_created_date").unwrap();
        assert!(unparsed.is_empty());
        assert_eq!(df.width(), 1);
    }
}
