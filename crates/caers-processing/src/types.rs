use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Canonical column names of the unified report table.
pub mod columns {
    pub const REPORT_ID: &str = "report_id";
    pub const PRODUCT: &str = "product";
    pub const CATEGORY: &str = "category";
    pub const PATIENT_AGE: &str = "patient_age";
    pub const AGE_UNITS: &str = "age_units";
    pub const OUTCOMES: &str = "outcomes";
    pub const MEDRA_PREFERRED_TERMS: &str = "medra_preferred_terms";
    pub const CAERS_CREATED_DATE: &str = "caers_created_date";

    /// Added by the brand extractor.
    pub const BRAND: &str = "brand";
    /// Added by the age normalizer, replacing `patient_age`.
    pub const PATIENT_AGE_YEARS: &str = "patient_age_years";

    /// Columns every unified table must carry.
    pub const REQUIRED: [&str; 6] = [REPORT_ID, PRODUCT, CATEGORY, PATIENT_AGE, AGE_UNITS, OUTCOMES];
}

/// Kind of per-row data-quality problem.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowIssueKind {
    /// An age was recorded without a unit.
    MissingAgeUnit,
    /// The unit tag is not one of the known age units.
    UnknownAgeUnit,
    /// The age value is not a number.
    InvalidAge,
    /// A created date in none of the known formats; the raw text is kept
    /// here while the unified table holds null.
    InvalidDate,
}

impl RowIssueKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingAgeUnit => "missing_age_unit",
            Self::UnknownAgeUnit => "unknown_age_unit",
            Self::InvalidAge => "invalid_age",
            Self::InvalidDate => "invalid_date",
        }
    }
}

/// A single rejected or sentineled row, kept in a side list next to the
/// stage output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowIssue {
    /// Identifier of the offending report, when the row has one.
    pub report_id: Option<String>,
    /// Zero-based row index in the stage input.
    pub row: usize,
    /// Name of the export file the row was read from.
    pub source_file: Option<String>,
    /// Zero-based data row within `source_file`, header excluded.
    pub source_row: Option<usize>,
    /// Column that carried the bad value.
    pub column: String,
    pub kind: RowIssueKind,
    /// Raw value as found, for triage.
    pub raw_value: Option<String>,
    pub message: String,
}

impl RowIssue {
    /// An issue not yet located in its source file.
    pub fn new(
        report_id: Option<String>,
        row: usize,
        column: &str,
        kind: RowIssueKind,
        raw_value: Option<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            report_id,
            row,
            source_file: None,
            source_row: None,
            column: column.to_string(),
            kind,
            raw_value,
            message: message.into(),
        }
    }

    /// Attach the file and row the issue can be found at.
    pub fn at_source(mut self, location: Option<(String, usize)>) -> Self {
        if let Some((file, row)) = location {
            self.source_file = Some(file);
            self.source_row = Some(row);
        }
        self
    }
}

/// Row and column counts of one persisted table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct TableShape {
    pub rows: usize,
    pub columns: usize,
}

impl TableShape {
    pub fn of(df: &DataFrame) -> Self {
        Self {
            rows: df.height(),
            columns: df.width(),
        }
    }
}

/// Deterministic summary of one pipeline run, persisted as `run_report.json`.
///
/// Contains no wall-clock values so repeated runs over the same input
/// produce identical bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunReport {
    /// Source files in the order they were concatenated.
    pub input_files: Vec<PathBuf>,
    /// Rows read from each source file, parallel to `input_files`.
    pub rows_per_file: Vec<usize>,
    pub unified: TableShape,
    pub brand_enriched: TableShape,
    pub age_normalized: TableShape,
    pub exploded: TableShape,
    /// Rows dropped from the brand table because `product` was absent.
    pub rows_without_product: usize,
    /// Created-date values that could not be parsed and were nulled.
    pub unparsed_dates: usize,
    /// Reports with no usable outcome.
    pub reports_without_outcomes: usize,
    /// Count of per-row issues by kind.
    pub issue_counts: Vec<(RowIssueKind, usize)>,
    /// File names written by this run, relative to the output directory.
    pub outputs: Vec<String>,
}

impl RunReport {
    /// Tally issues by kind, keeping a stable kind order.
    pub fn count_issues(issues: &[RowIssue]) -> Vec<(RowIssueKind, usize)> {
        let kinds = [
            RowIssueKind::InvalidDate,
            RowIssueKind::MissingAgeUnit,
            RowIssueKind::UnknownAgeUnit,
            RowIssueKind::InvalidAge,
        ];
        kinds
            .into_iter()
            .map(|kind| (kind, issues.iter().filter(|i| i.kind == kind).count()))
            .filter(|(_, count)| *count > 0)
            .collect()
    }
}

/// Everything a run produced, in memory.
#[derive(Debug, Clone)]
pub struct PipelineResult {
    /// Unified, whitespace-stripped table.
    pub unified: DataFrame,
    /// Unified rows with a product, plus `brand`.
    pub brand_enriched: DataFrame,
    /// Brand table with ages converted to years.
    pub age_normalized: DataFrame,
    /// One row per (report, outcome).
    pub exploded: DataFrame,
    /// Per-row age issues, in input order.
    pub rejected_rows: Vec<RowIssue>,
    /// Symptom term frequencies over the age-normalized table.
    pub symptom_counts: Vec<(String, usize)>,
    pub report: RunReport,
}
