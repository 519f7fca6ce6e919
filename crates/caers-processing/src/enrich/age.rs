//! Patient age normalization to a single unit (years).
//!
//! Ages arrive as a raw number plus a unit tag. Each row is converted with
//! [`age_in_years`], which returns a typed [`AgeIssue`] instead of a
//! fabricated value when the pair cannot be converted. Issues are collected
//! into a side list and resolved by [`AgeIssuePolicy`].

use crate::config::AgeIssuePolicy;
use crate::error::Result;
use crate::types::{RowIssue, RowIssueKind, columns};
use crate::utils::{round_to, string_column};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};

/// Value written to `patient_age_years` under [`AgeIssuePolicy::Sentinel`].
pub const AGE_SENTINEL: f64 = -1.0;

/// Unit tag every row carries after normalization.
pub const CANONICAL_AGE_UNIT: &str = AgeUnit::Year.tag();

/// Decimal places multipliers are rounded to before multiplying.
const FACTOR_DECIMALS: i32 = 4;

/// Units ages are recorded in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AgeUnit {
    Day,
    Week,
    Month,
    Year,
    Decade,
}

impl AgeUnit {
    /// Parse a unit tag such as `month(s)` or `Decade(s)`, ignoring case and
    /// surrounding whitespace.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag.trim().to_lowercase().as_str() {
            "day(s)" => Some(Self::Day),
            "week(s)" => Some(Self::Week),
            "month(s)" => Some(Self::Month),
            "year(s)" => Some(Self::Year),
            "decade(s)" => Some(Self::Decade),
            _ => None,
        }
    }

    /// The tag as it appears in source exports.
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Day => "day(s)",
            Self::Week => "week(s)",
            Self::Month => "month(s)",
            Self::Year => "year(s)",
            Self::Decade => "Decade(s)",
        }
    }

    /// Years per unit, rounded to four decimals (a month is 0.0833 years).
    pub fn years_per_unit(&self) -> f64 {
        let exact = match self {
            Self::Day => 1.0 / 365.0,
            Self::Week => 1.0 / 52.0,
            Self::Month => 1.0 / 12.0,
            Self::Year => 1.0,
            Self::Decade => 10.0,
        };
        round_to(exact, FACTOR_DECIMALS)
    }
}

/// Why an age could not be converted.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum AgeIssue {
    #[error("age '{0}' is not a number")]
    InvalidAge(String),

    #[error("age recorded without a unit")]
    MissingUnit,

    #[error("unknown age unit '{0}'")]
    UnknownUnit(String),
}

impl AgeIssue {
    pub fn kind(&self) -> RowIssueKind {
        match self {
            Self::InvalidAge(_) => RowIssueKind::InvalidAge,
            Self::MissingUnit => RowIssueKind::MissingAgeUnit,
            Self::UnknownUnit(_) => RowIssueKind::UnknownAgeUnit,
        }
    }

    fn column(&self) -> &'static str {
        match self {
            Self::InvalidAge(_) => columns::PATIENT_AGE,
            Self::MissingUnit | Self::UnknownUnit(_) => columns::AGE_UNITS,
        }
    }

    fn raw_value(&self) -> Option<String> {
        match self {
            Self::InvalidAge(raw) | Self::UnknownUnit(raw) => Some(raw.clone()),
            Self::MissingUnit => None,
        }
    }
}

/// Convert one raw `(patient_age, age_units)` pair to years.
///
/// An absent age is not an error and yields `Ok(None)`, whatever the unit.
pub fn age_in_years(age: Option<&str>, unit: Option<&str>) -> std::result::Result<Option<f64>, AgeIssue> {
    let age = match age.map(str::trim) {
        None | Some("") => return Ok(None),
        Some(raw) => raw,
    };

    let value = age
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| AgeIssue::InvalidAge(age.to_string()))?;

    let unit = match unit.map(str::trim) {
        None | Some("") => return Err(AgeIssue::MissingUnit),
        Some(raw) => AgeUnit::parse(raw).ok_or_else(|| AgeIssue::UnknownUnit(raw.to_string()))?,
    };

    Ok(Some(value * unit.years_per_unit()))
}

/// Output of [`AgeNormalizer::normalize`].
#[derive(Debug, Clone)]
pub struct AgeNormalization {
    /// Every input row. Ages that could not be converted are null, or the
    /// sentinel under [`AgeIssuePolicy::Sentinel`].
    pub all_rows: DataFrame,
    /// Rows of the age table under the policy. Equal to `all_rows` unless
    /// the policy is [`AgeIssuePolicy::Exclude`].
    pub table: DataFrame,
    /// Per-row issues found, in input order.
    pub issues: Vec<RowIssue>,
}

/// Table-level age normalization.
#[derive(Debug, Clone, Copy, Default)]
pub struct AgeNormalizer {
    policy: AgeIssuePolicy,
}

impl AgeNormalizer {
    pub fn new(policy: AgeIssuePolicy) -> Self {
        Self { policy }
    }

    /// Replace `patient_age` with `patient_age_years` and rewrite every
    /// `age_units` to `year(s)`.
    ///
    /// The policy only decides which rows enter the age table; `all_rows`
    /// always keeps every row so later stages see each report.
    pub fn normalize(&self, df: &DataFrame) -> Result<AgeNormalization> {
        let ages = string_column(df, columns::PATIENT_AGE)?;
        let units = string_column(df, columns::AGE_UNITS)?;
        let report_ids = string_column(df, columns::REPORT_ID)?;

        let mut years: Vec<Option<f64>> = Vec::with_capacity(df.height());
        let mut keep: Vec<bool> = Vec::with_capacity(df.height());
        let mut issues = Vec::new();

        for (row, ((age, unit), report_id)) in ages
            .into_iter()
            .zip(units.into_iter())
            .zip(report_ids.into_iter())
            .enumerate()
        {
            match age_in_years(age, unit) {
                Ok(value) => {
                    years.push(value);
                    keep.push(true);
                }
                Err(issue) => {
                    issues.push(RowIssue::new(
                        report_id.map(str::to_string),
                        row,
                        issue.column(),
                        issue.kind(),
                        issue.raw_value(),
                        issue.to_string(),
                    ));
                    match self.policy {
                        AgeIssuePolicy::Exclude => {
                            years.push(None);
                            keep.push(false);
                        }
                        AgeIssuePolicy::Sentinel => {
                            years.push(Some(AGE_SENTINEL));
                            keep.push(true);
                        }
                    }
                }
            }
        }

        if !issues.is_empty() {
            warn!(
                "{} rows have ages that cannot be converted ({:?} policy)",
                issues.len(),
                self.policy
            );
        }

        let mut all_rows = df.clone();
        let position = all_rows
            .get_column_index(columns::PATIENT_AGE)
            .unwrap_or(all_rows.width());
        all_rows.drop_in_place(columns::PATIENT_AGE)?;
        all_rows.insert_column(
            position,
            Series::new(columns::PATIENT_AGE_YEARS.into(), years),
        )?;
        all_rows.replace(
            columns::AGE_UNITS,
            Series::new(
                columns::AGE_UNITS.into(),
                vec![CANONICAL_AGE_UNIT; all_rows.height()],
            ),
        )?;

        let table = if keep.iter().all(|k| *k) {
            all_rows.clone()
        } else {
            let mask = BooleanChunked::new("keep".into(), &keep);
            all_rows.filter(&mask)?
        };

        info!(
            "Normalized ages to {} ({} of {} rows in the age table)",
            CANONICAL_AGE_UNIT,
            table.height(),
            all_rows.height()
        );

        Ok(AgeNormalization {
            all_rows,
            table,
            issues,
        })
    }
}
