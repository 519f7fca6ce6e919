//! Count summaries handed to chart rendering.
//!
//! Charts only draw what they are given; every filter and count they need
//! is computed here.

use crate::error::Result;
use crate::types::columns;
use crate::utils::string_column;
use polars::prelude::DataFrame;
use std::collections::HashMap;

/// Placeholder product name used for redacted submissions.
pub const REDACTED_PRODUCT: &str = "EXEMPTION 4";

/// Outcomes most analyses focus on.
pub const SERIOUS_OUTCOMES: [&str; 5] = [
    "Death",
    "Life Threatening",
    "Hospitalization",
    "Disability",
    "Patient Visited ER",
];

/// Which exploded rows to count per brand.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrandCountQuery {
    /// Only rows with exactly this category.
    pub category: String,
    /// Only rows whose outcome is one of these. Empty means all outcomes.
    pub outcomes: Vec<String>,
    /// Maximum number of brands returned.
    pub limit: usize,
}

impl BrandCountQuery {
    /// Top ten brands of a category across the serious outcomes.
    pub fn serious(category: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            outcomes: SERIOUS_OUTCOMES.iter().map(|o| (*o).to_string()).collect(),
            limit: 10,
        }
    }
}

/// Count outcome rows per brand in an exploded table.
///
/// Redacted products and rows without a brand are skipped. Sorted by count
/// descending, then brand ascending, and truncated to `query.limit`.
pub fn brand_report_counts(exploded: &DataFrame, query: &BrandCountQuery) -> Result<Vec<(String, usize)>> {
    let brands = string_column(exploded, columns::BRAND)?;
    let categories = string_column(exploded, columns::CATEGORY)?;
    let products = string_column(exploded, columns::PRODUCT)?;
    let outcomes = string_column(exploded, columns::OUTCOMES)?;

    let mut counts: HashMap<&str, usize> = HashMap::new();
    for (((brand, category), product), outcome) in brands
        .into_iter()
        .zip(categories.into_iter())
        .zip(products.into_iter())
        .zip(outcomes.into_iter())
    {
        let Some(brand) = brand.filter(|b| !b.is_empty()) else {
            continue;
        };
        if category != Some(query.category.as_str()) || product == Some(REDACTED_PRODUCT) {
            continue;
        }
        let outcome_matches = query.outcomes.is_empty()
            || outcome.is_some_and(|o| query.outcomes.iter().any(|q| q == o));
        if outcome_matches {
            *counts.entry(brand).or_insert(0) += 1;
        }
    }

    let mut counts: Vec<(String, usize)> = counts
        .into_iter()
        .map(|(brand, count)| (brand.to_string(), count))
        .collect();
    counts.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    counts.truncate(query.limit);
    Ok(counts)
}
