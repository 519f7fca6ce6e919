//! Output module.
//!
//! This module persists the derived tables of a run and computes the count
//! summaries that chart rendering consumes.
//!
//! # Example
//!
//! ```rust,ignore
//! use caers_processing::reporting::{BrandCountQuery, brand_report_counts};
//!
//! let top = brand_report_counts(&result.exploded, &BrandCountQuery::serious("Nuts/Edible Seed"))?;
//! for (brand, events) in top {
//!     println!("{brand}: {events}");
//! }
//! ```

mod counts;
mod generator;

pub use counts::{
    BrandCountQuery, REDACTED_PRODUCT, SERIOUS_OUTCOMES, brand_report_counts,
};
pub use generator::{ReportGenerator, issues_frame};
