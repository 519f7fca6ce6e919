//! CAERS Report Processing Library
//!
//! Turns the FDA CFSAN Adverse Event Reporting System (CAERS) exports into a
//! set of analysis-ready tables, built with Rust and Polars.
//!
//! # Overview
//!
//! Processing runs in four stages, each a function from one table to a new
//! table:
//!
//! - **Schema Unification**: Reads every export, normalizes column names
//!   across vintages and concatenates them by name
//! - **Brand Extraction**: Derives a brand from each product description
//! - **Age Normalization**: Converts patient ages to years; rows that cannot
//!   be converted are collected as [`RowIssue`]s instead of aborting the run
//! - **Outcome Explosion**: One row per (report, outcome) pair
//!
//! All tables are persisted together once every stage succeeded, along with
//! the rejected rows, symptom term counts and a JSON [`RunReport`].
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use caers_processing::{AgeIssuePolicy, Pipeline, PipelineConfig};
//!
//! let config = PipelineConfig::builder()
//!     .output_dir("data/processed")
//!     .age_issue_policy(AgeIssuePolicy::Exclude)
//!     .build()?;
//!
//! let result = Pipeline::builder()
//!     .config(config)
//!     .on_progress(|update| {
//!         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
//!     })
//!     .build()?
//!     .run("data/raw".as_ref())?;
//!
//! println!("{} outcome rows", result.exploded.height());
//! println!("{} rejected rows", result.rejected_rows.len());
//! ```
//!
//! # Using the stages directly
//!
//! Every stage is usable on its own:
//!
//! ```rust,ignore
//! use caers_processing::{BrandConfig, extract_brand, age_in_years};
//!
//! let brand = extract_brand("Great Value Almonds", "Nuts/Edible Seed", &BrandConfig::default());
//! assert_eq!(brand, "GREAT VALUE");
//!
//! assert_eq!(age_in_years(Some("2"), Some("decade(s)")), Ok(Some(20.0)));
//! ```

pub mod config;
pub mod enrich;
pub mod error;
pub mod exploder;
pub mod pipeline;
pub mod reporting;
pub mod types;
pub mod unifier;
pub mod utils;

// Re-exports for convenient access
pub use config::{
    AgeIssuePolicy, BrandConfig, ConfigValidationError, EmptyValuePolicy, OutputFormat,
    OutputNames, PipelineConfig, PipelineConfigBuilder,
};
pub use enrich::{
    AGE_SENTINEL, AgeIssue, AgeNormalization, AgeNormalizer, AgeUnit, BrandExtractor,
    CANONICAL_AGE_UNIT, age_in_years, brand_tokens, extract_brand,
};
pub use error::{ProcessingError, Result as ProcessingResult, ResultExt};
pub use exploder::{OutcomeExploder, explode_column, split_multi_value, term_frequencies};
pub use pipeline::{
    ClosureProgressReporter, Pipeline, PipelineBuilder, PipelineStage, ProgressReporter,
    ProgressUpdate,
};
pub use reporting::{BrandCountQuery, ReportGenerator, brand_report_counts};
pub use types::{PipelineResult, RowIssue, RowIssueKind, RunReport, TableShape};
pub use unifier::{SchemaUnifier, SourceTable, UnifiedTable};
