//! Configuration types for the CAERS processing pipeline.
//!
//! This module provides configuration options using the builder pattern.
//! Every policy that used to be an implicit default (brand trim length,
//! stopword list, how bad ages and empty outcomes are handled) is an explicit
//! field here, so callers and tests can swap it.

use crate::enrich::stopwords::english_stopwords;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::PathBuf;

/// What to do with a row whose age cannot be converted to years.
///
/// The issue is recorded in the rejected-row list under both policies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum AgeIssuePolicy {
    /// Drop the row from the age-normalized table
    #[default]
    Exclude,
    /// Keep the row with `patient_age_years = -1.0`
    Sentinel,
}

/// What to do with a report whose multi-valued field has no usable value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum EmptyValuePolicy {
    /// The report produces no exploded rows
    #[default]
    Drop,
    /// The report produces one row with a null value
    NullRow,
}

/// File format of the persisted tables.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    #[default]
    Csv,
    Parquet,
}

impl OutputFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Csv => "csv",
            Self::Parquet => "parquet",
        }
    }
}

/// Brand extraction policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrandConfig {
    /// Number of leading tokens kept for multi-token categories.
    /// Default: 2
    pub trim_len: usize,

    /// Lower-case words removed before picking the brand.
    /// Default: the NLTK English stopword list
    pub stopwords: BTreeSet<String>,

    /// Categories whose brand is a multi-word descriptor rather than a
    /// single proper noun. Compared exactly.
    pub multi_token_categories: Vec<String>,
}

impl Default for BrandConfig {
    fn default() -> Self {
        Self {
            trim_len: 2,
            stopwords: english_stopwords(),
            multi_token_categories: vec![
                "Nuts/Edible Seed".to_string(),
                "Vit/Min/Prot/Unconv Diet(Human/Animal)".to_string(),
            ],
        }
    }
}

impl BrandConfig {
    pub fn is_stopword(&self, lowercase_token: &str) -> bool {
        self.stopwords.contains(lowercase_token)
    }

    pub fn is_multi_token_category(&self, category: &str) -> bool {
        self.multi_token_categories.iter().any(|c| c == category)
    }
}

/// Base names (without extension) of the files a run writes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputNames {
    pub clean: String,
    pub brand: String,
    pub processed: String,
    pub exploded: String,
    pub rejected: String,
    pub symptom_counts: String,
    pub report: String,
}

impl Default for OutputNames {
    fn default() -> Self {
        Self {
            clean: "clean_data".to_string(),
            brand: "brand_data".to_string(),
            processed: "processed_data".to_string(),
            exploded: "exploded_data".to_string(),
            rejected: "rejected_rows".to_string(),
            symptom_counts: "symptom_counts".to_string(),
            report: "run_report".to_string(),
        }
    }
}

impl OutputNames {
    fn all(&self) -> [&str; 7] {
        [
            &self.clean,
            &self.brand,
            &self.processed,
            &self.exploded,
            &self.rejected,
            &self.symptom_counts,
            &self.report,
        ]
    }
}

/// Configuration for the processing pipeline.
///
/// Use [`PipelineConfig::builder()`] to create a new configuration
/// with fluent API.
///
/// # Example
///
/// ```rust,ignore
/// use caers_processing::config::{AgeIssuePolicy, PipelineConfig};
///
/// let config = PipelineConfig::builder()
///     .output_dir("data/processed")
///     .age_issue_policy(AgeIssuePolicy::Sentinel)
///     .build()?;
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory the derived tables are written to.
    /// Default: "data/processed"
    pub output_dir: PathBuf,

    /// Extension (without dot) of the source files to ingest.
    /// Default: "csv"
    pub input_extension: String,

    /// Format of the four derived tables.
    /// Default: Csv
    pub output_format: OutputFormat,

    /// Base names of the written files.
    pub output_names: OutputNames,

    /// Whether to write outputs at all. When false, results stay in memory.
    /// Default: true
    pub save_to_disk: bool,

    /// Brand extraction policy.
    pub brand: BrandConfig,

    /// Handling of rows whose age cannot be converted.
    /// Default: Exclude
    pub age_issue_policy: AgeIssuePolicy,

    /// Handling of reports without any outcome.
    /// Default: Drop
    pub empty_outcome_policy: EmptyValuePolicy,

    /// Whether to compute and write symptom term frequencies.
    /// Default: true
    pub emit_symptom_counts: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("data/processed"),
            input_extension: "csv".to_string(),
            output_format: OutputFormat::default(),
            output_names: OutputNames::default(),
            save_to_disk: true,
            brand: BrandConfig::default(),
            age_issue_policy: AgeIssuePolicy::default(),
            empty_outcome_policy: EmptyValuePolicy::default(),
            emit_symptom_counts: true,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder.
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::default()
    }

    /// Validate the configuration and return errors if invalid.
    pub fn validate(&self) -> Result<(), ConfigValidationError> {
        if self.brand.trim_len == 0 {
            return Err(ConfigValidationError::InvalidTrimLength(self.brand.trim_len));
        }

        let extension = self.input_extension.trim_start_matches('.');
        if extension.is_empty() {
            return Err(ConfigValidationError::EmptyField("input_extension".to_string()));
        }

        let names = self.output_names.all();
        if names.iter().any(|name| name.trim().is_empty()) {
            return Err(ConfigValidationError::EmptyField("output_names".to_string()));
        }
        let unique: BTreeSet<&str> = names.iter().copied().collect();
        if unique.len() != names.len() {
            return Err(ConfigValidationError::DuplicateOutputName);
        }

        Ok(())
    }
}

/// Errors that can occur during configuration validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigValidationError {
    #[error("Invalid brand trim length: {0} (must be at least 1)")]
    InvalidTrimLength(usize),

    #[error("Configuration field '{0}' must not be empty")]
    EmptyField(String),

    #[error("Output file names must be distinct")]
    DuplicateOutputName,
}

/// Builder for [`PipelineConfig`] with fluent API.
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    output_dir: Option<PathBuf>,
    input_extension: Option<String>,
    output_format: Option<OutputFormat>,
    output_names: Option<OutputNames>,
    save_to_disk: Option<bool>,
    brand: Option<BrandConfig>,
    brand_trim_len: Option<usize>,
    age_issue_policy: Option<AgeIssuePolicy>,
    empty_outcome_policy: Option<EmptyValuePolicy>,
    emit_symptom_counts: Option<bool>,
}

impl PipelineConfigBuilder {
    /// Set the directory derived tables are written to.
    pub fn output_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_dir = Some(path.into());
        self
    }

    /// Set the extension of source files (e.g. "csv" or "txt").
    pub fn input_extension(mut self, extension: impl Into<String>) -> Self {
        self.input_extension = Some(extension.into());
        self
    }

    /// Set the format of the derived tables.
    pub fn output_format(mut self, format: OutputFormat) -> Self {
        self.output_format = Some(format);
        self
    }

    /// Override the base names of written files.
    pub fn output_names(mut self, names: OutputNames) -> Self {
        self.output_names = Some(names);
        self
    }

    /// Enable or disable writing outputs to disk.
    pub fn save_to_disk(mut self, save: bool) -> Self {
        self.save_to_disk = Some(save);
        self
    }

    /// Replace the whole brand extraction policy.
    pub fn brand(mut self, brand: BrandConfig) -> Self {
        self.brand = Some(brand);
        self
    }

    /// Set only the brand trim length, keeping the other brand defaults.
    ///
    /// Takes precedence over the trim length of a config passed to [`brand`](Self::brand).
    pub fn brand_trim_len(mut self, trim_len: usize) -> Self {
        self.brand_trim_len = Some(trim_len);
        self
    }

    /// Set the policy for rows whose age cannot be converted.
    pub fn age_issue_policy(mut self, policy: AgeIssuePolicy) -> Self {
        self.age_issue_policy = Some(policy);
        self
    }

    /// Set the policy for reports without outcomes.
    pub fn empty_outcome_policy(mut self, policy: EmptyValuePolicy) -> Self {
        self.empty_outcome_policy = Some(policy);
        self
    }

    /// Enable or disable symptom frequency output.
    pub fn emit_symptom_counts(mut self, emit: bool) -> Self {
        self.emit_symptom_counts = Some(emit);
        self
    }

    /// Build the configuration.
    ///
    /// Returns a validated `PipelineConfig` or an error if validation fails.
    pub fn build(self) -> Result<PipelineConfig, ConfigValidationError> {
        let mut brand = self.brand.unwrap_or_default();
        if let Some(trim_len) = self.brand_trim_len {
            brand.trim_len = trim_len;
        }

        let config = PipelineConfig {
            output_dir: self
                .output_dir
                .unwrap_or_else(|| PathBuf::from("data/processed")),
            input_extension: self.input_extension.unwrap_or_else(|| "csv".to_string()),
            output_format: self.output_format.unwrap_or_default(),
            output_names: self.output_names.unwrap_or_default(),
            save_to_disk: self.save_to_disk.unwrap_or(true),
            brand,
            age_issue_policy: self.age_issue_policy.unwrap_or_default(),
            empty_outcome_policy: self.empty_outcome_policy.unwrap_or_default(),
            emit_symptom_counts: self.emit_symptom_counts.unwrap_or(true),
        };

        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert_eq!(config.output_dir, PathBuf::from("data/processed"));
        assert_eq!(config.input_extension, "csv");
        assert_eq!(config.brand.trim_len, 2);
        assert_eq!(config.age_issue_policy, AgeIssuePolicy::Exclude);
        assert_eq!(config.empty_outcome_policy, EmptyValuePolicy::Drop);
        assert!(config.save_to_disk);
    }

    #[test]
    fn test_builder_custom_values() {
        let config = PipelineConfig::builder()
            .output_dir("out")
            .output_format(OutputFormat::Parquet)
            .brand_trim_len(3)
            .age_issue_policy(AgeIssuePolicy::Sentinel)
            .empty_outcome_policy(EmptyValuePolicy::NullRow)
            .save_to_disk(false)
            .build()
            .unwrap();

        assert_eq!(config.output_dir, PathBuf::from("out"));
        assert_eq!(config.output_format.extension(), "parquet");
        assert_eq!(config.brand.trim_len, 3);
        assert!(config.brand.is_stopword("the"));
        assert_eq!(config.age_issue_policy, AgeIssuePolicy::Sentinel);
        assert_eq!(config.empty_outcome_policy, EmptyValuePolicy::NullRow);
        assert!(!config.save_to_disk);
    }

    #[test]
    fn test_validation_zero_trim_len() {
        let result = PipelineConfig::builder().brand_trim_len(0).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::InvalidTrimLength(0)
        ));
    }

    #[test]
    fn test_validation_duplicate_output_names() {
        let names = OutputNames {
            brand: "clean_data".to_string(),
            ..OutputNames::default()
        };
        let result = PipelineConfig::builder().output_names(names).build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::DuplicateOutputName
        ));
    }

    #[test]
    fn test_validation_empty_extension() {
        let result = PipelineConfig::builder().input_extension(".").build();
        assert!(matches!(
            result.unwrap_err(),
            ConfigValidationError::EmptyField(_)
        ));
    }

    #[test]
    fn test_multi_token_category_is_exact() {
        let brand = BrandConfig::default();
        assert!(brand.is_multi_token_category("Nuts/Edible Seed"));
        assert!(!brand.is_multi_token_category("nuts/edible seed"));
    }

    #[test]
    fn test_pipeline_config_from_json() {
        let json = r#"{
            "output_dir": "processed",
            "input_extension": "csv",
            "output_format": "csv",
            "output_names": {
                "clean": "c", "brand": "b", "processed": "p", "exploded": "e",
                "rejected": "r", "symptom_counts": "s", "report": "report"
            },
            "save_to_disk": false,
            "brand": {
                "trim_len": 1,
                "stopwords": ["the", "of"],
                "multi_token_categories": ["Cosmetics"]
            },
            "age_issue_policy": "sentinel",
            "empty_outcome_policy": "null_row",
            "emit_symptom_counts": false
        }"#;

        let config: PipelineConfig =
            serde_json::from_str(json).expect("Should deserialize from JSON");

        assert_eq!(config.output_names.exploded, "e");
        assert_eq!(config.brand.trim_len, 1);
        assert_eq!(config.brand.stopwords.len(), 2);
        assert!(config.brand.is_multi_token_category("Cosmetics"));
        assert_eq!(config.age_issue_policy, AgeIssuePolicy::Sentinel);
        assert!(!config.emit_symptom_counts);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config: PipelineConfig =
            serde_json::from_str(r#"{"output_format": "parquet"}"#).unwrap();

        assert_eq!(config.output_format, OutputFormat::Parquet);
        assert_eq!(config.brand.trim_len, 2);
        assert!(config.brand.is_stopword("the"));
        assert_eq!(config.output_names, OutputNames::default());
    }
}
