//! Main processing pipeline module.
//!
//! This module provides the core `Pipeline` struct and builder for
//! sequencing the stages and persisting their outputs.

use crate::config::PipelineConfig;
use crate::enrich::{AgeNormalizer, BrandExtractor};
use crate::error::{ProcessingError, Result, ResultExt};
use crate::exploder::{OutcomeExploder, term_frequencies};
use crate::pipeline::progress::{
    ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate,
};
use crate::reporting::ReportGenerator;
use crate::types::{PipelineResult, RunReport, TableShape, columns};
use crate::unifier::{SchemaUnifier, SourceTable, UnifiedTable, discover_input_files};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, error, info};

/// The CAERS processing pipeline.
///
/// Each stage is a function from one table to a new table; the pipeline
/// holds configuration only, so a single instance can process any number
/// of inputs.
///
/// # Example
///
/// ```rust,ignore
/// use caers_processing::{Pipeline, PipelineConfig};
///
/// let result = Pipeline::builder()
///     .config(PipelineConfig::builder().output_dir("data/processed").build()?)
///     .on_progress(|update| {
///         println!("[{:.0}%] {}", update.progress * 100.0, update.message);
///     })
///     .build()?
///     .run("data/raw".as_ref())?;
///
/// println!("{} outcome rows", result.exploded.height());
/// ```
pub struct Pipeline {
    config: PipelineConfig,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
    unifier: SchemaUnifier,
    brand_extractor: BrandExtractor,
    age_normalizer: AgeNormalizer,
    exploder: OutcomeExploder,
    reporter: ReportGenerator,
}

// A host may run the pipeline on a worker thread.
static_assertions::assert_impl_all!(Pipeline: Send, Sync);

impl Pipeline {
    /// Create a new pipeline builder.
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::default()
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Ingest every matching file in `input_dir` and run all stages.
    ///
    /// Outputs are written only after every stage succeeded, and only when
    /// `save_to_disk` is set.
    pub fn run(&self, input_dir: &Path) -> Result<PipelineResult> {
        self.finish(self.run_internal(input_dir))
    }

    /// Run all stages over tables that are already in memory.
    pub fn process(&self, sources: Vec<SourceTable>) -> Result<PipelineResult> {
        self.finish(self.process_internal(sources))
    }

    fn finish(&self, outcome: Result<PipelineResult>) -> Result<PipelineResult> {
        match outcome {
            Ok(result) => {
                self.report_progress(ProgressUpdate::complete("Pipeline completed successfully"));
                Ok(result)
            }
            Err(e) => {
                self.report_progress(ProgressUpdate::failed(e.to_string()));
                error!("Pipeline error: {}", e);
                Err(e)
            }
        }
    }

    /// Report progress if a reporter is configured.
    fn report_progress(&self, update: ProgressUpdate) {
        if let Some(reporter) = &self.progress_reporter {
            reporter.report(update);
        }
    }

    fn run_internal(&self, input_dir: &Path) -> Result<PipelineResult> {
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Loading,
            0.0,
            format!("Scanning {}", input_dir.display()),
        ));
        info!("Step 1: Loading source files from {}", input_dir.display());

        let files = discover_input_files(input_dir, &self.config.input_extension)?;
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Unifying,
            0.0,
            format!("Unifying {} files", files.len()),
        ));
        let unified = self.unifier.unify_files(&files)?;

        self.transform_and_persist(unified)
    }

    fn process_internal(&self, sources: Vec<SourceTable>) -> Result<PipelineResult> {
        self.report_progress(ProgressUpdate::new(
            PipelineStage::Unifying,
            0.0,
            format!("Unifying {} tables", sources.len()),
        ));
        info!("Step 1: Unifying {} in-memory tables", sources.len());

        if sources.is_empty() {
            return Err(ProcessingError::InvalidConfig(
                "at least one source table is required".to_string(),
            ));
        }
        let unified = self.unifier.unify(sources)?;

        self.transform_and_persist(unified)
    }

    fn transform_and_persist(&self, unified: UnifiedTable) -> Result<PipelineResult> {
        let start_time = Instant::now();
        let mut result = self.transform(unified)?;

        if self.config.save_to_disk {
            self.report_progress(ProgressUpdate::new(
                PipelineStage::Writing,
                0.0,
                "Writing derived tables...",
            ));
            info!(
                "Step 5: Writing outputs to {}",
                self.reporter.output_dir().display()
            );
            self.reporter
                .write_all(&mut result)
                .context("While writing outputs")?;
        } else {
            debug!("Skipping output files (save_to_disk disabled)");
        }

        info!(
            "Processed {} reports into {} outcome rows in {:?}",
            result.report.unified.rows,
            result.report.exploded.rows,
            start_time.elapsed()
        );
        Ok(result)
    }

    /// Run brand, age and outcome stages over a unified table.
    ///
    /// The age policy only shapes the age table; outcomes and symptom terms
    /// are taken from every brand-enriched row.
    fn transform(&self, unified: UnifiedTable) -> Result<PipelineResult> {
        self.report_progress(ProgressUpdate::new(
            PipelineStage::BrandExtraction,
            0.0,
            "Deriving brand names...",
        ));
        info!("Step 2: Deriving brand names from product descriptions");
        let (brand_enriched, source_rows) = self
            .brand_extractor
            .enrich(&unified.frame)
            .context("During brand extraction")?;
        let rows_without_product = unified.frame.height() - brand_enriched.height();

        self.report_progress(ProgressUpdate::new(
            PipelineStage::AgeNormalization,
            0.0,
            "Converting ages to years...",
        ));
        info!("Step 3: Converting patient ages to a common unit");
        let ages = self
            .age_normalizer
            .normalize(&brand_enriched)
            .context("During age normalization")?;

        let mut rejected_rows = unified.date_issues.clone();
        rejected_rows.extend(ages.issues.into_iter().map(|issue| {
            let location = source_rows
                .get(issue.row)
                .and_then(|row| unified.source_of(*row));
            issue.at_source(location)
        }));

        self.report_progress(ProgressUpdate::new(
            PipelineStage::OutcomeExplosion,
            0.0,
            "Exploding outcomes...",
        ));
        info!("Step 4: Exploding outcomes into one row each");
        let (exploded, reports_without_outcomes) = self
            .exploder
            .explode(&ages.all_rows)
            .context("During outcome explosion")?;

        let symptom_counts = if self.config.emit_symptom_counts
            && ages
                .all_rows
                .get_column_index(columns::MEDRA_PREFERRED_TERMS)
                .is_some()
        {
            term_frequencies(&ages.all_rows, columns::MEDRA_PREFERRED_TERMS)?
        } else {
            debug!("Skipping symptom counts");
            Vec::new()
        };

        let age_normalized = ages.table;
        let UnifiedTable {
            frame: unified,
            files,
            rows_per_file,
            date_issues,
        } = unified;

        let report = RunReport {
            input_files: files,
            rows_per_file,
            unified: TableShape::of(&unified),
            brand_enriched: TableShape::of(&brand_enriched),
            age_normalized: TableShape::of(&age_normalized),
            exploded: TableShape::of(&exploded),
            rows_without_product,
            unparsed_dates: date_issues.len(),
            reports_without_outcomes,
            issue_counts: RunReport::count_issues(&rejected_rows),
            outputs: Vec::new(),
        };

        Ok(PipelineResult {
            unified,
            brand_enriched,
            age_normalized,
            exploded,
            rejected_rows,
            symptom_counts,
            report,
        })
    }
}

/// Builder for creating a [`Pipeline`] instance.
///
/// Use [`Pipeline::builder()`] to get started.
#[derive(Default)]
pub struct PipelineBuilder {
    config: Option<PipelineConfig>,
    progress_reporter: Option<Arc<dyn ProgressReporter>>,
}

impl PipelineBuilder {
    /// Set the pipeline configuration.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Set a progress reporter for receiving updates during processing.
    pub fn progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.progress_reporter = Some(reporter);
        self
    }

    /// Set a progress callback closure.
    ///
    /// This is a convenience method for simple progress handling.
    /// For more complex scenarios, use [`progress_reporter`](Self::progress_reporter).
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(ProgressUpdate) + Send + Sync + 'static,
    {
        self.progress_reporter = Some(Arc::new(ClosureProgressReporter::new(callback)));
        self
    }

    /// Build the pipeline.
    ///
    /// Returns an error if the configuration is invalid.
    pub fn build(self) -> std::result::Result<Pipeline, crate::config::ConfigValidationError> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let reporter = ReportGenerator::new(
            config.output_dir.clone(),
            config.output_format,
            config.output_names.clone(),
        );

        Ok(Pipeline {
            unifier: SchemaUnifier,
            brand_extractor: BrandExtractor::new(config.brand.clone()),
            age_normalizer: AgeNormalizer::new(config.age_issue_policy),
            exploder: OutcomeExploder::new(config.empty_outcome_policy),
            reporter,
            progress_reporter: self.progress_reporter,
            config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{AgeIssuePolicy, EmptyValuePolicy};
    use polars::prelude::*;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn in_memory_config() -> PipelineConfig {
        PipelineConfig::builder().save_to_disk(false).build().unwrap()
    }

    fn source() -> SourceTable {
        SourceTable {
            path: PathBuf::from("raw/reports.csv"),
            frame: df![
                "Report ID" => ["1", "2", "3"],
                "Product" => [Some("Great Value Almonds!!"), None, Some("The Quorn Burger")],
                "Description" => ["Nuts/Edible Seed", "Cosmetics", "Cosmetics"],
                "Patient Age" => [Some("24"), Some("50"), Some("9")],
                "Age Units" => [Some("month(s)"), Some("year(s)"), Some("hour(s)")],
                "Outcomes" => ["Death, Hospitalization, ", "Other Outcome", "Visited ER"],
                "MedDRA Preferred Terms" => ["CHOKING, NAUSEA", "RASH", "NAUSEA"],
            ]
            .unwrap(),
        }
    }

    #[test]
    fn test_pipeline_builder_default() {
        let pipeline = Pipeline::builder().build().unwrap();
        assert!(pipeline.progress_reporter.is_none());
        assert_eq!(pipeline.config().brand.trim_len, 2);
    }

    #[test]
    fn test_pipeline_builder_rejects_invalid_config() {
        let config = PipelineConfig {
            brand: crate::config::BrandConfig {
                trim_len: 0,
                ..Default::default()
            },
            ..PipelineConfig::default()
        };
        assert!(Pipeline::builder().config(config).build().is_err());
    }

    #[test]
    fn test_process_in_memory() {
        let pipeline = Pipeline::builder().config(in_memory_config()).build().unwrap();
        let result = pipeline.process(vec![source()]).unwrap();

        assert_eq!(result.report.unified.rows, 3);
        assert_eq!(result.report.rows_without_product, 1);
        assert_eq!(result.brand_enriched.height(), 2);
        // Report 3 has an unknown unit and is excluded by default.
        assert_eq!(result.age_normalized.height(), 1);
        assert_eq!(result.rejected_rows.len(), 1);
        assert_eq!(result.rejected_rows[0].report_id.as_deref(), Some("3"));
        assert_eq!(result.rejected_rows[0].source_file.as_deref(), Some("reports.csv"));
        assert_eq!(result.rejected_rows[0].source_row, Some(2));
        // Its outcome and symptoms still count.
        assert_eq!(result.exploded.height(), 3);
        assert_eq!(
            result.symptom_counts,
            vec![("NAUSEA".to_string(), 2), ("CHOKING".to_string(), 1)]
        );
    }

    #[test]
    fn test_process_with_sentinel_and_null_rows() {
        let config = PipelineConfig::builder()
            .save_to_disk(false)
            .age_issue_policy(AgeIssuePolicy::Sentinel)
            .empty_outcome_policy(EmptyValuePolicy::NullRow)
            .build()
            .unwrap();
        let pipeline = Pipeline::builder().config(config).build().unwrap();
        let result = pipeline.process(vec![source()]).unwrap();

        assert_eq!(result.age_normalized.height(), 2);
        assert_eq!(result.exploded.height(), 3);
    }

    #[test]
    fn test_process_requires_sources() {
        let pipeline = Pipeline::builder().config(in_memory_config()).build().unwrap();
        let err = pipeline.process(Vec::new()).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_progress_callback_sees_every_stage() {
        let call_count = Arc::new(AtomicUsize::new(0));
        let call_count_clone = call_count.clone();

        let pipeline = Pipeline::builder()
            .config(in_memory_config())
            .on_progress(move |_update| {
                call_count_clone.fetch_add(1, Ordering::SeqCst);
            })
            .build()
            .unwrap();

        pipeline.process(vec![source()]).unwrap();

        // Unifying, brand, age, outcomes, complete.
        assert_eq!(call_count.load(Ordering::SeqCst), 5);
    }

    #[test]
    fn test_failure_is_reported() {
        let failed = Arc::new(AtomicUsize::new(0));
        let failed_clone = failed.clone();

        let pipeline = Pipeline::builder()
            .config(in_memory_config())
            .on_progress(move |update| {
                if update.stage == PipelineStage::Failed {
                    failed_clone.fetch_add(1, Ordering::SeqCst);
                }
            })
            .build()
            .unwrap();

        let source = SourceTable {
            path: PathBuf::from("raw/partial.csv"),
            frame: df!["report_id" => ["1"]].unwrap(),
        };
        assert!(pipeline.process(vec![source]).is_err());
        assert_eq!(failed.load(Ordering::SeqCst), 1);
    }
}
