//! Progress reporting for the processing pipeline.
//!
//! The pipeline emits a [`ProgressUpdate`] at every stage boundary. Hosts
//! that show progress (a terminal spinner, a desktop UI) implement
//! [`ProgressReporter`] or pass a closure to
//! [`PipelineBuilder::on_progress`](crate::pipeline::PipelineBuilder::on_progress).
//!
//! # Example
//!
//! ```rust,ignore
//! use caers_processing::Pipeline;
//!
//! let result = Pipeline::builder()
//!     .on_progress(|update| {
//!         println!("[{:?}] {}", update.stage, update.message);
//!     })
//!     .build()?
//!     .run("data/raw".as_ref())?;
//! ```

use serde::{Deserialize, Serialize};

/// Stages of the processing pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    /// Locating and reading source files
    Loading,
    /// Normalizing column names and concatenating files
    Unifying,
    /// Deriving brands from product descriptions
    BrandExtraction,
    /// Converting patient ages to years
    AgeNormalization,
    /// Expanding outcomes into one row each
    OutcomeExplosion,
    /// Persisting derived tables
    Writing,
    /// Pipeline completed successfully
    Complete,
    /// Pipeline failed with an error
    Failed,
}

impl PipelineStage {
    /// Returns a human-readable name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::Loading => "Loading Files",
            Self::Unifying => "Unifying Schema",
            Self::BrandExtraction => "Extracting Brands",
            Self::AgeNormalization => "Normalizing Ages",
            Self::OutcomeExplosion => "Exploding Outcomes",
            Self::Writing => "Writing Outputs",
            Self::Complete => "Complete",
            Self::Failed => "Failed",
        }
    }

    /// Returns the typical weight of this stage in the overall pipeline (0.0 - 1.0).
    pub fn weight(&self) -> f32 {
        match self {
            Self::Loading => 0.25,
            Self::Unifying => 0.15,
            Self::BrandExtraction => 0.15,
            Self::AgeNormalization => 0.10,
            Self::OutcomeExplosion => 0.10,
            Self::Writing => 0.25,
            Self::Complete => 0.0,
            Self::Failed => 0.0,
        }
    }

    /// Returns the cumulative progress at the start of this stage.
    pub fn base_progress(&self) -> f32 {
        match self {
            Self::Loading => 0.0,
            Self::Unifying => 0.25,
            Self::BrandExtraction => 0.40,
            Self::AgeNormalization => 0.55,
            Self::OutcomeExplosion => 0.65,
            Self::Writing => 0.75,
            Self::Complete => 1.0,
            Self::Failed => 0.0,
        }
    }
}

/// A progress update emitted by the pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressUpdate {
    /// Current pipeline stage
    pub stage: PipelineStage,

    /// Overall progress (0.0 - 1.0)
    pub progress: f32,

    /// Progress within current stage (0.0 - 1.0)
    pub stage_progress: f32,

    /// Human-readable message describing current activity
    pub message: String,
}

impl ProgressUpdate {
    /// Creates a new progress update for a stage.
    pub fn new(stage: PipelineStage, stage_progress: f32, message: impl Into<String>) -> Self {
        let progress = stage.base_progress() + (stage.weight() * stage_progress);
        Self {
            stage,
            progress: progress.clamp(0.0, 1.0),
            stage_progress: stage_progress.clamp(0.0, 1.0),
            message: message.into(),
        }
    }

    /// Creates a completion progress update.
    pub fn complete(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Complete,
            progress: 1.0,
            stage_progress: 1.0,
            message: message.into(),
        }
    }

    /// Creates a failed progress update.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            stage: PipelineStage::Failed,
            progress: 0.0,
            stage_progress: 0.0,
            message: message.into(),
        }
    }
}

/// Trait for receiving progress updates during processing.
///
/// Implementations must be `Send + Sync` so a pipeline can run on a worker
/// thread while reporting to another.
pub trait ProgressReporter: Send + Sync {
    /// Called at each stage boundary, on completion and on failure.
    fn report(&self, update: ProgressUpdate);
}

/// Wrapper that implements [`ProgressReporter`] using a closure.
pub struct ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    callback: F,
}

impl<F> ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    /// Creates a new closure-based progress reporter.
    pub fn new(callback: F) -> Self {
        Self { callback }
    }
}

impl<F> ProgressReporter for ClosureProgressReporter<F>
where
    F: Fn(ProgressUpdate) + Send + Sync,
{
    fn report(&self, update: ProgressUpdate) {
        (self.callback)(update);
    }
}

static_assertions::assert_impl_all!(ProgressUpdate: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn test_stage_weights_cover_pipeline() {
        let stages = [
            PipelineStage::Loading,
            PipelineStage::Unifying,
            PipelineStage::BrandExtraction,
            PipelineStage::AgeNormalization,
            PipelineStage::OutcomeExplosion,
            PipelineStage::Writing,
        ];
        let total: f32 = stages.iter().map(|s| s.weight()).sum();
        assert!((total - 1.0).abs() < 1e-6);

        for pair in stages.windows(2) {
            let expected = pair[0].base_progress() + pair[0].weight();
            assert!((pair[1].base_progress() - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn test_progress_update_clamps() {
        let update = ProgressUpdate::new(PipelineStage::Writing, 2.0, "done");
        assert_eq!(update.stage_progress, 1.0);
        assert!((update.progress - 1.0).abs() < 1e-6);

        let update = ProgressUpdate::new(PipelineStage::Unifying, 0.0, "start");
        assert!((update.progress - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_closure_reporter() {
        let seen = Mutex::new(Vec::new());
        let reporter = ClosureProgressReporter::new(|update: ProgressUpdate| {
            seen.lock().unwrap().push(update.stage);
        });

        reporter.report(ProgressUpdate::new(PipelineStage::Loading, 0.0, "loading"));
        reporter.report(ProgressUpdate::complete("ok"));

        assert_eq!(
            *seen.lock().unwrap(),
            vec![PipelineStage::Loading, PipelineStage::Complete]
        );
    }

    #[test]
    fn test_stage_serialization() {
        let json = serde_json::to_string(&PipelineStage::OutcomeExplosion).unwrap();
        assert_eq!(json, "\"outcome_explosion\"");
        assert_eq!(PipelineStage::AgeNormalization.display_name(), "Normalizing Ages");
    }
}
