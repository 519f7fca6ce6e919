//! Pipeline module.
//!
//! This module sequences the unification, enrichment and explosion stages
//! and reports progress while doing so.

mod builder;
pub mod progress;

pub use builder::{Pipeline, PipelineBuilder};
pub use progress::{ClosureProgressReporter, PipelineStage, ProgressReporter, ProgressUpdate};
