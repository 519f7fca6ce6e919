//! Error types for the CAERS processing pipeline.
//!
//! Fatal, run-level failures are represented by [`ProcessingError`]. Per-row
//! data-quality problems are not errors at this level; they are collected as
//! [`RowIssue`](crate::types::RowIssue)s by the stage that detects them.
//!
//! Errors are serializable so the CLI can emit them as JSON.

use serde::Serialize;
use serde::ser::SerializeStruct;
use std::path::PathBuf;
use thiserror::Error;

/// The main error type for the processing pipeline.
#[derive(Error, Debug)]
pub enum ProcessingError {
    /// The input directory does not exist or is not a directory.
    #[error("Input directory not found: {}", .0.display())]
    InputDirNotFound(PathBuf),

    /// No input files matched the configured extension.
    #[error("No '*.{extension}' files found in {}", .dir.display())]
    NoInputFiles { dir: PathBuf, extension: String },

    /// A source file could not be parsed as tabular text.
    #[error("Failed to parse '{}' as CSV: {source}", .path.display())]
    FileParse {
        path: PathBuf,
        #[source]
        source: polars::error::PolarsError,
    },

    /// Two source columns normalize to the same canonical name.
    #[error("Columns in '{}' collide after normalization: '{column}'", .path.display())]
    DuplicateColumn { path: PathBuf, column: String },

    /// A column required by a later stage is absent from the unified table.
    #[error("Column '{0}' not found in dataset")]
    ColumnNotFound(String),

    /// Invalid configuration provided.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Writing a derived table failed.
    #[error("Failed to write '{}': {reason}", .path.display())]
    WriteFailed { path: PathBuf, reason: String },

    /// IO error wrapper.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Polars error wrapper.
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context.
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<ProcessingError>,
    },
}

impl ProcessingError {
    /// Add context to an error.
    pub fn with_context(self, context: impl Into<String>) -> Self {
        ProcessingError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Stable error code, used in the CLI's JSON output.
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::InputDirNotFound(_) => "INPUT_DIR_NOT_FOUND",
            Self::NoInputFiles { .. } => "NO_INPUT_FILES",
            Self::FileParse { .. } => "FILE_PARSE_FAILED",
            Self::DuplicateColumn { .. } => "DUPLICATE_COLUMN",
            Self::ColumnNotFound(_) => "COLUMN_NOT_FOUND",
            Self::InvalidConfig(_) => "INVALID_CONFIG",
            Self::WriteFailed { .. } => "WRITE_FAILED",
            Self::Io(_) => "IO_ERROR",
            Self::Polars(_) => "POLARS_ERROR",
            Self::Json(_) => "JSON_ERROR",
            Self::WithContext { source, .. } => source.error_code(),
        }
    }

    /// The source file this error is attributed to, if any.
    pub fn source_file(&self) -> Option<&PathBuf> {
        match self {
            Self::FileParse { path, .. } | Self::DuplicateColumn { path, .. } => Some(path),
            Self::WithContext { source, .. } => source.source_file(),
            _ => None,
        }
    }

    /// Whether the failure happened while ingesting source files.
    pub fn is_ingestion_error(&self) -> bool {
        match self {
            Self::InputDirNotFound(_)
            | Self::NoInputFiles { .. }
            | Self::FileParse { .. }
            | Self::DuplicateColumn { .. }
            | Self::ColumnNotFound(_) => true,
            Self::WithContext { source, .. } => source.is_ingestion_error(),
            _ => false,
        }
    }
}

/// Errors are serialized as a struct with `code` and `message` fields.
impl Serialize for ProcessingError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        let mut state = serializer.serialize_struct("ProcessingError", 2)?;
        state.serialize_field("code", &self.error_code())?;
        state.serialize_field("message", &self.to_string())?;
        state.end()
    }
}

/// Result type alias for processing operations.
pub type Result<T> = std::result::Result<T, ProcessingError>;

/// Extension trait for adding context to Results.
pub trait ResultExt<T> {
    /// Add context to an error result.
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}

impl<T> ResultExt<T> for std::result::Result<T, polars::error::PolarsError> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| ProcessingError::Polars(e).with_context(context))
    }
}
