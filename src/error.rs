//! Error types for the render, tag and metrics pipeline.

use thiserror::Error;

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the core components and the build tool boundary.
#[derive(Error, Debug)]
pub enum Error {
    // Configuration errors
    #[error("Invalid base image '{image}': {reason}")]
    InvalidBaseImage { image: String, reason: String },

    #[error("Unsupported architecture: {arch}")]
    UnsupportedArchitecture { arch: String },

    #[error("Invalid matrix: {reason}")]
    InvalidMatrix { reason: String },

    // Tag errors
    #[error("Tag collision: '{first}' and '{second}' both map to '{tag}'")]
    TagCollision {
        first: String,
        second: String,
        tag: String,
    },

    #[error("No publishable tags for ref '{source_ref}'")]
    EmptyTagSet { source_ref: String },

    // Build tool errors
    #[error("Build failed for {platform}: {reason}")]
    BuildFailed { platform: String, reason: String },

    #[error("Inspection of {image} failed: {reason}")]
    InspectionFailed { image: String, reason: String },

    #[error("Image not found: {image}")]
    ImageNotFound { image: String },

    #[error("Incomplete metrics for {image}: missing {field}")]
    IncompleteMetrics { image: String, field: String },

    #[error("Operation cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl Error {
    /// Whether the failure may clear up on retry (daemon unreachable, timeout).
    pub fn is_transient(&self) -> bool {
        matches!(self, Error::InspectionFailed { .. })
    }

    pub(crate) fn invalid_matrix(reason: impl Into<String>) -> Self {
        Error::InvalidMatrix {
            reason: reason.into(),
        }
    }
}
