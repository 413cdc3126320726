//! Error handling for ocean mapping conversion operations.
//!
//! Each pipeline stage has its own failure class. Whether a failure is
//! fatal or degrades gracefully is decided by the stage that owns it:
//! quality evaluation, anomaly detection, reprojection and surface
//! building degrade; validation, anonymization and export propagate.

use std::fmt::Display;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MapperError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input not found at path: {path}")]
    InputNotFound { path: PathBuf },

    #[error("Failed to parse {path}: {reason}")]
    Parse { path: PathBuf, reason: String },

    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Quality evaluation failed: {message}")]
    QualityEvaluation { message: String },

    #[error("Anomaly detection failed: {message}")]
    AnomalyDetection { message: String },

    #[error("Anonymization failed: {message}")]
    Anonymization { message: String },

    #[error("Reprojection failed: {message}")]
    Reprojection { message: String },

    #[error("Surface building failed: {message}")]
    SurfaceBuild { message: String },

    #[error("Overlay failed: {message}")]
    Overlay { message: String },

    #[error("Conversion failed: {message}")]
    Conversion { message: String },

    #[error("Export failed for {path}: {reason}")]
    Export { path: PathBuf, reason: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Processing interrupted: {reason}")]
    Interrupted { reason: String },
}

impl MapperError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn parse(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::Parse {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Wrap any stage failure into the single conversion-level error,
    /// keeping the original message.
    pub fn conversion(source: impl Display) -> Self {
        Self::Conversion {
            message: source.to_string(),
        }
    }

    /// True for failures that abort a job as a whole
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self,
            Self::QualityEvaluation { .. }
                | Self::AnomalyDetection { .. }
                | Self::Reprojection { .. }
                | Self::SurfaceBuild { .. }
        )
    }
}

pub type Result<T> = std::result::Result<T, MapperError>;
