//! Error types for hawkeye_vision.
//!
//! Three tiers, matching how far a failure is allowed to travel:
//! - `ConfigError` aborts a run before any image is touched.
//! - `InspectionError` is scoped to one image and ends up as an errored outcome.
//! - `BatchError` is about the batch as a whole (cancellation, a dead worker pool).

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed configuration: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration value `{field}`: {reason}")]
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// A failure confined to a single captured image.
#[derive(Error, Debug)]
pub enum InspectionError {
    #[error("Unreadable image: {0}")]
    Decode(#[source] image::ImageError),

    #[error("Image has no pixels")]
    EmptyImage,

    #[error(
        "No compartments detected \
         ({vertical_lines} vertical and {horizontal_lines} horizontal grid lines found)"
    )]
    NoCompartments {
        vertical_lines: usize,
        horizontal_lines: usize,
    },

    #[error("Failed to encode overlay: {0}")]
    Encode(#[source] image::ImageError),
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BatchError {
    #[error("Batch was cancelled before all images were inspected")]
    Cancelled,

    #[error("Worker pool unavailable: {0}")]
    Worker(String),
}
