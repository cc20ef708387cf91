// THEORY:
// This file is the main entry point for the `hawkeye_vision` library crate, the
// inspection engine for pin-and-shaft carrier trays.
//
// The public surface is small:
// - `InspectionPipeline` inspects one photo and returns an `InspectionReport`
//   (result, defect ledger, optional overlays);
// - `BatchProcessor` runs many photos over a worker pool and returns one
//   `ImageOutcome` per photo, which `BatchSummary` rolls up into a quality score;
// - `InspectionConfig` carries every calibration value, loaded from TOML.
//
// The detectors themselves live in `core_modules` and are public so that callers
// with their own masks or boxes can reuse individual stages.

pub mod batch;
pub mod config;
pub mod core_modules;
pub mod error;
pub mod image_id;
pub mod parallel_pipeline;
pub mod pipeline;

pub use batch::{BatchSummary, ImageOutcome};
pub use config::InspectionConfig;
pub use core_modules::aggregator::{DefectRecord, DefectType, InspectionResult};
pub use core_modules::grid_detector::assign_grid;
pub use error::{BatchError, ConfigError, InspectionError};
pub use image_id::{ArtifactKind, ImageId};
pub use parallel_pipeline::{BatchProcessor, CancelHandle, ImageInput};
pub use pipeline::{InspectionPipeline, InspectionReport};
