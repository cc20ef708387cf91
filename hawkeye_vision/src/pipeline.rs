// THEORY:
// The `pipeline` module is the top-level API of the inspection engine. It wires the
// four stages together for one image:
//
//   1. grid detection   -> compartments
//   2. pin detection    -> pins, per-compartment counts, pin categories
//   3. shaft analysis   -> shaft masks, geometry, verdicts
//   4. aggregation      -> InspectionResult + defect ledger (+ optional overlays)
//
// Every stage always runs, even when an earlier one already found a disqualifying
// defect, because the aggregator needs complete counts. The only early exits are the
// unprocessable cases: an undecodable or empty raster, and a photo in which no
// compartment grid can be found.
//
// A pipeline holds configuration and nothing else. Inspecting is `&self`, so one
// instance can be shared across threads, and inspecting the same bytes twice gives
// the same result.

use crate::config::InspectionConfig;
use crate::core_modules::aggregator::{Aggregator, DefectRecord, InspectionResult};
use crate::core_modules::compartment::fill_compartments;
use crate::core_modules::grid_detector::{GridDetector, assign_grid};
use crate::core_modules::overlay::{self, OverlayInputs, Overlays};
use crate::core_modules::pin_detector::{PinDetector, classify_pins};
use crate::core_modules::shaft_analyzer::ShaftAnalyzer;
use crate::core_modules::shaft_segmenter::ShaftSegmenter;
use crate::error::{ConfigError, InspectionError};
use crate::image_id::ImageId;
use image::{DynamicImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span};

/// The full outcome of inspecting one image.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionReport {
    pub result: InspectionResult,
    pub defects: Vec<DefectRecord>,
    /// Present only when overlays were requested in the configuration.
    #[serde(skip)]
    pub overlays: Option<Overlays>,
}

pub struct InspectionPipeline {
    config: InspectionConfig,
    grid_detector: GridDetector,
    pin_detector: PinDetector,
    shaft_segmenter: ShaftSegmenter,
    shaft_analyzer: ShaftAnalyzer,
}

impl InspectionPipeline {
    /// Validates `config` and builds the stage detectors. Fails before any image is read.
    pub fn new(config: InspectionConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            grid_detector: GridDetector::new(config.grid.clone()),
            pin_detector: PinDetector::new(config.pins.clone()),
            shaft_segmenter: ShaftSegmenter::new(
                config.shafts.segmentation.clone(),
                config.pins.reference_band,
            ),
            shaft_analyzer: ShaftAnalyzer::new(&config.shafts),
            config,
        })
    }

    pub fn config(&self) -> &InspectionConfig {
        &self.config
    }

    /// Decodes and inspects an encoded image file (PNG, JPEG, ...).
    pub fn inspect_bytes(&self, bytes: &[u8]) -> Result<InspectionReport, InspectionError> {
        let image_id = ImageId::from_bytes(bytes);
        let decoded = image::load_from_memory(bytes).map_err(InspectionError::Decode)?;
        self.inspect_with_id(image_id, &decoded.to_rgb8())
    }

    /// Inspects an already decoded image. The id is derived from the raster.
    pub fn inspect_image(&self, image: &DynamicImage) -> Result<InspectionReport, InspectionError> {
        let rgb = image.to_rgb8();
        self.inspect_with_id(ImageId::from_raster(&rgb), &rgb)
    }

    pub fn inspect_with_id(
        &self,
        image_id: ImageId,
        image: &RgbImage,
    ) -> Result<InspectionReport, InspectionError> {
        let span = info_span!("inspect", image_id = %image_id);
        let _enter = span.enter();

        if image.width() == 0 || image.height() == 0 {
            return Err(InspectionError::EmptyImage);
        }

        // Stage 1: compartment grid
        let grid = self.grid_detector.detect(image);
        if grid.cells.is_empty() {
            return Err(InspectionError::NoCompartments {
                vertical_lines: grid.x_positions.len(),
                horizontal_lines: grid.y_positions.len(),
            });
        }
        let cells = assign_grid(&grid.cells, self.config.grid.grid_columns);

        // Stage 2: pins
        let detected_pins = self.pin_detector.detect(image);
        let mut pin_classification =
            classify_pins(&detected_pins, &self.config.pins.damage_threshold);
        let compartments = fill_compartments(&cells, &mut pin_classification.pins);

        // Stage 3: shafts
        let shaft_regions = self.shaft_segmenter.segment(image);
        let shaft_classification = self.shaft_analyzer.analyze_masks(&shaft_regions);
        debug!(
            compartments = compartments.len(),
            pins = pin_classification.total_pins,
            shafts = shaft_classification.total_shafts,
            "stages complete"
        );

        let overlays = if self.config.report.render_overlays {
            Some(overlay::render(&OverlayInputs {
                image,
                grid: &grid,
                detected_pins: &detected_pins,
                pin_classification: &pin_classification,
                compartments: &compartments,
                shaft_regions: &shaft_regions,
                shaft_classification: &shaft_classification,
            })?)
        } else {
            None
        };

        // Stage 4: aggregation
        let result = Aggregator::aggregate(
            image_id,
            compartments,
            pin_classification,
            shaft_classification,
        );
        let defects = Aggregator::defect_records(&result, self.config.report.granularity);
        info!(
            defects_count = result.defects_count,
            is_valid = result.is_valid,
            "inspection complete"
        );

        Ok(InspectionReport {
            result,
            defects,
            overlays,
        })
    }
}
