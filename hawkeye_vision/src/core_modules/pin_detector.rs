// THEORY:
// The `pin_detector` finds every pin in a tray photo and decides, for each one,
// whether it has the right color and whether it is intact.
//
// Detection is color driven. Every pixel is converted to HSV and tested against the
// calibrated bands:
// - the **reference band** is the color of a conforming pin;
// - the **off-standard bands** are the colors of known wrong pins. A pixel that is in
//   the reference band is never counted as off-standard, so overlapping bands cannot
//   report the same pin twice.
//
// Each mask is opened to remove speckle, then touching pins are pulled apart by the
// seeded split of the `region_detector`. Anything at or below `min_pin_area` pixels
// is noise.
//
// Damage is judged by size. A bent or broken pin shows less of itself to the camera,
// so a pin whose area falls below the damage threshold is a damaged candidate. The
// threshold is either a fixed area or a fraction of the mean area of all pins found
// in the same photo, which makes it robust to camera distance.
//
// Color and damage are independent, giving four categories. Their counts are
// accumulated in a `PinTally` that lives for exactly one image.

use crate::config::{DamageThreshold, PinConfig};
use crate::core_modules::compartment::CompartmentRef;
use crate::core_modules::mask::mask;
use crate::core_modules::region::{BoundingBox, Region};
use crate::core_modules::region_detector::region_detector;
use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Which band a pin was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinColor {
    Reference,
    OffStandard,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PinCategory {
    Ok,
    WrongColor,
    Damaged,
    DoubleDefect,
}

impl PinCategory {
    pub fn classify(wrong_color: bool, damaged: bool) -> Self {
        match (wrong_color, damaged) {
            (true, true) => PinCategory::DoubleDefect,
            (true, false) => PinCategory::WrongColor,
            (false, true) => PinCategory::Damaged,
            (false, false) => PinCategory::Ok,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, PinCategory::Ok)
    }
}

/// A pin region as it comes out of the color masks, before classification.
#[derive(Debug, Clone, PartialEq)]
pub struct DetectedPin {
    pub region: Region,
    pub color: PinColor,
}

impl DetectedPin {
    pub fn area(&self) -> usize {
        self.region.area()
    }

    pub fn bounding_box(&self) -> BoundingBox {
        self.region.bounding_box
    }
}

/// A classified pin, as reported.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pin {
    pub index: usize,
    pub area: usize,
    pub bbox: BoundingBox,
    pub centroid: (f64, f64),
    pub color: PinColor,
    pub damaged: bool,
    pub category: PinCategory,
    /// The compartment the pin sits in; `None` until compartments are filled, or
    /// when the pin straddles a wall.
    pub compartment: Option<CompartmentRef>,
}

/// Per-image pin counts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinClassification {
    pub total_pins: u32,
    pub pins_ok: u32,
    pub pins_wrong_color: u32,
    pub pins_damaged: u32,
    pub pins_double_defect: u32,
    pub valid_pins: u32,
    pub invalid_pins: u32,
    pub critical_pins: u32,
    pub average_area: f64,
    pub damaged_threshold: f64,
    pub pins: Vec<Pin>,
}

/// Accumulates pin categories for one image.
#[derive(Debug, Default)]
pub struct PinTally {
    pins_ok: u32,
    pins_wrong_color: u32,
    pins_damaged: u32,
    pins_double_defect: u32,
    pins: Vec<Pin>,
}

impl PinTally {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, detected: &DetectedPin, damaged_threshold: f64) -> PinCategory {
        let wrong_color = detected.color == PinColor::OffStandard;
        let damaged = (detected.area() as f64) < damaged_threshold;
        let category = PinCategory::classify(wrong_color, damaged);

        match category {
            PinCategory::Ok => self.pins_ok += 1,
            PinCategory::WrongColor => self.pins_wrong_color += 1,
            PinCategory::Damaged => self.pins_damaged += 1,
            PinCategory::DoubleDefect => self.pins_double_defect += 1,
        }

        self.pins.push(Pin {
            index: self.pins.len(),
            area: detected.area(),
            bbox: detected.bounding_box(),
            centroid: detected.region.centroid,
            color: detected.color,
            damaged,
            category,
            compartment: None,
        });
        category
    }

    pub fn finish(self, average_area: f64, damaged_threshold: f64) -> PinClassification {
        let total_pins = self.pins.len() as u32;
        PinClassification {
            total_pins,
            pins_ok: self.pins_ok,
            pins_wrong_color: self.pins_wrong_color,
            pins_damaged: self.pins_damaged,
            pins_double_defect: self.pins_double_defect,
            valid_pins: self.pins_ok,
            invalid_pins: total_pins - self.pins_ok,
            critical_pins: self.pins_double_defect,
            average_area: round2(average_area),
            damaged_threshold: round2(damaged_threshold),
            pins: self.pins,
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Classifies every detected pin against the damage threshold for this image.
pub fn classify_pins(detected: &[DetectedPin], threshold: &DamageThreshold) -> PinClassification {
    let average_area = if detected.is_empty() {
        0.0
    } else {
        detected.iter().map(|p| p.area() as f64).sum::<f64>() / detected.len() as f64
    };
    // No pins means no damage reference either.
    let damaged_threshold = if detected.is_empty() {
        0.0
    } else {
        threshold.resolve(average_area)
    };

    let mut tally = PinTally::new();
    for pin in detected {
        tally.record(pin, damaged_threshold);
    }
    tally.finish(average_area, damaged_threshold)
}

pub struct PinDetector {
    config: PinConfig,
}

impl PinDetector {
    pub fn new(config: PinConfig) -> Self {
        Self { config }
    }

    /// Reference-band and off-standard masks, in that order.
    pub fn color_masks(&self, image: &RgbImage) -> (GrayImage, GrayImage) {
        let reference =
            mask::from_predicate(image, |p| self.config.reference_band.contains(p.hsv()));
        let off_standard = mask::from_predicate(image, |p| {
            let hsv = p.hsv();
            !self.config.reference_band.contains(hsv)
                && self.config.off_standard_bands.iter().any(|band| band.contains(hsv))
        });
        (reference, off_standard)
    }

    /// Reference pins first, then off-standard pins, each in scan order.
    pub fn detect(&self, image: &RgbImage) -> Vec<DetectedPin> {
        let (reference_mask, off_standard_mask) = self.color_masks(image);

        let reference = self.extract(&reference_mask, self.config.reference_split_factor);
        let off_standard = self.extract(&off_standard_mask, self.config.off_standard_split_factor);
        debug!(
            reference = reference.len(),
            off_standard = off_standard.len(),
            "pins detected"
        );

        reference
            .into_iter()
            .map(|region| DetectedPin {
                region,
                color: PinColor::Reference,
            })
            .chain(off_standard.into_iter().map(|region| DetectedPin {
                region,
                color: PinColor::OffStandard,
            }))
            .collect()
    }

    fn extract(&self, color_mask: &GrayImage, split_factor: f64) -> Vec<Region> {
        let opened = mask::open(color_mask, 1);
        region_detector::split_touching(&opened, split_factor)
            .into_iter()
            .filter(|region| region.area() > self.config.min_pin_area)
            .collect()
    }
}
