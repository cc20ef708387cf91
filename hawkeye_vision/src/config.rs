// THEORY:
// Every number that depends on the camera, the lighting or the part geometry lives
// here and nowhere else. The detectors receive their slice of this bundle and never
// carry literals of their own, so re-calibrating a rig means editing one TOML file.
//
// The calibration structs have no `Default`: a missing value is a configuration
// error, surfaced before the first image is read. Only reporting preferences
// (`ReportConfig`) have defaults.

use crate::core_modules::pixel::pixel::Hsv;
use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::f64::consts::FRAC_PI_2;
use std::path::Path;

/// The complete configuration bundle consumed by `InspectionPipeline`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionConfig {
    pub grid: GridConfig,
    pub pins: PinConfig,
    pub shafts: ShaftConfig,
    #[serde(default)]
    pub report: ReportConfig,
    /// Number of parallel pipeline workers for batch runs. `None` uses one per CPU.
    #[serde(default)]
    pub workers: Option<usize>,
}

/// Tuning for the compartment grid detector (edge + Hough line based).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridConfig {
    /// Expected number of grid columns. When absent, `ceil(sqrt(n))` is used.
    #[serde(default)]
    pub grid_columns: Option<u32>,
    /// Gaussian sigma applied before Otsu binarization.
    pub blur_sigma: f32,
    /// Radius (Chebyshev) of the closing applied to the binarized tray.
    pub close_radius: u8,
    pub canny_low: f32,
    pub canny_high: f32,
    /// Minimum Hough accumulator votes for a line to count.
    pub hough_vote_threshold: u32,
    /// Non-maximum suppression radius in the Hough accumulator. Keep it below the
    /// wall thickness so both edges of a wall survive and average to its center.
    pub hough_suppression_radius: u32,
    /// A line needs a stretch of edge pixels at least this long to count as a wall.
    pub min_line_length: u32,
    /// Largest gap (pixels) tolerated inside that stretch.
    pub max_line_gap: u32,
    /// How far (degrees) a line may lean and still count as vertical/horizontal.
    pub max_skew_degrees: u32,
    /// Line positions closer than this to a group's mean join that group.
    pub group_tolerance: f64,
    /// Emitted grid lines must be further apart than this.
    pub min_line_spacing: f64,
}

/// An inclusive HSV range on the 8-bit OpenCV scale (H 0..=179, S and V 0..=255).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColorBand {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl ColorBand {
    pub fn contains(&self, hsv: Hsv) -> bool {
        let channels = [hsv.hue, hsv.saturation, hsv.value];
        channels
            .iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .all(|(value, (low, high))| value >= low && value <= high)
    }

    fn validate(&self, field: &'static str) -> Result<(), ConfigError> {
        for channel in 0..3 {
            if self.lower[channel] > self.upper[channel] {
                return Err(ConfigError::invalid(
                    field,
                    format!(
                        "lower bound {} exceeds upper bound {} on channel {}",
                        self.lower[channel], self.upper[channel], channel
                    ),
                ));
            }
        }
        if self.upper[0] > 179 {
            return Err(ConfigError::invalid(field, "hue is limited to 0..=179"));
        }
        Ok(())
    }
}

/// How the area cutoff for a damaged pin is obtained.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum DamageThreshold {
    /// A fixed pixel area.
    Absolute { area: f64 },
    /// A fraction of the mean area of every pin detected in the same image.
    RelativeToMean { ratio: f64 },
}

impl DamageThreshold {
    /// Resolves the cutoff for one image, given the mean pin area of that image.
    pub fn resolve(&self, average_area: f64) -> f64 {
        match *self {
            DamageThreshold::Absolute { area } => area,
            DamageThreshold::RelativeToMean { ratio } => average_area * ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PinConfig {
    /// The color a conforming pin must have.
    pub reference_band: ColorBand,
    /// Colors of known non-conforming pins. A pin in any of these is a color mismatch.
    pub off_standard_bands: Vec<ColorBand>,
    /// Regions at or below this pixel area are noise, not pins.
    pub min_pin_area: usize,
    /// Fraction of the peak distance used as sure-foreground when splitting touching pins.
    pub reference_split_factor: f64,
    pub off_standard_split_factor: f64,
    pub damage_threshold: DamageThreshold,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaftConfig {
    pub segmentation: ShaftSegmentationConfig,
    pub primary: PrimaryCriteria,
    pub secondary: SecondaryCriteria,
}

/// Where to look for shafts: a trapezoid projected out of the wide end of each pin body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaftSegmentationConfig {
    /// Reference-colored bodies smaller than this do not seed a search region.
    pub min_pin_body_area: usize,
    pub search_length: f64,
    /// Half width of the trapezoid where it leaves the pin body.
    pub base_half_width: f64,
    /// Half width of the trapezoid at its far end.
    pub tip_half_width: f64,
    /// Gap between the pin's wide end and the start of the trapezoid.
    pub offset: f64,
    /// Shaft pixels are brighter than this grayscale level.
    pub intensity_threshold: u8,
    /// Chebyshev radius by which pin bodies are grown before being cut out.
    pub body_margin: u8,
    /// Shaft regions smaller than this pixel area are dropped.
    pub min_area: usize,
}

/// Hard pass/fail limits. Failing any of them rejects the shaft outright.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrimaryCriteria {
    pub min_length: f64,
    pub max_length: f64,
    pub min_width: f64,
    pub max_width: f64,
    pub min_straightness: f64,
    pub min_area: f64,
    pub max_area: f64,
    /// Largest tolerated |inclination| from image vertical, radians.
    pub max_inclination: f64,
}

/// Advisory floors, stricter than the primary ones. Failing only these yields a
/// borderline (secondary) rejection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecondaryCriteria {
    #[serde(default)]
    pub min_straightness: Option<f64>,
    #[serde(default)]
    pub min_length: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DefectGranularity {
    /// One ledger row per defect category (per compartment for occupancy defects).
    #[default]
    PerCategory,
    /// One ledger row per offending pin or shaft.
    PerInstance,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportConfig {
    #[serde(default)]
    pub granularity: DefectGranularity,
    #[serde(default)]
    pub render_overlays: bool,
}

impl InspectionConfig {
    /// Parses and validates a TOML configuration document.
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: InspectionConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.grid.validate()?;
        self.pins.validate()?;
        self.shafts.validate()?;
        if self.workers == Some(0) {
            return Err(ConfigError::invalid("workers", "must be at least 1"));
        }
        Ok(())
    }
}

fn require_finite_non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !value.is_finite() || value < 0.0 {
        return Err(ConfigError::invalid(
            field,
            format!("must be a finite non-negative number, got {value}"),
        ));
    }
    Ok(())
}

fn require_ordered(field: &'static str, low: f64, high: f64) -> Result<(), ConfigError> {
    if low > high {
        return Err(ConfigError::invalid(
            field,
            format!("minimum {low} exceeds maximum {high}"),
        ));
    }
    Ok(())
}

fn require_unit_interval(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if !(0.0..=1.0).contains(&value) {
        return Err(ConfigError::invalid(field, format!("must lie in [0, 1], got {value}")));
    }
    Ok(())
}

impl GridConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        if self.grid_columns == Some(0) {
            return Err(ConfigError::invalid("grid.grid_columns", "must be at least 1"));
        }
        if !self.blur_sigma.is_finite() || self.blur_sigma <= 0.0 {
            return Err(ConfigError::invalid("grid.blur_sigma", "must be positive"));
        }
        if !(self.canny_low >= 0.0 && self.canny_low <= self.canny_high) {
            return Err(ConfigError::invalid(
                "grid.canny_low",
                "must be non-negative and not above canny_high",
            ));
        }
        if self.hough_vote_threshold == 0 {
            return Err(ConfigError::invalid("grid.hough_vote_threshold", "must be positive"));
        }
        if self.min_line_length == 0 {
            return Err(ConfigError::invalid("grid.min_line_length", "must be positive"));
        }
        if self.max_skew_degrees >= 45 {
            return Err(ConfigError::invalid(
                "grid.max_skew_degrees",
                "must be below 45 so vertical and horizontal lines stay distinct",
            ));
        }
        require_finite_non_negative("grid.group_tolerance", self.group_tolerance)?;
        require_finite_non_negative("grid.min_line_spacing", self.min_line_spacing)?;
        if self.group_tolerance == 0.0 {
            return Err(ConfigError::invalid("grid.group_tolerance", "must be positive"));
        }
        Ok(())
    }
}

impl PinConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        self.reference_band.validate("pins.reference_band")?;
        for band in &self.off_standard_bands {
            band.validate("pins.off_standard_bands")?;
        }
        if self.min_pin_area == 0 {
            return Err(ConfigError::invalid("pins.min_pin_area", "must be positive"));
        }
        for (field, factor) in [
            ("pins.reference_split_factor", self.reference_split_factor),
            ("pins.off_standard_split_factor", self.off_standard_split_factor),
        ] {
            if !(0.0..1.0).contains(&factor) {
                return Err(ConfigError::invalid(
                    field,
                    format!("must lie in [0, 1), got {factor}"),
                ));
            }
        }
        match self.damage_threshold {
            DamageThreshold::Absolute { area } => {
                require_finite_non_negative("pins.damage_threshold.area", area)?;
            }
            DamageThreshold::RelativeToMean { ratio } => {
                if !ratio.is_finite() || ratio <= 0.0 {
                    return Err(ConfigError::invalid(
                        "pins.damage_threshold.ratio",
                        "must be positive",
                    ));
                }
            }
        }
        Ok(())
    }
}

impl ShaftConfig {
    fn validate(&self) -> Result<(), ConfigError> {
        let seg = &self.segmentation;
        if seg.min_pin_body_area == 0 {
            return Err(ConfigError::invalid(
                "shafts.segmentation.min_pin_body_area",
                "must be positive",
            ));
        }
        require_finite_non_negative("shafts.segmentation.search_length", seg.search_length)?;
        require_finite_non_negative("shafts.segmentation.base_half_width", seg.base_half_width)?;
        require_finite_non_negative("shafts.segmentation.tip_half_width", seg.tip_half_width)?;
        require_finite_non_negative("shafts.segmentation.offset", seg.offset)?;
        if seg.search_length == 0.0 {
            return Err(ConfigError::invalid(
                "shafts.segmentation.search_length",
                "must be positive",
            ));
        }

        let p = &self.primary;
        for (field, value) in [
            ("shafts.primary.min_length", p.min_length),
            ("shafts.primary.max_length", p.max_length),
            ("shafts.primary.min_width", p.min_width),
            ("shafts.primary.max_width", p.max_width),
            ("shafts.primary.min_area", p.min_area),
            ("shafts.primary.max_area", p.max_area),
            ("shafts.primary.max_inclination", p.max_inclination),
        ] {
            require_finite_non_negative(field, value)?;
        }
        require_ordered("shafts.primary.min_length", p.min_length, p.max_length)?;
        require_ordered("shafts.primary.min_width", p.min_width, p.max_width)?;
        require_ordered("shafts.primary.min_area", p.min_area, p.max_area)?;
        require_unit_interval("shafts.primary.min_straightness", p.min_straightness)?;
        if p.max_inclination > FRAC_PI_2 {
            return Err(ConfigError::invalid(
                "shafts.primary.max_inclination",
                "inclination is normalized to (-pi/2, pi/2]; limits above pi/2 are meaningless",
            ));
        }

        let s = &self.secondary;
        if let Some(floor) = s.min_straightness {
            require_unit_interval("shafts.secondary.min_straightness", floor)?;
            if floor < p.min_straightness {
                return Err(ConfigError::invalid(
                    "shafts.secondary.min_straightness",
                    "must not be looser than the primary straightness floor",
                ));
            }
        }
        if let Some(floor) = s.min_length {
            require_finite_non_negative("shafts.secondary.min_length", floor)?;
            if floor < p.min_length {
                return Err(ConfigError::invalid(
                    "shafts.secondary.min_length",
                    "must not be looser than the primary length floor",
                ));
            }
        }
        Ok(())
    }
}
