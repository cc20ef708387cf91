// THEORY:
// The `shaft_analyzer` turns each shaft mask into a handful of numbers and a verdict.
//
// Measurement is principal-axis based (see `geometry`): the pixels are projected
// onto the major and minor axes, and
// - `length` and `width` are the extents of those projections, in pixels;
// - `straightness` compares the mean distance of the pixels from the axis with half
//   the length. A perfect line scores 1, a blob scores close to 0;
// - `inclination` is the angle of the major axis from image vertical.
//
// The verdict has two tiers. The **primary** limits are hard: failing any one of
// them is a reject, whatever else is true. The **secondary** floors are stricter and
// only advisory: a shaft that passes every primary limit but misses a secondary floor
// is a borderline reject, reported apart so operators can tell the two tiers apart.
//
// Every shaft ends in exactly one of the three terminal verdicts, and the verdict is
// a pure function of that shaft's measured geometry and the configuration. Other
// shafts in the same image never change it.

use crate::config::{PrimaryCriteria, SecondaryCriteria, ShaftConfig};
use crate::core_modules::geometry::principal_axes;
use crate::core_modules::region::Region;
use serde::{Deserialize, Serialize};
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ShaftGeometry {
    pub area: usize,
    pub length: f64,
    pub width: f64,
    pub straightness: f64,
    /// Radians from image vertical, in (-pi/2, pi/2].
    pub inclination: f64,
    /// The two ends of the major axis, in image coordinates.
    pub endpoints: [(f64, f64); 2],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ShaftVerdict {
    Approved,
    RejectedPrimary,
    RejectedSecondary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shaft {
    pub index: usize,
    #[serde(flatten)]
    pub geometry: ShaftGeometry,
    pub verdict: ShaftVerdict,
    pub approved: bool,
    pub rejected_secondary: bool,
}

impl Shaft {
    fn new(index: usize, geometry: ShaftGeometry, verdict: ShaftVerdict) -> Self {
        Self {
            index,
            geometry,
            verdict,
            approved: verdict == ShaftVerdict::Approved,
            rejected_secondary: verdict == ShaftVerdict::RejectedSecondary,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShaftClassification {
    pub total_shafts: u32,
    pub approved_shafts: u32,
    /// Primary and secondary rejects together.
    pub rejected_shafts: u32,
    pub rejected_primary: u32,
    pub rejected_secondary: u32,
    pub shafts: Vec<Shaft>,
}

impl ShaftClassification {
    fn from_shafts(shafts: Vec<Shaft>) -> Self {
        let mut summary = ShaftClassification {
            total_shafts: shafts.len() as u32,
            ..Default::default()
        };
        for shaft in &shafts {
            match shaft.verdict {
                ShaftVerdict::Approved => summary.approved_shafts += 1,
                ShaftVerdict::RejectedPrimary => summary.rejected_primary += 1,
                ShaftVerdict::RejectedSecondary => summary.rejected_secondary += 1,
            }
        }
        summary.rejected_shafts = summary.rejected_primary + summary.rejected_secondary;
        summary.shafts = shafts;
        summary
    }
}

/// Measures one shaft mask. `None` for an empty region.
pub fn measure(region: &Region) -> Option<ShaftGeometry> {
    let axes = principal_axes(&region.pixels)?;

    let mut min_along = f64::INFINITY;
    let mut max_along = f64::NEG_INFINITY;
    let mut min_across = f64::INFINITY;
    let mut max_across = f64::NEG_INFINITY;
    let mut offset_sum = 0.0;
    for &point in &region.pixels {
        let (along, across) = axes.project(point);
        min_along = min_along.min(along);
        max_along = max_along.max(along);
        min_across = min_across.min(across);
        max_across = max_across.max(across);
        offset_sum += across.abs();
    }

    let length = max_along - min_along + 1.0;
    let width = max_across - min_across + 1.0;
    let mean_offset = offset_sum / region.pixels.len() as f64;
    let straightness = (1.0 - mean_offset / (length / 2.0)).clamp(0.0, 1.0);

    Some(ShaftGeometry {
        area: region.area(),
        length,
        width,
        straightness,
        inclination: axes.inclination(),
        endpoints: [axes.point_at(min_along, 0.0), axes.point_at(max_along, 0.0)],
    })
}

pub struct ShaftAnalyzer {
    primary: PrimaryCriteria,
    secondary: SecondaryCriteria,
}

impl ShaftAnalyzer {
    pub fn new(config: &ShaftConfig) -> Self {
        Self {
            primary: config.primary.clone(),
            secondary: config.secondary.clone(),
        }
    }

    pub fn passes_primary(&self, g: &ShaftGeometry) -> bool {
        let p = &self.primary;
        let area = g.area as f64;
        (p.min_length..=p.max_length).contains(&g.length)
            && (p.min_width..=p.max_width).contains(&g.width)
            && g.straightness >= p.min_straightness
            && (p.min_area..=p.max_area).contains(&area)
            && g.inclination.abs() <= p.max_inclination
    }

    pub fn passes_secondary(&self, g: &ShaftGeometry) -> bool {
        let s = &self.secondary;
        let straight_enough = s.min_straightness.is_none_or(|floor| g.straightness >= floor);
        let long_enough = s.min_length.is_none_or(|floor| g.length >= floor);
        straight_enough && long_enough
    }

    /// Verdict for a single shaft judged on its own.
    pub fn decide(&self, g: &ShaftGeometry) -> ShaftVerdict {
        if !self.passes_primary(g) {
            ShaftVerdict::RejectedPrimary
        } else if !self.passes_secondary(g) {
            ShaftVerdict::RejectedSecondary
        } else {
            ShaftVerdict::Approved
        }
    }

    /// Verdicts for every shaft of one image.
    pub fn classify(&self, geometries: Vec<ShaftGeometry>) -> ShaftClassification {
        let shafts = geometries
            .into_iter()
            .enumerate()
            .map(|(index, geometry)| {
                let verdict = self.decide(&geometry);
                trace!(
                    index,
                    ?verdict,
                    length = geometry.length,
                    straightness = geometry.straightness,
                    "shaft"
                );
                Shaft::new(index, geometry, verdict)
            })
            .collect();
        ShaftClassification::from_shafts(shafts)
    }

    /// Measures and classifies caller-supplied shaft masks.
    pub fn analyze_masks(&self, regions: &[Region]) -> ShaftClassification {
        self.classify(regions.iter().filter_map(measure).collect())
    }
}
