// THEORY:
// Shafts are thin, bright and colorless, which makes them hard to separate from
// tray glare by color alone. The segmenter therefore only looks where a shaft can
// physically be: just past the wide end of each conforming pin body.
//
// Steps, per image:
// 1.  **Bodies**: reference-colored components of at least `min_pin_body_area`
//     pixels are pin bodies. Smaller blobs cannot carry a shaft.
// 2.  **Orientation**: the principal axis of each body gives its direction. The
//     cross-section width is sampled over a strip at each end of the axis, and the
//     wider end is where the shaft leaves the body.
// 3.  **Search Region**: a trapezoid starts at the widest cross-section of that end
//     and extends `search_length` pixels outward along the axis, narrowing from
//     `base_half_width` to `tip_half_width`.
// 4.  **Shaft Pixels**: inside the search regions, pixels brighter than
//     `intensity_threshold` that are not part of a (slightly grown) pin body.
// 5.  **Cleanup**: a 3x3 opening and closing, then connected components of at least
//     `min_area` pixels. Each component is one shaft mask.

use crate::config::{ColorBand, ShaftSegmentationConfig};
use crate::core_modules::geometry::principal_axes;
use crate::core_modules::mask::mask;
use crate::core_modules::region::Region;
use crate::core_modules::region_detector::region_detector;
use image::{GrayImage, Luma, RgbImage};
use imageproc::drawing::draw_polygon_mut;
use imageproc::point::Point;
use std::collections::BTreeMap;
use tracing::debug;

const STRIP_FRACTION: f64 = 0.12;
const MIN_STRIP_WIDTH: f64 = 12.0;

/// Where a pin body's shaft search region starts and which way it points.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BodyEnd {
    /// Center of the widest cross-section near the wide end.
    pub origin: (f64, f64),
    /// Unit vector pointing away from the body.
    pub direction: (f64, f64),
    pub width: f64,
}

pub struct ShaftSegmenter {
    config: ShaftSegmentationConfig,
    reference_band: ColorBand,
}

impl ShaftSegmenter {
    pub fn new(config: ShaftSegmentationConfig, reference_band: ColorBand) -> Self {
        Self {
            config,
            reference_band,
        }
    }

    /// One region per candidate shaft, in scan order.
    pub fn segment(&self, image: &RgbImage) -> Vec<Region> {
        let (width, height) = image.dimensions();
        let reference = mask::from_predicate(image, |p| self.reference_band.contains(p.hsv()));
        let bodies: Vec<Region> = region_detector::find_regions(&reference)
            .into_iter()
            .filter(|region| region.area() >= self.config.min_pin_body_area)
            .collect();
        if bodies.is_empty() {
            debug!("no pin bodies large enough to carry a shaft");
            return Vec::new();
        }

        let mut body_mask = GrayImage::new(width, height);
        for body in &bodies {
            for point in &body.pixels {
                body_mask.put_pixel(point.x, point.y, Luma([mask::ON]));
            }
        }
        let body_mask = mask::dilate(&body_mask, self.config.body_margin);

        let mut search_mask = GrayImage::new(width, height);
        for body in &bodies {
            if let Some(end) = wide_end(body) {
                self.draw_search_region(&mut search_mask, &end);
            }
        }

        let bright = mask::binarize(&mask::grayscale(image), self.config.intensity_threshold);
        let candidates = mask::subtract(&mask::intersect(&bright, &search_mask), &body_mask);
        let cleaned = mask::close(&mask::open(&candidates, 1), 1);

        let shafts: Vec<Region> = region_detector::find_regions(&cleaned)
            .into_iter()
            .filter(|region| region.area() >= self.config.min_area)
            .enumerate()
            .map(|(id, region)| Region { id: id as u32, ..region })
            .collect();
        debug!(bodies = bodies.len(), shafts = shafts.len(), "shafts segmented");
        shafts
    }

    fn draw_search_region(&self, search_mask: &mut GrayImage, end: &BodyEnd) {
        let (ux, uy) = end.direction;
        let (nx, ny) = (-uy, ux);
        let start = (
            end.origin.0 + ux * self.config.offset,
            end.origin.1 + uy * self.config.offset,
        );
        let tip = (
            start.0 + ux * self.config.search_length,
            start.1 + uy * self.config.search_length,
        );
        let base = self.config.base_half_width;
        let narrow = self.config.tip_half_width;

        let corners = [
            (start.0 + nx * base, start.1 + ny * base),
            (start.0 - nx * base, start.1 - ny * base),
            (tip.0 - nx * narrow, tip.1 - ny * narrow),
            (tip.0 + nx * narrow, tip.1 + ny * narrow),
        ];
        let polygon: Vec<Point<i32>> = corners
            .iter()
            .map(|&(x, y)| Point::new(x.round() as i32, y.round() as i32))
            .collect();
        // The polygon filler rejects closed paths.
        if polygon.first() == polygon.last() {
            return;
        }
        draw_polygon_mut(search_mask, &polygon, Luma([mask::ON]));
    }
}

/// Locates the wider end of a pin body along its principal axis.
pub fn wide_end(body: &Region) -> Option<BodyEnd> {
    let axes = principal_axes(&body.pixels)?;
    let projected: Vec<(f64, f64)> = body.pixels.iter().map(|&p| axes.project(p)).collect();

    let (min_along, max_along) = projected
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &(along, _)| {
            (lo.min(along), hi.max(along))
        });
    if !min_along.is_finite() || !max_along.is_finite() {
        return None;
    }
    let strip = MIN_STRIP_WIDTH.max(STRIP_FRACTION * (max_along - min_along).max(1.0));

    let low = widest_section(&projected, min_along, min_along + strip);
    let high = widest_section(&projected, max_along - strip, max_along);
    let ((along, across, width), sign) = match (low, high) {
        (Some(low), Some(high)) if high.2 >= low.2 => (high, 1.0),
        (Some(low), _) => (low, -1.0),
        (None, Some(high)) => (high, 1.0),
        (None, None) => return None,
    };

    Some(BodyEnd {
        origin: axes.point_at(along, across),
        direction: (axes.major.0 * sign, axes.major.1 * sign),
        width,
    })
}

/// Widest cross-section between `from` and `to` along the axis.
/// Returns (along, across-center, width).
fn widest_section(projected: &[(f64, f64)], from: f64, to: f64) -> Option<(f64, f64, f64)> {
    // One bin per pixel step along the axis; BTreeMap keeps ties resolved in axis order.
    let mut sections: BTreeMap<i64, (f64, f64)> = BTreeMap::new();
    for &(along, across) in projected {
        if along < from || along > to {
            continue;
        }
        let entry = sections.entry(along.round() as i64).or_insert((across, across));
        entry.0 = entry.0.min(across);
        entry.1 = entry.1.max(across);
    }

    let mut best: Option<(f64, f64, f64)> = None;
    for (bin, (lo, hi)) in sections {
        let width = hi - lo;
        if width <= 0.0 {
            continue;
        }
        if best.is_none_or(|(_, _, w)| width > w) {
            best = Some((bin as f64, (lo + hi) / 2.0, width));
        }
    }
    best
}
