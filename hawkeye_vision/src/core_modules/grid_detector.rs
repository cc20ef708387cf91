// THEORY:
// The `grid_detector` finds the compartment walls of a carrier tray and turns them
// into a list of rectangular cells.
//
// The tray walls are bright, long and almost axis-aligned, so the detector works on
// straight lines rather than on regions:
// 1.  **Normalize**: grayscale, Gaussian blur, Otsu binarization and a closing pass
//     turn the photo into a clean two-level picture of walls and background.
// 2.  **Edges & Lines**: Canny edges feed a Hough transform. Each wall produces two
//     parallel edge lines (one per side), sometimes more where the wall is worn.
// 3.  **Axis Filter**: only lines leaning less than `max_skew_degrees` from vertical
//     or horizontal survive. Each is evaluated where it crosses the image center, so
//     a slightly tilted wall still gets a single representative position.
// 4.  **Support Check**: the Hough accumulator counts votes along the whole infinite
//     line, so pins lined up in a column add up to a "wall" that does not exist. The
//     edge map is walked along every surviving line, and the line is kept only if it
//     has a stretch of at least `min_line_length` pixels with no gap longer than
//     `max_line_gap`. A perpendicular wall or pin edge only touches the line for a
//     pixel or two; such short touches are not support and do not bridge gaps.
// 5.  **Grouping**: sorted positions are merged while they sit within
//     `group_tolerance` of the running group mean, and a group is only emitted when
//     it lies more than `min_line_spacing` from the previous wall. This collapses the
//     double edges of one wall and ignores stray lines too close to a real one.
// 6.  **Cells**: consecutive wall positions bound the compartments, enumerated
//     row-major (top row first, left to right).
//
// Grid coordinates are assigned by `assign_grid`, which is also usable on boxes that
// come from somewhere else.

use crate::config::GridConfig;
use crate::core_modules::mask::mask;
use crate::core_modules::region::BoundingBox;
use image::{GrayImage, RgbImage};
use imageproc::hough::{LineDetectionOptions, PolarLine, detect_lines};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Fewer consecutive edge samples than this are a perpendicular crossing.
const MIN_EDGE_STRETCH: u32 = 3;

/// Wall positions found in one image and the cells between them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridDetection {
    /// Vertical wall x positions, ascending.
    pub x_positions: Vec<u32>,
    /// Horizontal wall y positions, ascending.
    pub y_positions: Vec<u32>,
    /// Cells in row-major order. Empty when fewer than two walls were found on either axis.
    pub cells: Vec<BoundingBox>,
}

/// A box placed on the logical grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridCell {
    pub grid_row: u32,
    pub grid_col: u32,
    pub bbox: BoundingBox,
}

pub struct GridDetector {
    config: GridConfig,
}

impl GridDetector {
    pub fn new(config: GridConfig) -> Self {
        Self { config }
    }

    pub fn detect(&self, image: &RgbImage) -> GridDetection {
        let gray = mask::grayscale(image);
        let blurred = imageproc::filter::gaussian_blur_f32(&gray, self.config.blur_sigma);
        let level = imageproc::contrast::otsu_level(&blurred);
        let binary = mask::binarize(&blurred, level);
        let closed = mask::close(&binary, self.config.close_radius);
        let edges = imageproc::edges::canny(&closed, self.config.canny_low, self.config.canny_high);

        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: self.config.hough_vote_threshold,
                suppression_radius: self.config.hough_suppression_radius,
            },
        );

        let (vertical, horizontal) = self.split_by_axis(&lines, &edges);
        debug!(
            otsu_level = level,
            lines = lines.len(),
            vertical = vertical.len(),
            horizontal = horizontal.len(),
            "Hough lines classified"
        );

        let tolerance = self.config.group_tolerance;
        let spacing = self.config.min_line_spacing;
        let x_positions = group_positions(&vertical, tolerance, spacing);
        let y_positions = group_positions(&horizontal, tolerance, spacing);
        let cells = cells_from_positions(&x_positions, &y_positions);

        GridDetection {
            x_positions,
            y_positions,
            cells,
        }
    }

    /// Returns (vertical x positions, horizontal y positions) at the image center,
    /// keeping only lines with enough contiguous edge support.
    fn split_by_axis(&self, lines: &[PolarLine], edges: &GrayImage) -> (Vec<f64>, Vec<f64>) {
        let (width, height) = edges.dimensions();
        let skew = self.config.max_skew_degrees;
        let center_x = width as f64 / 2.0;
        let center_y = height as f64 / 2.0;
        let mut vertical = Vec::new();
        let mut horizontal = Vec::new();

        for line in lines {
            let angle = line.angle_in_degrees % 180;
            let theta = (angle as f64).to_radians();
            let r = line.r as f64;

            // The line satisfies x*cos(theta) + y*sin(theta) = r.
            let axis = if angle <= skew || angle >= 180 - skew {
                LineAxis::Vertical
            } else if angle.abs_diff(90) <= skew {
                LineAxis::Horizontal
            } else {
                continue;
            };
            if longest_supported_run(edges, line, axis, self.config.max_line_gap)
                < self.config.min_line_length
            {
                continue;
            }

            match axis {
                LineAxis::Vertical => {
                    let x = (r - center_y * theta.sin()) / theta.cos();
                    if (0.0..width as f64).contains(&x) {
                        vertical.push(x);
                    }
                }
                LineAxis::Horizontal => {
                    let y = (r - center_x * theta.cos()) / theta.sin();
                    if (0.0..height as f64).contains(&y) {
                        horizontal.push(y);
                    }
                }
            }
        }

        (vertical, horizontal)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineAxis {
    Vertical,
    Horizontal,
}

/// Length of the longest stretch of edge pixels along `line` in which no gap
/// exceeds `max_gap` samples.
///
/// Vertical lines are sampled once per row, horizontal lines once per column. A
/// sample hits when an edge pixel lies within one pixel of the line; only runs of
/// at least `MIN_EDGE_STRETCH` consecutive hits count as support.
pub fn longest_supported_run(
    edges: &GrayImage,
    line: &PolarLine,
    axis: LineAxis,
    max_gap: u32,
) -> u32 {
    let (width, height) = edges.dimensions();
    let theta = ((line.angle_in_degrees % 180) as f64).to_radians();
    let r = line.r as f64;
    let samples = match axis {
        LineAxis::Vertical => height,
        LineAxis::Horizontal => width,
    };

    let hits: Vec<bool> = (0..samples)
        .map(|t| {
            let along = t as f64;
            match axis {
                LineAxis::Vertical => {
                    let x = (r - along * theta.sin()) / theta.cos();
                    edge_near(edges, x.round() as i64, t as i64, (1, 0))
                }
                LineAxis::Horizontal => {
                    let y = (r - along * theta.cos()) / theta.sin();
                    edge_near(edges, t as i64, y.round() as i64, (0, 1))
                }
            }
        })
        .collect();

    let mut best = 0;
    // (first sample, last sample) of the current supported stretch.
    let mut stretch: Option<(u32, u32)> = None;
    let mut t = 0;
    while t < samples {
        if !hits[t as usize] {
            t += 1;
            continue;
        }
        let begin = t;
        while t < samples && hits[t as usize] {
            t += 1;
        }
        let end = t - 1;
        if end - begin + 1 < MIN_EDGE_STRETCH {
            continue;
        }
        let start = match stretch {
            Some((start, last)) if begin - last - 1 <= max_gap => start,
            _ => begin,
        };
        stretch = Some((start, end));
        best = best.max(end - start + 1);
    }
    best
}

/// True when `(x, y)` or one of its two neighbors along `step` is an edge pixel.
fn edge_near(edges: &GrayImage, x: i64, y: i64, step: (i64, i64)) -> bool {
    let (width, height) = edges.dimensions();
    (-1..=1).any(|k| {
        let (px, py) = (x + k * step.0, y + k * step.1);
        px >= 0
            && py >= 0
            && px < width as i64
            && py < height as i64
            && edges.get_pixel(px as u32, py as u32)[0] != 0
    })
}

/// Merges nearby line positions into wall positions.
///
/// Positions are sorted; each joins the current group while it is strictly within
/// `tolerance` of the group mean. A closed group yields its truncated mean, which is
/// kept only if it is more than `min_spacing` away from the last kept position.
pub fn group_positions(coords: &[f64], tolerance: f64, min_spacing: f64) -> Vec<u32> {
    let mut sorted: Vec<f64> = coords
        .iter()
        .copied()
        .filter(|c| c.is_finite() && *c >= 0.0)
        .collect();
    if sorted.is_empty() {
        return Vec::new();
    }
    sorted.sort_by(f64::total_cmp);

    let mut grouped: Vec<u32> = Vec::new();
    let emit = |group_sum: f64, group_len: usize, grouped: &mut Vec<u32>| {
        let mean = (group_sum / group_len as f64) as u32;
        match grouped.last() {
            Some(&last) if (mean.abs_diff(last) as f64) <= min_spacing => {}
            _ => grouped.push(mean),
        }
    };

    let mut group_sum = sorted[0];
    let mut group_len = 1usize;
    for &coord in &sorted[1..] {
        if (coord - group_sum / group_len as f64).abs() < tolerance {
            group_sum += coord;
            group_len += 1;
        } else {
            emit(group_sum, group_len, &mut grouped);
            group_sum = coord;
            group_len = 1;
        }
    }
    emit(group_sum, group_len, &mut grouped);

    grouped
}

/// Cells bounded by consecutive wall positions, row-major.
pub fn cells_from_positions(x_positions: &[u32], y_positions: &[u32]) -> Vec<BoundingBox> {
    if x_positions.len() < 2 || y_positions.len() < 2 {
        return Vec::new();
    }
    y_positions
        .windows(2)
        .flat_map(|rows| {
            x_positions.windows(2).map(move |cols| {
                BoundingBox::new(cols[0], rows[0], cols[1] - cols[0], rows[1] - rows[0])
            })
        })
        .collect()
}

/// Places `boxes` (already in row-major order) on a grid with `hint` columns, or
/// `ceil(sqrt(n))` columns when no hint is given.
pub fn assign_grid(boxes: &[BoundingBox], hint: Option<u32>) -> Vec<GridCell> {
    if boxes.is_empty() {
        return Vec::new();
    }
    let columns = hint
        .filter(|&c| c > 0)
        .unwrap_or_else(|| (boxes.len() as f64).sqrt().ceil() as u32)
        .max(1);

    boxes
        .iter()
        .enumerate()
        .map(|(index, bbox)| {
            let index = index as u32;
            GridCell {
                grid_row: index / columns,
                grid_col: index % columns,
                bbox: *bbox,
            }
        })
        .collect()
}
