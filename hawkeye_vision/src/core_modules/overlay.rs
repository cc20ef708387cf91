// THEORY:
// Overlays are for people, not for the pipeline. Nothing downstream reads them, so
// they are rendered only on request, after every decision has been made, and handed
// back as PNG bytes for whoever stores them.
//
// Four rasters are drawn over copies of the input photo:
// - `areas`:  detected wall positions (vertical magenta, horizontal green);
// - `pins`:   pin outlines by category (green ok, orange one defect, red both);
// - `boxes`:  compartment frames by occupancy (red empty, green single, orange many);
// - `shafts`: shaft outlines by verdict (green approved, red rejected, purple
//             borderline) with the measured axis in blue.

use crate::core_modules::compartment::{Compartment, Occupancy};
use crate::core_modules::grid_detector::GridDetection;
use crate::core_modules::pin_detector::{DetectedPin, PinCategory, PinClassification};
use crate::core_modules::region::Region;
use crate::core_modules::shaft_analyzer::{ShaftClassification, ShaftVerdict};
use crate::error::InspectionError;
use crate::image_id::ArtifactKind;
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::rect::Rect;
use std::collections::HashSet;
use std::io::Cursor;

const MAGENTA: Rgb<u8> = Rgb([255, 0, 255]);
const GREEN: Rgb<u8> = Rgb([0, 255, 0]);
const ORANGE: Rgb<u8> = Rgb([255, 165, 0]);
const RED: Rgb<u8> = Rgb([255, 0, 0]);
const PURPLE: Rgb<u8> = Rgb([128, 0, 128]);
const BLUE: Rgb<u8> = Rgb([0, 0, 255]);

/// PNG-encoded overlay rasters for one image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Overlays {
    pub areas: Vec<u8>,
    pub pins: Vec<u8>,
    pub boxes: Vec<u8>,
    pub shafts: Vec<u8>,
}

impl Overlays {
    pub fn get(&self, kind: ArtifactKind) -> &[u8] {
        match kind {
            ArtifactKind::Areas => &self.areas,
            ArtifactKind::Pins => &self.pins,
            ArtifactKind::Boxes => &self.boxes,
            ArtifactKind::Shafts => &self.shafts,
        }
    }
}

/// Everything the overlays depict, borrowed from one pipeline run.
pub struct OverlayInputs<'a> {
    pub image: &'a RgbImage,
    pub grid: &'a GridDetection,
    pub detected_pins: &'a [DetectedPin],
    pub pin_classification: &'a PinClassification,
    pub compartments: &'a [Compartment],
    pub shaft_regions: &'a [Region],
    pub shaft_classification: &'a ShaftClassification,
}

pub fn render(inputs: &OverlayInputs<'_>) -> Result<Overlays, InspectionError> {
    Ok(Overlays {
        areas: encode_png(&draw_areas(inputs))?,
        pins: encode_png(&draw_pins(inputs))?,
        boxes: encode_png(&draw_boxes(inputs))?,
        shafts: encode_png(&draw_shafts(inputs))?,
    })
}

fn encode_png(image: &RgbImage) -> Result<Vec<u8>, InspectionError> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(InspectionError::Encode)?;
    Ok(bytes)
}

fn draw_areas(inputs: &OverlayInputs<'_>) -> RgbImage {
    let mut canvas = inputs.image.clone();
    let (width, height) = canvas.dimensions();
    for &x in &inputs.grid.x_positions {
        for dx in [0.0, 1.0] {
            let x = x as f32 + dx;
            draw_line_segment_mut(&mut canvas, (x, 0.0), (x, height as f32), MAGENTA);
        }
    }
    for &y in &inputs.grid.y_positions {
        for dy in [0.0, 1.0] {
            let y = y as f32 + dy;
            draw_line_segment_mut(&mut canvas, (0.0, y), (width as f32, y), GREEN);
        }
    }
    canvas
}

fn draw_pins(inputs: &OverlayInputs<'_>) -> RgbImage {
    let mut canvas = inputs.image.clone();
    for (detected, pin) in inputs.detected_pins.iter().zip(&inputs.pin_classification.pins) {
        let color = match pin.category {
            PinCategory::Ok => GREEN,
            PinCategory::WrongColor | PinCategory::Damaged => ORANGE,
            PinCategory::DoubleDefect => RED,
        };
        paint_outline(&mut canvas, &detected.region, color);
    }
    canvas
}

fn draw_boxes(inputs: &OverlayInputs<'_>) -> RgbImage {
    let mut canvas = inputs.image.clone();
    for compartment in inputs.compartments {
        let color = match compartment.occupancy {
            Occupancy::Empty => RED,
            Occupancy::Single => GREEN,
            Occupancy::Multiple => ORANGE,
        };
        let bbox = compartment.bbox;
        if bbox.width == 0 || bbox.height == 0 {
            continue;
        }
        draw_hollow_rect_mut(
            &mut canvas,
            Rect::at(bbox.x as i32, bbox.y as i32).of_size(bbox.width, bbox.height),
            color,
        );
        if bbox.width > 2 && bbox.height > 2 {
            draw_hollow_rect_mut(
                &mut canvas,
                Rect::at(bbox.x as i32 + 1, bbox.y as i32 + 1)
                    .of_size(bbox.width - 2, bbox.height - 2),
                color,
            );
        }
    }
    canvas
}

fn draw_shafts(inputs: &OverlayInputs<'_>) -> RgbImage {
    let mut canvas = inputs.image.clone();
    for (region, shaft) in inputs.shaft_regions.iter().zip(&inputs.shaft_classification.shafts) {
        let color = match shaft.verdict {
            ShaftVerdict::Approved => GREEN,
            ShaftVerdict::RejectedPrimary => RED,
            ShaftVerdict::RejectedSecondary => PURPLE,
        };
        paint_outline(&mut canvas, region, color);
        let [start, end] = shaft.geometry.endpoints;
        draw_line_segment_mut(
            &mut canvas,
            (start.0 as f32, start.1 as f32),
            (end.0 as f32, end.1 as f32),
            BLUE,
        );
    }
    canvas
}

/// Colors every region pixel that has a 4-neighbor outside the region.
fn paint_outline(canvas: &mut RgbImage, region: &Region, color: Rgb<u8>) {
    let members: HashSet<(u32, u32)> = region.pixels.iter().map(|p| (p.x, p.y)).collect();
    let is_member = |x: i64, y: i64| x >= 0 && y >= 0 && members.contains(&(x as u32, y as u32));

    for point in &region.pixels {
        let (x, y) = (point.x as i64, point.y as i64);
        let interior = is_member(x - 1, y)
            && is_member(x + 1, y)
            && is_member(x, y - 1)
            && is_member(x, y + 1);
        if !interior && point.x < canvas.width() && point.y < canvas.height() {
            canvas.put_pixel(point.x, point.y, color);
        }
    }
}
