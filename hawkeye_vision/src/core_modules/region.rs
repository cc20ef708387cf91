// THEORY:
// A `Region` is the spatial unit every detector hands around: one connected set of
// foreground pixels from a binary mask, plus the summary numbers the classifiers
// need (area, bounding box, centroid). It plays the role a blob plays in a motion
// engine, except that here the pixels themselves are kept, because the shaft
// analyzer measures geometry over the full pixel set.
//
// Like `Pixel`, it is a "dumb" data container. Building it is the job of the
// `region_detector`; interpreting it is the job of the pin and shaft modules.

use serde::{Deserialize, Serialize};

/// A 2D pixel coordinate in image space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Point {
    pub x: u32,
    pub y: u32,
}

/// An axis-aligned box in image pixel space: top-left corner plus size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BoundingBox {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Integer center, `x + width / 2` and `y + height / 2`.
    pub fn center(&self) -> (u32, u32) {
        (self.x + self.width / 2, self.y + self.height / 2)
    }

    /// True when the point lies strictly inside the box (edges excluded).
    pub fn contains_strictly(&self, px: u32, py: u32) -> bool {
        self.x < px && px < self.x + self.width && self.y < py && py < self.y + self.height
    }
}

/// One connected group of foreground pixels.
#[derive(Debug, Clone, PartialEq)]
pub struct Region {
    /// Sequential id within the mask it came from. Not persistent across images.
    pub id: u32,
    /// Tight box around every pixel of the region.
    pub bounding_box: BoundingBox,
    /// Every pixel of the region, in discovery order.
    pub pixels: Vec<Point>,
    /// The mean pixel position.
    pub centroid: (f64, f64),
}

impl Region {
    pub fn from_pixels(id: u32, pixels: Vec<Point>) -> Self {
        let mut min_x = u32::MAX;
        let mut min_y = u32::MAX;
        let mut max_x = 0;
        let mut max_y = 0;
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;

        for point in &pixels {
            min_x = min_x.min(point.x);
            min_y = min_y.min(point.y);
            max_x = max_x.max(point.x);
            max_y = max_y.max(point.y);
            sum_x += point.x as f64;
            sum_y += point.y as f64;
        }

        let count = pixels.len().max(1) as f64;
        let bounding_box = if pixels.is_empty() {
            BoundingBox::new(0, 0, 0, 0)
        } else {
            BoundingBox::new(min_x, min_y, max_x - min_x + 1, max_y - min_y + 1)
        };

        Self {
            id,
            bounding_box,
            centroid: (sum_x / count, sum_y / count),
            pixels,
        }
    }

    /// Pixel count of the region.
    pub fn area(&self) -> usize {
        self.pixels.len()
    }
}
