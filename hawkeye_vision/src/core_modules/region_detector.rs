// THEORY:
// The `region_detector` is the spatial grouping engine shared by the pin and shaft
// stages. It turns a binary mask into a list of `Region`s.
//
// Two entry points:
// 1.  **find_regions**: classic connected components by region growing. The mask is
//     scanned in raster order; every unvisited foreground pixel seeds a new region
//     that grows over its 8 neighbors with an explicit stack. Raster-order seeding
//     makes region ids and pixel order a pure function of the mask.
// 2.  **split_touching**: pins that touch in the tray merge into one component. To
//     pull them apart, the distance of every foreground pixel to the background is
//     computed, and pixels deeper than `split_factor` times the deepest pixel are
//     taken as sure-foreground "cores". Each core becomes a seed, and all seeds then
//     grow together, breadth first, back over the original mask. A pixel belongs to
//     whichever core's front reaches it first, which places the cut along the neck
//     between two pins. Components without a core are dropped as noise.
// 3.  **Stateless Utility**: both functions take a mask and return regions. Nothing
//     is remembered between calls.

use crate::core_modules::region::{Point, Region};

pub mod region_detector {
    use super::*;
    use crate::core_modules::mask::mask;
    use image::{GrayImage, Luma};
    use std::collections::VecDeque;

    const NEIGHBORS_8: [(i64, i64); 8] = [
        (-1, -1),
        (0, -1),
        (1, -1),
        (-1, 0),
        (1, 0),
        (-1, 1),
        (0, 1),
        (1, 1),
    ];
    const NEIGHBORS_4: [(i64, i64); 4] = [(0, -1), (-1, 0), (1, 0), (0, 1)];

    /// Labels every 8-connected foreground component of `mask`.
    pub fn find_regions(mask: &GrayImage) -> Vec<Region> {
        let (width, height) = mask.dimensions();
        let mut visited = vec![false; (width as usize) * (height as usize)];
        let mut regions = Vec::new();
        let mut region_id_counter = 0;

        for y in 0..height {
            for x in 0..width {
                let index = (y * width + x) as usize;
                if visited[index] || !mask::is_on(mask, x, y) {
                    continue;
                }
                let pixels = grow_region(mask, Point { x, y }, &mut visited);
                regions.push(Region::from_pixels(region_id_counter, pixels));
                region_id_counter += 1;
            }
        }

        regions
    }

    /// Depth-first growth over the 8-neighborhood, marking `visited` as it goes.
    fn grow_region(mask: &GrayImage, seed: Point, visited: &mut [bool]) -> Vec<Point> {
        let (width, height) = mask.dimensions();
        let mut region_pixels = Vec::new();
        let mut stack = vec![seed];
        visited[(seed.y * width + seed.x) as usize] = true;

        while let Some(current) = stack.pop() {
            region_pixels.push(current);

            for (dx, dy) in NEIGHBORS_8 {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let index = (ny * width + nx) as usize;
                if !visited[index] && mask::is_on(mask, nx, ny) {
                    visited[index] = true;
                    stack.push(Point { x: nx, y: ny });
                }
            }
        }

        region_pixels
    }

    /// Separates touching objects in `mask` by seeded growth from distance-transform cores.
    pub fn split_touching(mask: &GrayImage, split_factor: f64) -> Vec<Region> {
        let (width, height) = mask.dimensions();
        if mask::count(mask) == 0 {
            return Vec::new();
        }

        // Distance to the nearest background pixel: invert, then measure distance to "on".
        let background = GrayImage::from_fn(width, height, |x, y| {
            Luma([if mask::is_on(mask, x, y) { mask::OFF } else { mask::ON }])
        });
        let depth_squared =
            imageproc::distance_transform::euclidean_squared_distance_transform(&background);

        let mut max_depth_squared: f64 = 0.0;
        for y in 0..height {
            for x in 0..width {
                if mask::is_on(mask, x, y) {
                    let d = depth_squared.get_pixel(x, y)[0];
                    if d.is_finite() {
                        max_depth_squared = max_depth_squared.max(d);
                    }
                }
            }
        }

        // A mask without any background has no measurable depth; everything is core.
        let cutoff_squared = if max_depth_squared > 0.0 {
            split_factor * split_factor * max_depth_squared
        } else {
            -1.0
        };
        let cores = GrayImage::from_fn(width, height, |x, y| {
            let deep = mask::is_on(mask, x, y) && {
                let d = depth_squared.get_pixel(x, y)[0];
                !d.is_finite() || d > cutoff_squared
            };
            Luma([if deep { mask::ON } else { mask::OFF }])
        });

        let seeds = find_regions(&cores);
        if seeds.is_empty() {
            return Vec::new();
        }

        // Labels are 1-based; 0 means unclaimed.
        let mut labels = vec![0u32; (width as usize) * (height as usize)];
        let mut queue = VecDeque::new();
        for (seed_index, seed) in seeds.iter().enumerate() {
            for point in &seed.pixels {
                labels[(point.y * width + point.x) as usize] = seed_index as u32 + 1;
                queue.push_back(*point);
            }
        }

        while let Some(current) = queue.pop_front() {
            let label = labels[(current.y * width + current.x) as usize];
            for (dx, dy) in NEIGHBORS_4 {
                let nx = current.x as i64 + dx;
                let ny = current.y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= width as i64 || ny >= height as i64 {
                    continue;
                }
                let (nx, ny) = (nx as u32, ny as u32);
                let index = (ny * width + nx) as usize;
                if labels[index] == 0 && mask::is_on(mask, nx, ny) {
                    labels[index] = label;
                    queue.push_back(Point { x: nx, y: ny });
                }
            }
        }

        let mut grouped: Vec<Vec<Point>> = vec![Vec::new(); seeds.len()];
        for y in 0..height {
            for x in 0..width {
                let label = labels[(y * width + x) as usize];
                if label > 0 {
                    grouped[(label - 1) as usize].push(Point { x, y });
                }
            }
        }

        grouped
            .into_iter()
            .enumerate()
            .map(|(id, pixels)| Region::from_pixels(id as u32, pixels))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::region_detector::*;
    use crate::core_modules::mask::mask::{OFF, ON, count};
    use image::{GrayImage, Luma};

    fn paint_disc(mask: &mut GrayImage, cx: f64, cy: f64, radius: f64) {
        for y in 0..mask.height() {
            for x in 0..mask.width() {
                let dx = x as f64 - cx;
                let dy = y as f64 - cy;
                if dx * dx + dy * dy <= radius * radius {
                    mask.put_pixel(x, y, Luma([ON]));
                }
            }
        }
    }

    #[test]
    fn separate_components_get_separate_regions() {
        let mut mask = GrayImage::from_pixel(40, 20, Luma([OFF]));
        paint_disc(&mut mask, 8.0, 10.0, 4.0);
        paint_disc(&mut mask, 30.0, 10.0, 5.0);
        let regions = find_regions(&mask);
        assert_eq!(regions.len(), 2);
        // Ids follow raster order: the larger disc reaches a higher row, so it is seen first.
        assert_eq!(regions[0].id, 0);
        assert!(regions[0].centroid.0 > regions[1].centroid.0);
        assert!(regions[0].area() > regions[1].area());
    }

    #[test]
    fn diagonal_pixels_are_connected() {
        let mut mask = GrayImage::from_pixel(4, 4, Luma([OFF]));
        mask.put_pixel(0, 0, Luma([ON]));
        mask.put_pixel(1, 1, Luma([ON]));
        mask.put_pixel(2, 2, Luma([ON]));
        assert_eq!(find_regions(&mask).len(), 1);
    }

    #[test]
    fn empty_mask_yields_nothing() {
        let mask = GrayImage::from_pixel(10, 10, Luma([OFF]));
        assert!(find_regions(&mask).is_empty());
        assert!(split_touching(&mask, 0.2).is_empty());
    }

    #[test]
    fn touching_discs_are_split() {
        let mut mask = GrayImage::from_pixel(60, 30, Luma([OFF]));
        paint_disc(&mut mask, 18.0, 15.0, 10.0);
        paint_disc(&mut mask, 36.0, 15.0, 10.0);
        assert_eq!(find_regions(&mask).len(), 1);

        let split = split_touching(&mask, 0.7);
        assert_eq!(split.len(), 2);
        let total: usize = split.iter().map(|r| r.area()).sum();
        assert_eq!(total, count(&mask));
        assert!(split[0].centroid.0 < 27.0);
        assert!(split[1].centroid.0 > 27.0);
    }

    #[test]
    fn splitting_is_deterministic() {
        let mut mask = GrayImage::from_pixel(60, 30, Luma([OFF]));
        paint_disc(&mut mask, 18.0, 15.0, 10.0);
        paint_disc(&mut mask, 36.0, 15.0, 10.0);
        assert_eq!(split_touching(&mask, 0.7), split_touching(&mask, 0.7));
    }
}
