// THEORY:
// A compartment is one cell of the tray grid together with the number of pins that
// landed in it. Exactly one pin per compartment is the only acceptable state: an
// empty cell is a missing pin, a crowded cell is an extra pin.
//
// A pin belongs to a compartment when the center of its bounding box lies strictly
// inside the compartment box. Pins sitting exactly on a wall belong to neither cell,
// and carry no compartment in the report.

use crate::core_modules::grid_detector::GridCell;
use crate::core_modules::pin_detector::Pin;
use crate::core_modules::region::BoundingBox;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Occupancy {
    Empty,
    Single,
    Multiple,
}

impl Occupancy {
    pub fn from_pins_count(pins_count: u32) -> Self {
        match pins_count {
            0 => Occupancy::Empty,
            1 => Occupancy::Single,
            _ => Occupancy::Multiple,
        }
    }
}

/// Grid identity of a compartment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CompartmentRef {
    pub grid_row: u32,
    pub grid_col: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Compartment {
    pub grid_row: u32,
    pub grid_col: u32,
    pub bbox: BoundingBox,
    pub pins_count: u32,
    pub occupancy: Occupancy,
}

impl Compartment {
    pub fn new(cell: GridCell, pins_count: u32) -> Self {
        Self {
            grid_row: cell.grid_row,
            grid_col: cell.grid_col,
            bbox: cell.bbox,
            pins_count,
            occupancy: Occupancy::from_pins_count(pins_count),
        }
    }

    pub fn is_valid(&self) -> bool {
        self.occupancy == Occupancy::Single
    }

    pub fn has_defect(&self) -> bool {
        !self.is_valid()
    }

    pub fn grid_ref(&self) -> CompartmentRef {
        CompartmentRef {
            grid_row: self.grid_row,
            grid_col: self.grid_col,
        }
    }
}

/// Number of pin boxes whose integer center lies strictly inside `bbox`.
pub fn pins_in(bbox: &BoundingBox, pin_boxes: &[BoundingBox]) -> u32 {
    pin_boxes
        .iter()
        .filter(|pin| {
            let (cx, cy) = pin.center();
            bbox.contains_strictly(cx, cy)
        })
        .count() as u32
}

/// Builds the compartment list for an image, one entry per grid cell, and records
/// on every pin the compartment it sits in.
pub fn fill_compartments(cells: &[GridCell], pins: &mut [Pin]) -> Vec<Compartment> {
    for pin in pins.iter_mut() {
        let (cx, cy) = pin.bbox.center();
        pin.compartment = cells
            .iter()
            .find(|cell| cell.bbox.contains_strictly(cx, cy))
            .map(|cell| CompartmentRef {
                grid_row: cell.grid_row,
                grid_col: cell.grid_col,
            });
    }

    let pin_boxes: Vec<BoundingBox> = pins.iter().map(|pin| pin.bbox).collect();
    cells
        .iter()
        .map(|cell| Compartment::new(*cell, pins_in(&cell.bbox, &pin_boxes)))
        .collect()
}

/// Occupancy counts over all compartments of one image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxSummary {
    pub total_boxes: u32,
    pub empty_boxes: u32,
    pub single_pin_boxes: u32,
    pub multiple_pins_boxes: u32,
}

impl BoxSummary {
    pub fn from_compartments(compartments: &[Compartment]) -> Self {
        let mut summary = BoxSummary {
            total_boxes: compartments.len() as u32,
            ..Default::default()
        };
        for compartment in compartments {
            match compartment.occupancy {
                Occupancy::Empty => summary.empty_boxes += 1,
                Occupancy::Single => summary.single_pin_boxes += 1,
                Occupancy::Multiple => summary.multiple_pins_boxes += 1,
            }
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::pin_detector::{PinCategory, PinColor};

    fn pin(index: usize, bbox: BoundingBox) -> Pin {
        Pin {
            index,
            area: (bbox.width * bbox.height) as usize,
            bbox,
            centroid: (0.0, 0.0),
            color: PinColor::Reference,
            damaged: false,
            category: PinCategory::Ok,
            compartment: None,
        }
    }

    fn cell(row: u32, col: u32) -> GridCell {
        GridCell {
            grid_row: row,
            grid_col: col,
            bbox: BoundingBox::new(col * 100, row * 100, 100, 100),
        }
    }

    #[test]
    fn occupancy_is_pure_in_count() {
        assert_eq!(Occupancy::from_pins_count(0), Occupancy::Empty);
        assert_eq!(Occupancy::from_pins_count(1), Occupancy::Single);
        for n in 2..10 {
            assert_eq!(Occupancy::from_pins_count(n), Occupancy::Multiple);
        }
    }

    #[test]
    fn validity_flags_are_complementary() {
        for n in 0..4 {
            let compartment = Compartment::new(cell(0, 0), n);
            assert_ne!(compartment.is_valid(), compartment.has_defect());
            assert_eq!(compartment.is_valid(), n == 1);
        }
    }

    #[test]
    fn pins_on_the_wall_are_not_counted() {
        let bbox = BoundingBox::new(100, 0, 100, 100);
        // Centers at (150, 50), (100, 50) and (200, 50).
        let pins = [
            BoundingBox::new(140, 40, 20, 20),
            BoundingBox::new(90, 40, 20, 20),
            BoundingBox::new(190, 40, 20, 20),
        ];
        assert_eq!(pins_in(&bbox, &pins), 1);
    }

    #[test]
    fn summary_counts_each_state() {
        let mut pins = [
            pin(0, BoundingBox::new(40, 40, 20, 20)),
            pin(1, BoundingBox::new(130, 30, 20, 20)),
            pin(2, BoundingBox::new(160, 60, 20, 20)),
        ];
        let compartments = fill_compartments(&[cell(0, 0), cell(0, 1), cell(0, 2)], &mut pins);
        let summary = BoxSummary::from_compartments(&compartments);
        assert_eq!(
            summary,
            BoxSummary {
                total_boxes: 3,
                empty_boxes: 1,
                single_pin_boxes: 1,
                multiple_pins_boxes: 1
            }
        );
        assert_eq!(compartments[1].pins_count, 2);
        assert_eq!(compartments[1].occupancy, Occupancy::Multiple);
    }

    #[test]
    fn pins_learn_their_compartment() {
        let mut pins = [
            // Center (50, 50), inside r0c0.
            pin(0, BoundingBox::new(40, 40, 20, 20)),
            // Center (150, 150), inside r1c1.
            pin(1, BoundingBox::new(140, 140, 20, 20)),
            // Center (100, 50), on the wall between r0c0 and r0c1.
            pin(2, BoundingBox::new(90, 40, 20, 20)),
        ];
        let cells = [cell(0, 0), cell(0, 1), cell(1, 0), cell(1, 1)];
        let compartments = fill_compartments(&cells, &mut pins);

        assert_eq!(pins[0].compartment, Some(CompartmentRef { grid_row: 0, grid_col: 0 }));
        assert_eq!(pins[1].compartment, Some(CompartmentRef { grid_row: 1, grid_col: 1 }));
        assert_eq!(pins[2].compartment, None);
        assert_eq!(compartments[0].grid_ref(), CompartmentRef { grid_row: 0, grid_col: 0 });
        assert_eq!(compartments[0].pins_count, 1);
        assert_eq!(compartments[1].pins_count, 0);
    }
}
