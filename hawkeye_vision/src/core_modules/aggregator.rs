// THEORY:
// The `aggregator` is the last stage of an inspection. It never looks at pixels; it
// only combines the outputs of the grid, pin and shaft stages into the per-image
// verdict and the defect ledger.
//
// The defect count is a plain sum over the occupancy, pin and shaft tallies:
//
//     defects = empty boxes + crowded boxes + invalid pins + critical pins + rejected shafts
//
// Critical (double-defect) pins are already part of the invalid pins, so they weigh
// twice. An image is valid exactly when that sum is zero. Every boolean flag is
// derived from one count and nothing else.
//
// The ledger lists defects either once per category (the persisted format) or once
// per offending pin or shaft. Occupancy defects always carry the compartment they
// were found in.

use crate::config::DefectGranularity;
use crate::core_modules::compartment::{BoxSummary, Compartment, CompartmentRef, Occupancy};
use crate::core_modules::pin_detector::{PinCategory, PinClassification};
use crate::core_modules::shaft_analyzer::{ShaftClassification, ShaftVerdict};
use crate::image_id::ImageId;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DefectType {
    MissingPin,
    ExtraPin,
    DamagedPin,
    WrongColor,
    DoubleDefect,
    ShaftDefect,
    ShaftBorderline,
}

impl DefectType {
    pub fn code(&self) -> &'static str {
        match self {
            DefectType::MissingPin => "MISSING_PIN",
            DefectType::ExtraPin => "EXTRA_PIN",
            DefectType::DamagedPin => "DAMAGED_PIN",
            DefectType::WrongColor => "WRONG_COLOR",
            DefectType::DoubleDefect => "DOUBLE_DEFECT",
            DefectType::ShaftDefect => "SHAFT_DEFECT",
            DefectType::ShaftBorderline => "SHAFT_BORDERLINE",
        }
    }

    /// 1 (cosmetic) to 5 (part unusable).
    pub fn severity(&self) -> u8 {
        match self {
            DefectType::DoubleDefect => 5,
            DefectType::MissingPin | DefectType::ShaftDefect => 4,
            DefectType::ExtraPin | DefectType::DamagedPin => 3,
            DefectType::WrongColor | DefectType::ShaftBorderline => 2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DefectRecord {
    pub defect_type: DefectType,
    pub severity: u8,
    pub compartment: Option<CompartmentRef>,
    /// Index of the pin or shaft, in per-instance ledgers.
    pub instance: Option<usize>,
}

impl DefectRecord {
    fn new(defect_type: DefectType) -> Self {
        Self {
            defect_type,
            severity: defect_type.severity(),
            compartment: None,
            instance: None,
        }
    }

    fn in_compartment(defect_type: DefectType, compartment: &Compartment) -> Self {
        Self {
            compartment: Some(compartment.grid_ref()),
            ..Self::new(defect_type)
        }
    }

    fn for_instance(
        defect_type: DefectType,
        instance: usize,
        compartment: Option<CompartmentRef>,
    ) -> Self {
        Self {
            compartment,
            instance: Some(instance),
            ..Self::new(defect_type)
        }
    }
}

/// Everything known about one inspected image. Built once, never modified.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InspectionResult {
    pub image_id: ImageId,
    pub compartments: Vec<Compartment>,
    pub box_summary: BoxSummary,
    pub pin_classification: PinClassification,
    pub shaft_classification: ShaftClassification,
    pub has_missing_pins: bool,
    pub has_extra_pins: bool,
    pub has_damaged_pins: bool,
    pub has_wrong_color_pins: bool,
    pub has_shaft_defects: bool,
    pub defects_count: u32,
    pub is_valid: bool,
}

/// The defect sum over the per-stage tallies.
pub fn count_defects(
    boxes: &BoxSummary,
    pins: &PinClassification,
    shafts: &ShaftClassification,
) -> u32 {
    boxes.empty_boxes
        + boxes.multiple_pins_boxes
        + pins.invalid_pins
        + pins.critical_pins
        + shafts.rejected_shafts
}

pub struct Aggregator;

impl Aggregator {
    pub fn aggregate(
        image_id: ImageId,
        compartments: Vec<Compartment>,
        pin_classification: PinClassification,
        shaft_classification: ShaftClassification,
    ) -> InspectionResult {
        let box_summary = BoxSummary::from_compartments(&compartments);
        let defects_count = count_defects(&box_summary, &pin_classification, &shaft_classification);

        InspectionResult {
            image_id,
            has_missing_pins: box_summary.empty_boxes > 0,
            has_extra_pins: box_summary.multiple_pins_boxes > 0,
            has_damaged_pins: pin_classification.pins_damaged > 0,
            has_wrong_color_pins: pin_classification.pins_wrong_color > 0,
            has_shaft_defects: shaft_classification.rejected_shafts > 0,
            defects_count,
            is_valid: defects_count == 0,
            compartments,
            box_summary,
            pin_classification,
            shaft_classification,
        }
    }

    pub fn defect_records(
        result: &InspectionResult,
        granularity: DefectGranularity,
    ) -> Vec<DefectRecord> {
        let mut records: Vec<DefectRecord> = result
            .compartments
            .iter()
            .filter_map(|compartment| {
                let defect_type = match compartment.occupancy {
                    Occupancy::Empty => DefectType::MissingPin,
                    Occupancy::Multiple => DefectType::ExtraPin,
                    Occupancy::Single => return None,
                };
                Some(DefectRecord::in_compartment(defect_type, compartment))
            })
            .collect();
        // Ledger order: missing before extra.
        records.sort_by_key(|record| record.defect_type);

        match granularity {
            DefectGranularity::PerCategory => {
                let pins = &result.pin_classification;
                let shafts = &result.shaft_classification;
                for (count, defect_type) in [
                    (pins.pins_damaged, DefectType::DamagedPin),
                    (pins.pins_wrong_color, DefectType::WrongColor),
                    (pins.pins_double_defect, DefectType::DoubleDefect),
                    (shafts.rejected_primary, DefectType::ShaftDefect),
                    (shafts.rejected_secondary, DefectType::ShaftBorderline),
                ] {
                    if count > 0 {
                        records.push(DefectRecord::new(defect_type));
                    }
                }
            }
            DefectGranularity::PerInstance => {
                for pin in &result.pin_classification.pins {
                    let defect_type = match pin.category {
                        PinCategory::Ok => continue,
                        PinCategory::Damaged => DefectType::DamagedPin,
                        PinCategory::WrongColor => DefectType::WrongColor,
                        PinCategory::DoubleDefect => DefectType::DoubleDefect,
                    };
                    records.push(DefectRecord::for_instance(
                        defect_type,
                        pin.index,
                        pin.compartment,
                    ));
                }
                for shaft in &result.shaft_classification.shafts {
                    let defect_type = match shaft.verdict {
                        ShaftVerdict::Approved => continue,
                        ShaftVerdict::RejectedPrimary => DefectType::ShaftDefect,
                        ShaftVerdict::RejectedSecondary => DefectType::ShaftBorderline,
                    };
                    records.push(DefectRecord::for_instance(defect_type, shaft.index, None));
                }
            }
        }

        records
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_modules::grid_detector::GridCell;
    use crate::core_modules::region::BoundingBox;
    use proptest::prelude::*;

    fn compartment(index: u32, pins_count: u32) -> Compartment {
        Compartment::new(
            GridCell {
                grid_row: index / 3,
                grid_col: index % 3,
                bbox: BoundingBox::new((index % 3) * 100, (index / 3) * 100, 100, 100),
            },
            pins_count,
        )
    }

    fn pins(ok: u32, wrong_color: u32, damaged: u32, double_defect: u32) -> PinClassification {
        let total = ok + wrong_color + damaged + double_defect;
        PinClassification {
            total_pins: total,
            pins_ok: ok,
            pins_wrong_color: wrong_color,
            pins_damaged: damaged,
            pins_double_defect: double_defect,
            valid_pins: ok,
            invalid_pins: total - ok,
            critical_pins: double_defect,
            average_area: 0.0,
            damaged_threshold: 0.0,
            pins: Vec::new(),
        }
    }

    fn shafts(primary: u32, secondary: u32) -> ShaftClassification {
        ShaftClassification {
            total_shafts: primary + secondary,
            rejected_shafts: primary + secondary,
            rejected_primary: primary,
            rejected_secondary: secondary,
            ..Default::default()
        }
    }

    fn image_id() -> ImageId {
        ImageId::from_bytes(b"tray")
    }

    #[test]
    fn six_compartment_scenario() {
        let compartments = vec![
            compartment(0, 0),
            compartment(1, 2),
            compartment(2, 1),
            compartment(3, 1),
            compartment(4, 1),
            compartment(5, 1),
        ];
        let result =
            Aggregator::aggregate(image_id(), compartments, pins(4, 0, 0, 0), shafts(0, 0));
        assert_eq!(result.defects_count, 2);
        assert!(!result.is_valid);
        assert!(result.has_missing_pins);
        assert!(result.has_extra_pins);
        assert!(!result.has_damaged_pins);
        assert!(!result.has_shaft_defects);

        let records = Aggregator::defect_records(&result, DefectGranularity::PerCategory);
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].defect_type, DefectType::MissingPin);
        assert_eq!(records[0].compartment, Some(CompartmentRef { grid_row: 0, grid_col: 0 }));
        assert_eq!(records[1].defect_type, DefectType::ExtraPin);
        assert_eq!(records[1].severity, 3);
        assert_eq!(records[1].compartment, Some(CompartmentRef { grid_row: 0, grid_col: 1 }));
    }

    #[test]
    fn category_ledger_has_one_row_per_category() {
        let compartments = (0..4).map(|i| compartment(i, 1)).collect();
        let result =
            Aggregator::aggregate(image_id(), compartments, pins(1, 2, 0, 1), shafts(1, 1));
        let records = Aggregator::defect_records(&result, DefectGranularity::PerCategory);
        let types: Vec<DefectType> = records.iter().map(|r| r.defect_type).collect();
        assert_eq!(
            types,
            vec![
                DefectType::WrongColor,
                DefectType::DoubleDefect,
                DefectType::ShaftDefect,
                DefectType::ShaftBorderline
            ]
        );
        assert!(records.iter().all(|r| r.compartment.is_none() && r.instance.is_none()));
        // 3 invalid + 1 critical + 2 shafts
        assert_eq!(result.defects_count, 6);
    }

    #[test]
    fn severities_stay_in_range() {
        for defect_type in [
            DefectType::MissingPin,
            DefectType::ExtraPin,
            DefectType::DamagedPin,
            DefectType::WrongColor,
            DefectType::DoubleDefect,
            DefectType::ShaftDefect,
            DefectType::ShaftBorderline,
        ] {
            assert!((1..=5).contains(&defect_type.severity()));
        }
        assert_eq!(
            serde_json::to_string(&DefectType::MissingPin).unwrap(),
            format!("\"{}\"", DefectType::MissingPin.code())
        );
    }

    proptest! {
        #[test]
        fn defect_count_is_the_exact_sum(
            occupancy in prop::collection::vec(0u32..4, 0..30),
            ok in 0u32..20,
            wrong_color in 0u32..20,
            damaged in 0u32..20,
            double_defect in 0u32..20,
            primary in 0u32..10,
            secondary in 0u32..10,
        ) {
            let compartments: Vec<Compartment> = occupancy
                .iter()
                .enumerate()
                .map(|(i, &n)| compartment(i as u32, n))
                .collect();
            let empty = occupancy.iter().filter(|&&n| n == 0).count() as u32;
            let multiple = occupancy.iter().filter(|&&n| n > 1).count() as u32;

            let result = Aggregator::aggregate(
                image_id(),
                compartments,
                pins(ok, wrong_color, damaged, double_defect),
                shafts(primary, secondary),
            );
            let expected = empty + multiple
                + (wrong_color + damaged + double_defect)
                + double_defect
                + primary + secondary;
            prop_assert_eq!(result.defects_count, expected);
            prop_assert_eq!(result.is_valid, expected == 0);
            prop_assert_eq!(result.has_missing_pins, empty > 0);
            prop_assert_eq!(result.has_extra_pins, multiple > 0);
            prop_assert_eq!(result.has_shaft_defects, primary + secondary > 0);
        }
    }

    #[test]
    fn instance_ledger_names_each_offender() {
        use crate::core_modules::pin_detector::{Pin, PinColor};
        let pin = |index: usize, category: PinCategory| Pin {
            index,
            area: 500,
            bbox: BoundingBox::new(0, 0, 10, 10),
            centroid: (5.0, 5.0),
            color: PinColor::Reference,
            damaged: matches!(category, PinCategory::Damaged | PinCategory::DoubleDefect),
            category,
            compartment: None,
        };
        let mut pin_summary = pins(1, 0, 2, 0);
        pin_summary.pins = vec![
            pin(0, PinCategory::Damaged),
            pin(1, PinCategory::Ok),
            pin(2, PinCategory::Damaged),
        ];
        let compartments = vec![compartment(0, 0), compartment(1, 1), compartment(2, 2)];
        let result = Aggregator::aggregate(image_id(), compartments, pin_summary, shafts(0, 0));

        let records = Aggregator::defect_records(&result, DefectGranularity::PerInstance);
        let summary: Vec<(DefectType, Option<usize>)> =
            records.iter().map(|r| (r.defect_type, r.instance)).collect();
        assert_eq!(
            summary,
            vec![
                (DefectType::MissingPin, None),
                (DefectType::ExtraPin, None),
                (DefectType::DamagedPin, Some(0)),
                (DefectType::DamagedPin, Some(2)),
            ]
        );
    }

    #[test]
    fn instance_records_carry_the_pin_compartment() {
        use crate::core_modules::compartment::fill_compartments;
        use crate::core_modules::pin_detector::{Pin, PinColor};

        let cells: Vec<GridCell> = (0..2)
            .map(|col| GridCell {
                grid_row: 0,
                grid_col: col,
                bbox: BoundingBox::new(col * 100, 0, 100, 100),
            })
            .collect();
        let mut pin_summary = pins(1, 0, 1, 0);
        pin_summary.pins = vec![
            Pin {
                index: 0,
                area: 120,
                bbox: BoundingBox::new(40, 40, 20, 20),
                centroid: (50.0, 50.0),
                color: PinColor::Reference,
                damaged: true,
                category: PinCategory::Damaged,
                compartment: None,
            },
            Pin {
                index: 1,
                area: 400,
                bbox: BoundingBox::new(140, 40, 20, 20),
                centroid: (150.0, 50.0),
                color: PinColor::Reference,
                damaged: false,
                category: PinCategory::Ok,
                compartment: None,
            },
        ];
        let compartments = fill_compartments(&cells, &mut pin_summary.pins);
        let result = Aggregator::aggregate(image_id(), compartments, pin_summary, shafts(0, 0));

        let records = Aggregator::defect_records(&result, DefectGranularity::PerInstance);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].defect_type, DefectType::DamagedPin);
        assert_eq!(records[0].instance, Some(0));
        assert_eq!(records[0].compartment, Some(CompartmentRef { grid_row: 0, grid_col: 0 }));
    }

    #[test]
    fn zero_defects_means_valid() {
        let compartments = (0..3).map(|i| compartment(i, 1)).collect();
        let result =
            Aggregator::aggregate(image_id(), compartments, pins(3, 0, 0, 0), shafts(0, 0));
        assert_eq!(result.defects_count, 0);
        assert!(result.is_valid);
        assert!(Aggregator::defect_records(&result, DefectGranularity::PerInstance).is_empty());
    }
}
