use hawkeye_vision::config::DefectGranularity;
use hawkeye_vision::core_modules::compartment::{CompartmentRef, Occupancy};
use hawkeye_vision::core_modules::shaft_analyzer::ShaftVerdict;
use hawkeye_vision::{
    ArtifactKind, BatchProcessor, BatchSummary, DefectType, ImageInput, ImageOutcome,
    InspectionConfig, InspectionPipeline,
};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

const WALL: Rgb<u8> = Rgb([235, 235, 235]);
const FLOOR: Rgb<u8> = Rgb([25, 25, 30]);
const YELLOW: Rgb<u8> = Rgb([230, 180, 20]);
const BLUE: Rgb<u8> = Rgb([20, 40, 150]);
const STEEL: Rgb<u8> = Rgb([200, 200, 205]);

fn reference_config() -> InspectionConfig {
    InspectionConfig::load(concat!(env!("CARGO_MANIFEST_DIR"), "/../config/reference_rig.toml"))
        .expect("reference rig config loads")
}

/// An empty tray with 6 px walls centered on `xs` and `ys`.
fn empty_tray(width: u32, height: u32, xs: &[u32], ys: &[u32]) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let on_wall = xs.iter().any(|&c| x + 3 >= c && x < c + 3)
            || ys.iter().any(|&c| y + 3 >= c && y < c + 3);
        if on_wall { WALL } else { FLOOR }
    })
}

fn fill(image: &mut RgbImage, x0: u32, y0: u32, width: u32, height: u32, color: Rgb<u8>) {
    for y in y0..y0 + height {
        for x in x0..x0 + width {
            image.put_pixel(x, y, color);
        }
    }
}

/// A 3x2 tray of 20x40 yellow pins. Walls at x = 20, 140, 260, 380 and y = 20, 140, 260.
fn tray(pins: &[(u32, u32)]) -> RgbImage {
    let mut image = empty_tray(400, 300, &[20, 140, 260, 380], &[20, 140, 260]);
    for &(px, py) in pins {
        fill(&mut image, px, py, 20, 40, YELLOW);
    }
    image
}

/// Cell 0 empty, cell 1 with two pins, the other four with one pin each.
fn defective_tray() -> RgbImage {
    tray(&[(160, 60), (220, 65), (310, 55), (70, 180), (190, 185), (305, 175)])
}

fn good_tray() -> RgbImage {
    tray(&[(75, 60), (190, 65), (310, 55), (70, 180), (190, 185), (305, 175)])
}

/// One pin per cell: two undersized, two blue.
/// Cell 1 holds a small yellow pin, cell 2 a full-size blue one and cell 3 a small
/// blue one. Mean area is 666.7, so the damage threshold is 444.4.
fn off_standard_tray() -> RgbImage {
    let mut image = empty_tray(400, 300, &[20, 140, 260, 380], &[20, 140, 260]);
    fill(&mut image, 70, 60, 20, 40, YELLOW);
    fill(&mut image, 190, 70, 20, 20, YELLOW);
    fill(&mut image, 310, 60, 20, 40, BLUE);
    fill(&mut image, 70, 190, 20, 20, BLUE);
    fill(&mut image, 190, 180, 20, 40, YELLOW);
    fill(&mut image, 310, 180, 20, 40, YELLOW);
    image
}

/// A 3x2 tray with 200 px cells: walls at x = 20, 220, 420, 620 and y = 20, 220, 420.
/// Each cell holds a 40x60 pin with a 4 px wide steel shaft hanging below it.
/// `shaft_lengths` are the drawn lengths, row-major; about 3 px of each hide under
/// the grown pin body.
fn shafted_tray(shaft_lengths: [u32; 6]) -> RgbImage {
    let mut image = empty_tray(640, 440, &[20, 220, 420, 620], &[20, 220, 420]);
    for (i, &length) in shaft_lengths.iter().enumerate() {
        let center = 120 + 200 * (i as u32 % 3);
        let top = 20 + 200 * (i as u32 / 3);
        fill(&mut image, center - 20, top + 20, 40, 60, YELLOW);
        fill(&mut image, center - 2, top + 81, 4, length, STEEL);
    }
    image
}

fn png(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .expect("png encodes");
    bytes
}

#[test]
fn test_defective_tray_counts() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let report = pipeline.inspect_bytes(&png(&defective_tray())).unwrap();
    let result = &report.result;

    assert_eq!(result.compartments.len(), 6);
    assert_eq!(result.compartments[0].occupancy, Occupancy::Empty);
    assert_eq!(result.compartments[1].occupancy, Occupancy::Multiple);
    assert_eq!(result.compartments[1].pins_count, 2);
    assert_eq!((result.compartments[4].grid_row, result.compartments[4].grid_col), (1, 1));

    assert_eq!(result.box_summary.empty_boxes, 1);
    assert_eq!(result.box_summary.multiple_pins_boxes, 1);
    assert_eq!(result.box_summary.single_pin_boxes, 4);
    assert_eq!(result.pin_classification.total_pins, 6);
    assert_eq!(result.pin_classification.pins_ok, 6);
    assert_eq!(result.shaft_classification.total_shafts, 0);

    assert_eq!(result.defects_count, 2);
    assert!(!result.is_valid);
    assert!(result.has_missing_pins);
    assert!(result.has_extra_pins);
    assert!(!result.has_damaged_pins);

    let types: Vec<DefectType> = report.defects.iter().map(|d| d.defect_type).collect();
    assert_eq!(types, vec![DefectType::MissingPin, DefectType::ExtraPin]);
    assert!(report.overlays.is_none());
}

#[test]
fn test_good_tray_is_valid() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let report = pipeline.inspect_bytes(&png(&good_tray())).unwrap();
    assert_eq!(report.result.defects_count, 0);
    assert!(report.result.is_valid);
    assert!(report.defects.is_empty());
}

#[test]
fn test_undersized_and_off_color_pins() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let report = pipeline.inspect_bytes(&png(&off_standard_tray())).unwrap();
    let result = &report.result;
    let pins = &result.pin_classification;

    assert_eq!(result.box_summary.single_pin_boxes, 6);
    assert_eq!(pins.total_pins, 6);
    assert_eq!(pins.pins_ok, 3);
    assert_eq!(pins.pins_damaged, 1);
    assert_eq!(pins.pins_wrong_color, 1);
    assert_eq!(pins.pins_double_defect, 1);
    assert_eq!(pins.invalid_pins, 3);
    assert_eq!(pins.critical_pins, 1);
    assert!((pins.damaged_threshold - 4000.0 / 9.0).abs() < 1.0);

    assert!(result.has_damaged_pins);
    assert!(result.has_wrong_color_pins);
    assert!(!result.has_missing_pins);
    assert!(!result.has_extra_pins);
    // Three invalid pins, the double defect counted a second time.
    assert_eq!(result.defects_count, 4);
    assert!(!result.is_valid);

    let types: Vec<DefectType> = report.defects.iter().map(|d| d.defect_type).collect();
    assert_eq!(
        types,
        vec![DefectType::DamagedPin, DefectType::WrongColor, DefectType::DoubleDefect]
    );
}

#[test]
fn test_instance_ledger_names_pin_compartments() {
    let mut config = reference_config();
    config.report.granularity = DefectGranularity::PerInstance;
    let pipeline = InspectionPipeline::new(config).unwrap();
    let report = pipeline.inspect_bytes(&png(&off_standard_tray())).unwrap();

    let at = |grid_row, grid_col| Some(CompartmentRef { grid_row, grid_col });
    let mut ledger: Vec<(DefectType, Option<CompartmentRef>)> = report
        .defects
        .iter()
        .map(|record| (record.defect_type, record.compartment))
        .collect();
    ledger.sort_by_key(|&(_, compartment)| compartment.map(|c| (c.grid_row, c.grid_col)));
    assert_eq!(
        ledger,
        vec![
            (DefectType::DamagedPin, at(0, 1)),
            (DefectType::WrongColor, at(0, 2)),
            (DefectType::DoubleDefect, at(1, 0)),
        ]
    );
    assert!(report.defects.iter().all(|record| record.instance.is_some()));
}

#[test]
fn test_shafted_tray_is_approved() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let report = pipeline.inspect_bytes(&png(&shafted_tray([85; 6]))).unwrap();
    let result = &report.result;

    assert_eq!(result.compartments.len(), 6);
    assert_eq!(result.box_summary.single_pin_boxes, 6);
    assert_eq!(result.pin_classification.pins_ok, 6);
    assert_eq!(result.shaft_classification.total_shafts, 6);
    assert_eq!(result.shaft_classification.approved_shafts, 6);
    for shaft in &result.shaft_classification.shafts {
        assert!(shaft.geometry.length > 75.0, "{shaft:?}");
        assert!(shaft.geometry.inclination.abs() < 0.1, "{shaft:?}");
    }
    assert!(!result.has_shaft_defects);
    assert_eq!(result.defects_count, 0);
    assert!(result.is_valid);
}

#[test]
fn test_short_and_borderline_shafts_are_rejected() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let report = pipeline
        .inspect_bytes(&png(&shafted_tray([85, 60, 30, 85, 85, 85])))
        .unwrap();
    let result = &report.result;
    let shafts = &result.shaft_classification;

    assert_eq!(result.compartments.len(), 6);
    assert_eq!(result.box_summary.single_pin_boxes, 6);
    assert_eq!(shafts.total_shafts, 6);
    assert_eq!(shafts.approved_shafts, 4);
    assert_eq!(shafts.rejected_primary, 1);
    assert_eq!(shafts.rejected_secondary, 1);

    // Shafts of one row start on the same scan line, so they come out left to right.
    let verdicts: Vec<ShaftVerdict> = shafts.shafts.iter().map(|s| s.verdict).collect();
    assert_eq!(
        &verdicts[..3],
        &[
            ShaftVerdict::Approved,
            ShaftVerdict::RejectedSecondary,
            ShaftVerdict::RejectedPrimary
        ]
    );

    assert!(result.has_shaft_defects);
    assert_eq!(result.defects_count, 2);
    assert!(!result.is_valid);
    let types: Vec<DefectType> = report.defects.iter().map(|d| d.defect_type).collect();
    assert_eq!(types, vec![DefectType::ShaftDefect, DefectType::ShaftBorderline]);
}

#[test]
fn test_inspection_is_idempotent() {
    let pipeline = InspectionPipeline::new(reference_config()).unwrap();
    let bytes = png(&defective_tray());
    let first = pipeline.inspect_bytes(&bytes).unwrap();
    let second = pipeline.inspect_bytes(&bytes).unwrap();
    assert_eq!(first.result, second.result);
    assert_eq!(
        serde_json::to_string(&first.result).unwrap(),
        serde_json::to_string(&second.result).unwrap()
    );
}

#[test]
fn test_overlays_are_rendered_on_request() {
    let mut config = reference_config();
    config.report.render_overlays = true;
    let pipeline = InspectionPipeline::new(config).unwrap();
    let report = pipeline.inspect_bytes(&png(&defective_tray())).unwrap();
    let overlays = report.overlays.expect("overlays requested");

    for kind in ArtifactKind::ALL {
        let decoded = image::load_from_memory(overlays.get(kind)).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (400, 300), "{kind:?}");
    }
    let name = report.result.image_id.artifact_name(ArtifactKind::Shafts);
    assert!(name.ends_with("/processed_shafts.png"));
}

#[tokio::test]
async fn test_batch_rollup() {
    let mut config = reference_config();
    config.workers = Some(3);
    let processor = BatchProcessor::new(config).unwrap();

    let inputs = vec![
        ImageInput {
            name: "defective.png".to_string(),
            bytes: png(&defective_tray()),
        },
        ImageInput {
            name: "corrupt.png".to_string(),
            bytes: b"\x89PNG truncated".to_vec(),
        },
        ImageInput {
            name: "good.png".to_string(),
            bytes: png(&good_tray()),
        },
        ImageInput {
            name: "blank.png".to_string(),
            bytes: png(&RgbImage::from_pixel(200, 150, FLOOR)),
        },
    ];
    let outcomes = processor.process_batch(inputs).await.unwrap();
    assert!(matches!(outcomes[0], ImageOutcome::Inspected { .. }));
    assert!(matches!(outcomes[1], ImageOutcome::Errored { .. }));
    assert!(matches!(outcomes[2], ImageOutcome::Inspected { .. }));
    assert!(matches!(outcomes[3], ImageOutcome::Errored { .. }));

    let summary = BatchSummary::from_outcomes(&outcomes);
    assert_eq!(summary.total_captures, 4);
    assert_eq!(summary.valid_captures, 1);
    assert_eq!(summary.invalid_captures, 1);
    assert_eq!(summary.errored_captures, 2);
    assert_eq!(summary.total_defects, 2);
    assert_eq!(summary.quality_score, 50.0);

    processor.shutdown().await;
}
