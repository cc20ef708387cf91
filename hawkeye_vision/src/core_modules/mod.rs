pub mod aggregator;
pub mod compartment;
pub mod geometry;
pub mod grid_detector;
pub mod mask;
pub mod overlay;
pub mod pin_detector;
pub mod pixel;
pub mod region;
pub mod region_detector;
pub mod shaft_analyzer;
pub mod shaft_segmenter;
