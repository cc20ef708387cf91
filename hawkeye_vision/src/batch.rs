//! Batch-level roll-up of per-image inspection outcomes.

use crate::image_id::ImageId;
use crate::pipeline::InspectionReport;
use serde::{Deserialize, Serialize};

/// What happened to one image of a batch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ImageOutcome {
    Inspected {
        name: String,
        report: Box<InspectionReport>,
    },
    /// The image could not be inspected. It is neither valid nor invalid.
    Errored {
        name: String,
        image_id: ImageId,
        reason: String,
    },
}

impl ImageOutcome {
    pub fn name(&self) -> &str {
        match self {
            ImageOutcome::Inspected { name, .. } | ImageOutcome::Errored { name, .. } => name,
        }
    }

    pub fn image_id(&self) -> &ImageId {
        match self {
            ImageOutcome::Inspected { report, .. } => &report.result.image_id,
            ImageOutcome::Errored { image_id, .. } => image_id,
        }
    }

    pub fn report(&self) -> Option<&InspectionReport> {
        match self {
            ImageOutcome::Inspected { report, .. } => Some(report.as_ref()),
            ImageOutcome::Errored { .. } => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total_captures: u32,
    pub valid_captures: u32,
    pub invalid_captures: u32,
    pub errored_captures: u32,
    pub total_defects: u32,
    /// Percentage of valid images among the inspected ones, one decimal place.
    pub quality_score: f64,
}

impl BatchSummary {
    pub fn from_outcomes(outcomes: &[ImageOutcome]) -> Self {
        let mut summary = BatchSummary {
            total_captures: outcomes.len() as u32,
            ..Default::default()
        };
        for outcome in outcomes {
            match outcome {
                ImageOutcome::Inspected { report, .. } => {
                    if report.result.is_valid {
                        summary.valid_captures += 1;
                    } else {
                        summary.invalid_captures += 1;
                    }
                    summary.total_defects += report.result.defects_count;
                }
                ImageOutcome::Errored { .. } => summary.errored_captures += 1,
            }
        }

        let inspected = summary.valid_captures + summary.invalid_captures;
        summary.quality_score = if inspected == 0 {
            0.0
        } else {
            let percent = summary.valid_captures as f64 / inspected as f64 * 100.0;
            (percent * 10.0).round() / 10.0
        };
        summary
    }
}
