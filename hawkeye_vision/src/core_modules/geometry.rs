// THEORY:
// Principal-axis analysis of a pixel set. The centroid and the 2x2 covariance of the
// pixel coordinates are computed, and the covariance is decomposed with a symmetric
// eigen-solver. The eigenvector of the larger eigenvalue is the direction along
// which the pixels spread the most (the "major" axis); its perpendicular is the
// "minor" axis.
//
// Eigenvectors are only defined up to sign, so the major axis is flipped to point
// down the image (positive y), or right when it is exactly horizontal. That keeps
// endpoints and inclinations identical from run to run.

use crate::core_modules::region::Point;
use nalgebra::{Matrix2, SymmetricEigen};
use std::f64::consts::{FRAC_PI_2, PI};

const AXIS_EPSILON: f64 = 1e-12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PrincipalAxes {
    pub centroid: (f64, f64),
    /// Unit vector along the direction of largest spread.
    pub major: (f64, f64),
    /// Unit vector perpendicular to `major`.
    pub minor: (f64, f64),
    pub major_variance: f64,
    pub minor_variance: f64,
}

impl PrincipalAxes {
    /// Signed angle of the major axis from image vertical, in (-pi/2, pi/2].
    /// Positive when the axis leans towards +x going down the image.
    pub fn inclination(&self) -> f64 {
        normalize_inclination(self.major.0.atan2(self.major.1))
    }

    /// Offsets of `point` from the centroid, along (major, minor).
    pub fn project(&self, point: Point) -> (f64, f64) {
        let dx = point.x as f64 - self.centroid.0;
        let dy = point.y as f64 - self.centroid.1;
        (
            dx * self.major.0 + dy * self.major.1,
            dx * self.minor.0 + dy * self.minor.1,
        )
    }

    /// Image position at `along` units on the major axis and `across` on the minor.
    pub fn point_at(&self, along: f64, across: f64) -> (f64, f64) {
        (
            self.centroid.0 + along * self.major.0 + across * self.minor.0,
            self.centroid.1 + along * self.major.1 + across * self.minor.1,
        )
    }
}

/// Folds any axis angle into (-pi/2, pi/2]. An axis has no direction, so angles
/// that differ by pi describe the same axis.
pub fn normalize_inclination(angle: f64) -> f64 {
    let mut folded = angle % PI;
    if folded > FRAC_PI_2 {
        folded -= PI;
    } else if folded <= -FRAC_PI_2 {
        folded += PI;
    }
    folded
}

/// Centroid and principal axes of `points`. `None` for an empty set.
pub fn principal_axes(points: &[Point]) -> Option<PrincipalAxes> {
    if points.is_empty() {
        return None;
    }
    let n = points.len() as f64;
    let (sum_x, sum_y) = points
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x as f64, sy + p.y as f64));
    let centroid = (sum_x / n, sum_y / n);

    let (mut sxx, mut sxy, mut syy) = (0.0, 0.0, 0.0);
    for p in points {
        let dx = p.x as f64 - centroid.0;
        let dy = p.y as f64 - centroid.1;
        sxx += dx * dx;
        sxy += dx * dy;
        syy += dy * dy;
    }
    let covariance = Matrix2::new(sxx / n, sxy / n, sxy / n, syy / n);
    let eigen = SymmetricEigen::new(covariance);

    let (major_index, minor_index) = if eigen.eigenvalues[0] >= eigen.eigenvalues[1] {
        (0, 1)
    } else {
        (1, 0)
    };
    let column = eigen.eigenvectors.column(major_index);
    let mut major = (column[0], column[1]);
    let norm = (major.0 * major.0 + major.1 * major.1).sqrt();
    if norm > AXIS_EPSILON {
        major = (major.0 / norm, major.1 / norm);
    } else {
        major = (0.0, 1.0);
    }
    if major.1 < -AXIS_EPSILON || (major.1.abs() <= AXIS_EPSILON && major.0 < 0.0) {
        major = (-major.0, -major.1);
    }
    let minor = (-major.1, major.0);

    Some(PrincipalAxes {
        centroid,
        major,
        minor,
        major_variance: eigen.eigenvalues[major_index].max(0.0),
        minor_variance: eigen.eigenvalues[minor_index].max(0.0),
    })
}
