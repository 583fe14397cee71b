use nalgebra::{Point2, Point3};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum PatternError {
    #[error("pattern needs at least 2x2 inner corners (got rows={rows}, cols={cols})")]
    TooSmall { rows: usize, cols: usize },
    #[error("square spacing must be finite and positive (got {0})")]
    InvalidSpacing(f64),
}

/// Planar checkerboard geometry: `rows * cols` inner corners on `z = 0`.
///
/// Points are row-major: index `k = r * cols + c` maps to
/// `(c * spacing, r * spacing, 0)`. The detector reports image points in the
/// same order, so index `k` on both sides is the same physical corner.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PatternModel {
    rows: usize,
    cols: usize,
    spacing: f64,
    points: Vec<Point3<f64>>,
}

impl PatternModel {
    pub fn new(rows: usize, cols: usize, spacing: f64) -> Result<Self, PatternError> {
        if rows < 2 || cols < 2 {
            return Err(PatternError::TooSmall { rows, cols });
        }
        if !spacing.is_finite() || spacing <= 0.0 {
            return Err(PatternError::InvalidSpacing(spacing));
        }
        let points = (0..rows)
            .flat_map(|r| {
                (0..cols).map(move |c| Point3::new(c as f64 * spacing, r as f64 * spacing, 0.0))
            })
            .collect();
        Ok(Self {
            rows,
            cols,
            spacing,
            points,
        })
    }

    #[inline]
    pub fn rows(&self) -> usize {
        self.rows
    }

    #[inline]
    pub fn cols(&self) -> usize {
        self.cols
    }

    #[inline]
    pub fn spacing(&self) -> f64 {
        self.spacing
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Template points in canonical order.
    #[inline]
    pub fn points(&self) -> &[Point3<f64>] {
        &self.points
    }

    #[inline]
    pub fn index(&self, row: usize, col: usize) -> usize {
        row * self.cols + col
    }

    /// Physical center of the board on the pattern plane.
    pub fn center(&self) -> Point3<f64> {
        Point3::new(
            (self.cols - 1) as f64 * self.spacing * 0.5,
            (self.rows - 1) as f64 * self.spacing * 0.5,
            0.0,
        )
    }
}

/// One successfully detected frame: pattern points paired with their detections.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Correspondence {
    pub object: Vec<Point3<f64>>,
    pub image: Vec<Point2<f64>>,
}

impl Correspondence {
    pub fn new(object: Vec<Point3<f64>>, image: Vec<Point2<f64>>) -> Self {
        Self { object, image }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.object.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.object.is_empty()
    }

    /// Both sides have the same length.
    #[inline]
    pub fn is_aligned(&self) -> bool {
        self.object.len() == self.image.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generates_row_major_planar_grid() {
        let p = PatternModel::new(8, 6, 25.0).expect("pattern");
        assert_eq!(p.len(), 48);
        assert!(p.points().iter().all(|q| q.z == 0.0));
        assert_eq!(p.points()[0], Point3::new(0.0, 0.0, 0.0));
        assert_eq!(p.points()[1], Point3::new(25.0, 0.0, 0.0));
        assert_eq!(p.points()[6], Point3::new(0.0, 25.0, 0.0));
        assert_eq!(p.points()[p.index(7, 5)], Point3::new(125.0, 175.0, 0.0));
    }

    #[test]
    fn neighbors_are_exactly_one_spacing_apart() {
        let p = PatternModel::new(4, 5, 12.5).expect("pattern");
        for r in 0..p.rows() {
            for c in 0..p.cols() {
                let here = p.points()[p.index(r, c)];
                if c + 1 < p.cols() {
                    let d = (p.points()[p.index(r, c + 1)] - here).norm();
                    assert!((d - 12.5).abs() < 1e-12);
                }
                if r + 1 < p.rows() {
                    let d = (p.points()[p.index(r + 1, c)] - here).norm();
                    assert!((d - 12.5).abs() < 1e-12);
                }
            }
        }
    }

    #[test]
    fn rejects_invalid_geometry() {
        assert_eq!(
            PatternModel::new(1, 6, 25.0),
            Err(PatternError::TooSmall { rows: 1, cols: 6 })
        );
        assert!(matches!(
            PatternModel::new(8, 6, 0.0),
            Err(PatternError::InvalidSpacing(_))
        ));
        assert!(PatternModel::new(8, 6, f64::NAN).is_err());
    }
}
