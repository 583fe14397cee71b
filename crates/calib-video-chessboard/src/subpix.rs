//! Sub-pixel corner refinement.
//!
//! At a saddle point `q`, the image gradient at every nearby pixel `p` is
//! orthogonal to `p - q`. Each iteration solves the weighted least-squares
//! system `sum(w g g^T) q = sum(w g g^T p)` over a square window around the
//! current estimate and moves there.

use crate::params::RefineParams;
use calib_video_core::{sample_bilinear, GrayImageView};
use nalgebra::{Matrix2, Point2, Vector2};

/// Refine a single corner. Returns the start point unchanged when the
/// system is singular or the estimate leaves the search window.
pub fn refine_corner(
    img: &GrayImageView<'_>,
    start: Point2<f64>,
    params: &RefineParams,
) -> Point2<f64> {
    let half = (params.window_size.max(3) / 2) as i64;
    let sigma2 = (half * half) as f64;
    let side = (2 * half + 3) as usize;

    let mut q = start;
    let mut patch = vec![0.0f64; side * side];

    for _ in 0..params.max_iterations.max(1) {
        // Resample the window (plus a one-pixel rim for gradients) at q.
        for (row, dy) in (-half - 1..=half + 1).enumerate() {
            for (col, dx) in (-half - 1..=half + 1).enumerate() {
                let x = (q.x + dx as f64) as f32;
                let y = (q.y + dy as f64) as f32;
                patch[row * side + col] = f64::from(sample_bilinear(img, x, y));
            }
        }

        let mut a = Matrix2::<f64>::zeros();
        let mut b = Vector2::<f64>::zeros();
        for dy in -half..=half {
            for dx in -half..=half {
                let row = (dy + half + 1) as usize;
                let col = (dx + half + 1) as usize;
                let gx = 0.5 * (patch[row * side + col + 1] - patch[row * side + col - 1]);
                let gy = 0.5 * (patch[(row + 1) * side + col] - patch[(row - 1) * side + col]);
                let w = (-((dx * dx + dy * dy) as f64) / sigma2).exp();
                let g = Vector2::new(gx, gy);
                let ggt = g * g.transpose() * w;
                let p = Vector2::new(q.x + dx as f64, q.y + dy as f64);
                a += ggt;
                b += ggt * p;
            }
        }

        let Some(next) = a.try_inverse().map(|inv| inv * b) else {
            return start;
        };
        if !next.x.is_finite() || !next.y.is_finite() {
            return start;
        }
        let next = Point2::from(next);
        let step = (next - q).norm();
        q = next;
        if (q - start).norm() > half as f64 {
            return start;
        }
        if step < params.tolerance {
            break;
        }
    }

    q
}

/// Refine every corner, preserving order.
pub fn refine_corners(
    img: &GrayImageView<'_>,
    corners: &[Point2<f64>],
    params: &RefineParams,
) -> Vec<Point2<f64>> {
    corners.iter().map(|&c| refine_corner(img, c, params)).collect()
}
