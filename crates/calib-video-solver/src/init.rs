//! Closed-form starting point for the joint refinement.

use crate::error::SolveError;
use calib_video_core::{
    estimate_homography, Correspondence, Homography, IntrinsicModel, PoseEstimate,
};
use nalgebra::{Matrix2, Matrix3, Point2, Vector2, Vector3};

/// Plane-to-image homography of every view.
pub fn view_homographies(views: &[Correspondence]) -> Result<Vec<Homography>, SolveError> {
    views
        .iter()
        .enumerate()
        .map(|(k, view)| {
            let plane: Vec<Point2<f64>> =
                view.object.iter().map(|p| Point2::new(p.x, p.y)).collect();
            estimate_homography(&plane, &view.image).ok_or_else(|| {
                SolveError::DegenerateConfiguration(format!("no homography for view {k}"))
            })
        })
        .collect()
}

/// Focal lengths from homography constraints with a fixed principal point.
///
/// With the principal point moved to the origin, the image of the absolute
/// conic is `diag(a, b, 1)` with `a = 1/fx²`, `b = 1/fy²`. Every view gives
/// two linear equations: its first two columns are orthogonal, and so are
/// their sum and difference (the equal-norm constraint).
pub fn initial_intrinsics(
    homographies: &[Homography],
    image_size: (usize, usize),
) -> Result<IntrinsicModel, SolveError> {
    let cx = (image_size.0 as f64 - 1.0) * 0.5;
    let cy = (image_size.1 as f64 - 1.0) * 0.5;
    let shift = Matrix3::new(1.0, 0.0, -cx, 0.0, 1.0, -cy, 0.0, 0.0, 1.0);

    let mut ata = Matrix2::<f64>::zeros();
    let mut atb = Vector2::<f64>::zeros();
    for h in homographies {
        let hs = shift * h.h;
        let c1: Vector3<f64> = hs.column(0).into_owned();
        let c2: Vector3<f64> = hs.column(1).into_owned();
        let pairs = [(c1, c2), ((c1 + c2) * 0.5, (c1 - c2) * 0.5)];
        for (u, v) in pairs {
            let (nu, nv) = (u.norm(), v.norm());
            if nu <= f64::EPSILON || nv <= f64::EPSILON {
                continue;
            }
            let (u, v) = (u / nu, v / nv);
            let row = Vector2::new(u.x * v.x, u.y * v.y);
            let rhs = -u.z * v.z;
            ata += row * row.transpose();
            atb += row * rhs;
        }
    }

    let scale = ata.abs().max();
    if !scale.is_finite() || scale <= 0.0 || ata.determinant().abs() <= 1e-12 * scale * scale {
        return Err(SolveError::DegenerateConfiguration(
            "views do not constrain the focal lengths".into(),
        ));
    }
    let ab = ata
        .lu()
        .solve(&atb)
        .ok_or_else(|| SolveError::DegenerateConfiguration("focal system is singular".into()))?;
    if !ab.x.is_finite() || !ab.y.is_finite() || ab.x <= 0.0 || ab.y <= 0.0 {
        return Err(SolveError::DegenerateConfiguration(format!(
            "non-positive focal solution (a={:.3e}, b={:.3e})",
            ab.x, ab.y
        )));
    }

    Ok(IntrinsicModel::pinhole(
        1.0 / ab.x.sqrt(),
        1.0 / ab.y.sqrt(),
        cx,
        cy,
    ))
}

/// Decompose `H ~ K [r1 r2 t]` into a pose in front of the camera.
pub fn pose_from_homography(k: &Matrix3<f64>, h: &Homography) -> Option<PoseEstimate> {
    let k_inv = k.try_inverse()?;
    let m1 = k_inv * h.h.column(0);
    let m2 = k_inv * h.h.column(1);
    let m3 = k_inv * h.h.column(2);

    let mut lambda = 2.0 / (m1.norm() + m2.norm());
    if !lambda.is_finite() {
        return None;
    }
    if m3.z * lambda < 0.0 {
        lambda = -lambda;
    }

    let r1 = m1 * lambda;
    let r2 = m2 * lambda;
    let r3 = r1.cross(&r2);
    let r = Matrix3::from_columns(&[r1, r2, r3]);

    // Nearest rotation in the Frobenius sense.
    let svd = r.svd(true, true);
    let (mut u, v_t) = (svd.u?, svd.v_t?);
    if (u * v_t).determinant() < 0.0 {
        u.column_mut(2).neg_mut();
    }
    let pose = PoseEstimate::from_rotation(&(u * v_t), m3 * lambda);
    pose.is_finite().then_some(pose)
}
