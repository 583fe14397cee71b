use crate::error::SolveError;
use crate::init::{initial_intrinsics, pose_from_homography, view_homographies};
use crate::params::SolverParams;
use crate::refine::{refine, SolveStats};
use calib_video_core::{Correspondence, IntrinsicModel, PoseEstimate};
use log::{debug, info};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Fewest views the closed-form initialization accepts.
pub const MIN_VIEWS: usize = 2;

/// Solved camera model and the pose of every input view, in input order.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSolution {
    pub intrinsics: IntrinsicModel,
    pub poses: Vec<PoseEstimate>,
    pub stats: SolveStats,
}

fn check_views(views: &[Correspondence]) -> Result<(), SolveError> {
    if views.len() < MIN_VIEWS {
        return Err(SolveError::NotEnoughViews {
            found: views.len(),
            required: MIN_VIEWS,
        });
    }
    for (k, view) in views.iter().enumerate() {
        let invalid = |reason: String| SolveError::InvalidCorrespondence { view: k, reason };
        if !view.is_aligned() {
            return Err(invalid(format!(
                "{} pattern points but {} detections",
                view.object.len(),
                view.image.len()
            )));
        }
        if view.len() < 4 {
            return Err(invalid(format!("only {} points", view.len())));
        }
        if view.object.iter().any(|p| p.z != 0.0) {
            return Err(invalid("pattern points are not on the z = 0 plane".into()));
        }
        let finite = view.object.iter().all(|p| p.coords.iter().all(|v| v.is_finite()))
            && view.image.iter().all(|p| p.coords.iter().all(|v| v.is_finite()));
        if !finite {
            return Err(invalid("non-finite coordinates".into()));
        }
    }
    Ok(())
}

/// Estimate intrinsics, distortion and per-view poses from planar correspondences.
///
/// Closed-form focal lengths and poses seed a Levenberg–Marquardt refinement
/// of all parameters. `image_size` is `(width, height)` in pixels and fixes
/// the initial principal point at the image center.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(views, params), fields(views = views.len()))
)]
pub fn calibrate(
    views: &[Correspondence],
    image_size: (usize, usize),
    params: &SolverParams,
) -> Result<CalibrationSolution, SolveError> {
    check_views(views)?;
    if image_size.0 == 0 || image_size.1 == 0 {
        return Err(SolveError::DegenerateConfiguration(format!(
            "empty image size {}x{}",
            image_size.0, image_size.1
        )));
    }

    let homographies = view_homographies(views)?;
    let initial = initial_intrinsics(&homographies, image_size)?;
    debug!(
        "closed-form start: fx={:.2} fy={:.2} cx={:.2} cy={:.2}",
        initial.fx, initial.fy, initial.cx, initial.cy
    );

    let k = initial.k_matrix();
    let poses = homographies
        .iter()
        .enumerate()
        .map(|(v, h)| {
            pose_from_homography(&k, h).ok_or_else(|| {
                SolveError::DegenerateConfiguration(format!("cannot decompose homography of view {v}"))
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let (intrinsics, poses, stats) = refine(&initial, &poses, views, params)?;
    info!(
        "solved after {} evaluations (converged: {}), rms {:.4}px",
        stats.iterations, stats.converged, stats.rms
    );

    Ok(CalibrationSolution {
        intrinsics,
        poses,
        stats,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::{Point2, Point3};

    #[test]
    fn single_view_is_not_enough() {
        let view = Correspondence::new(vec![Point3::origin(); 4], vec![Point2::origin(); 4]);
        assert_eq!(
            calibrate(&[view], (640, 480), &SolverParams::default()),
            Err(SolveError::NotEnoughViews {
                found: 1,
                required: MIN_VIEWS
            })
        );
    }

    #[test]
    fn misaligned_view_is_rejected() {
        let good = Correspondence::new(vec![Point3::origin(); 4], vec![Point2::origin(); 4]);
        let bad = Correspondence::new(vec![Point3::origin(); 4], vec![Point2::origin(); 3]);
        assert!(matches!(
            calibrate(&[good, bad], (640, 480), &SolverParams::default()),
            Err(SolveError::InvalidCorrespondence { view: 1, .. })
        ));
    }

    #[test]
    fn collapsed_detections_are_degenerate() {
        let object: Vec<Point3<f64>> = (0..3)
            .flat_map(|r| (0..3).map(move |c| Point3::new(c as f64, r as f64, 0.0)))
            .collect();
        let views = vec![
            Correspondence::new(object.clone(), vec![Point2::new(10.0, 10.0); 9]),
            Correspondence::new(object, vec![Point2::new(20.0, 10.0); 9]),
        ];
        assert!(matches!(
            calibrate(&views, (640, 480), &SolverParams::default()),
            Err(SolveError::DegenerateConfiguration(_))
        ));
    }
}
