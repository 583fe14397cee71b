use crate::error::ValidationError;
use calib_video_core::{Correspondence, IntrinsicModel, PoseEstimate};
use serde::{Deserialize, Serialize};

/// Reprojection error of a solved model against the detections it came from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ReprojectionReport {
    /// Mean Euclidean pixel distance of each view.
    pub per_frame: Vec<f64>,
    /// Mean of `per_frame`.
    pub mean_error: f64,
    /// Root mean squared distance over all points.
    pub rms_error: f64,
    /// Largest single-point distance.
    pub max_error: f64,
}

/// Reproject every pattern point and compare it with its detection.
///
/// Pure function of its inputs: repeated calls give bit-identical reports.
pub fn validate(
    intrinsics: &IntrinsicModel,
    poses: &[PoseEstimate],
    views: &[Correspondence],
) -> Result<ReprojectionReport, ValidationError> {
    if poses.len() != views.len() {
        return Err(ValidationError::PoseCountMismatch {
            poses: poses.len(),
            views: views.len(),
        });
    }

    let mut per_frame = Vec::with_capacity(views.len());
    let mut sum_sq = 0.0;
    let mut n_points = 0usize;
    let mut max_error = 0.0f64;

    for (k, (view, pose)) in views.iter().zip(poses).enumerate() {
        if !view.is_aligned() {
            return Err(ValidationError::PointCountMismatch {
                view: k,
                object: view.object.len(),
                image: view.image.len(),
            });
        }
        if view.is_empty() {
            return Err(ValidationError::EmptyView(k));
        }

        let mut sum = 0.0;
        for (obj, img) in view.object.iter().zip(&view.image) {
            let d = (intrinsics.project(pose, obj) - img).norm();
            sum += d;
            sum_sq += d * d;
            max_error = max_error.max(d);
        }
        n_points += view.len();
        per_frame.push(sum / view.len() as f64);
    }

    let mean_error = if per_frame.is_empty() {
        0.0
    } else {
        per_frame.iter().sum::<f64>() / per_frame.len() as f64
    };
    let rms_error = if n_points == 0 {
        0.0
    } else {
        (sum_sq / n_points as f64).sqrt()
    };

    Ok(ReprojectionReport {
        per_frame,
        mean_error,
        rms_error,
        max_error,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use calib_video_core::PatternModel;
    use nalgebra::{Point2, Vector3};

    fn setup() -> (IntrinsicModel, Vec<PoseEstimate>, Vec<Correspondence>) {
        let pattern = PatternModel::new(3, 3, 10.0).expect("pattern");
        let cam = IntrinsicModel::pinhole(500.0, 500.0, 320.0, 240.0);
        let poses = vec![
            PoseEstimate::new(Vector3::zeros(), Vector3::new(0.0, 0.0, 200.0)),
            PoseEstimate::new(Vector3::new(0.1, 0.0, 0.0), Vector3::new(-5.0, 0.0, 250.0)),
        ];
        let views = calib_video_core::synthetic::correspondences(&cam, &pattern, &poses);
        (cam, poses, views)
    }

    #[test]
    fn exact_model_has_zero_error() {
        let (cam, poses, views) = setup();
        let report = validate(&cam, &poses, &views).expect("report");
        assert_eq!(report.per_frame.len(), 2);
        assert!(report.mean_error < 1e-12);
        assert!(report.max_error < 1e-12);
    }

    #[test]
    fn constant_offset_is_reported_per_frame() {
        let (cam, poses, mut views) = setup();
        for p in &mut views[1].image {
            *p += nalgebra::Vector2::new(3.0, 4.0);
        }
        let report = validate(&cam, &poses, &views).expect("report");
        assert!(report.per_frame[0] < 1e-12);
        assert!((report.per_frame[1] - 5.0).abs() < 1e-9);
        assert!((report.mean_error - 2.5).abs() < 1e-9);
        assert!((report.rms_error - (12.5f64).sqrt()).abs() < 1e-9);
        assert!((report.max_error - 5.0).abs() < 1e-9);
    }

    #[test]
    fn repeated_validation_is_bit_identical() {
        let (cam, poses, mut views) = setup();
        views[0].image[4] = Point2::new(321.7, 238.2);
        let a = validate(&cam, &poses, &views).expect("report");
        let b = validate(&cam, &poses, &views).expect("report");
        assert_eq!(a, b);
        assert_eq!(a.mean_error.to_bits(), b.mean_error.to_bits());
    }

    #[test]
    fn mismatched_inputs_are_rejected() {
        let (cam, poses, mut views) = setup();
        assert_eq!(
            validate(&cam, &poses[..1], &views),
            Err(ValidationError::PoseCountMismatch { poses: 1, views: 2 })
        );
        views[1].image.pop();
        assert_eq!(
            validate(&cam, &poses, &views),
            Err(ValidationError::PointCountMismatch {
                view: 1,
                object: 9,
                image: 8
            })
        );
    }
}
