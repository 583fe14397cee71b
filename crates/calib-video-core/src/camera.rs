//! Pinhole camera with Brown–Conrady distortion.

use nalgebra::{Matrix3, Point2, Point3, Rotation3, Vector3};
use serde::{Deserialize, Serialize};

/// Number of distortion coefficients: `[k1, k2, p1, p2, k3]`.
pub const DISTORTION_LEN: usize = 5;

/// Intrinsic parameters shared by every frame of a sequence.
///
/// Distortion uses the OpenCV coefficient order `[k1, k2, p1, p2, k3]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct IntrinsicModel {
    pub fx: f64,
    pub fy: f64,
    pub cx: f64,
    pub cy: f64,
    pub distortion: [f64; DISTORTION_LEN],
}

impl IntrinsicModel {
    /// Distortion-free camera.
    pub fn pinhole(fx: f64, fy: f64, cx: f64, cy: f64) -> Self {
        Self {
            fx,
            fy,
            cx,
            cy,
            distortion: [0.0; DISTORTION_LEN],
        }
    }

    pub fn with_distortion(mut self, distortion: [f64; DISTORTION_LEN]) -> Self {
        self.distortion = distortion;
        self
    }

    /// 3x3 camera matrix `K` (zero skew).
    pub fn k_matrix(&self) -> Matrix3<f64> {
        Matrix3::new(
            self.fx, 0.0, self.cx, //
            0.0, self.fy, self.cy, //
            0.0, 0.0, 1.0,
        )
    }

    /// True when every coefficient is finite and both focal lengths are positive.
    pub fn is_valid(&self) -> bool {
        [self.fx, self.fy, self.cx, self.cy]
            .iter()
            .chain(self.distortion.iter())
            .all(|v| v.is_finite())
            && self.fx > 0.0
            && self.fy > 0.0
    }

    /// Apply lens distortion to a point on the normalized image plane.
    pub fn distort(&self, x: f64, y: f64) -> (f64, f64) {
        let [k1, k2, p1, p2, k3] = self.distortion;
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
        let xd = x * radial + 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let yd = y * radial + p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        (xd, yd)
    }

    /// Project a point given in camera coordinates.
    ///
    /// The result may be non-finite for points on the camera plane; callers
    /// that need a guarantee check `is_finite` on the output.
    #[inline]
    pub fn project_camera(&self, pc: &Vector3<f64>) -> Point2<f64> {
        let (xd, yd) = self.distort(pc.x / pc.z, pc.y / pc.z);
        Point2::new(self.fx * xd + self.cx, self.fy * yd + self.cy)
    }

    /// Project a pattern point seen under `pose`.
    #[inline]
    pub fn project(&self, pose: &PoseEstimate, pw: &Point3<f64>) -> Point2<f64> {
        self.project_camera(&pose.transform(pw))
    }
}

/// Rotation matrix from an axis-angle (Rodrigues) vector.
#[inline]
pub fn rodrigues(rvec: &Vector3<f64>) -> Matrix3<f64> {
    Rotation3::new(*rvec).into_inner()
}

/// Pattern-to-camera rigid transform of a single frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Axis-angle rotation vector; its norm is the angle in radians.
    pub rvec: Vector3<f64>,
    pub tvec: Vector3<f64>,
}

impl PoseEstimate {
    pub fn new(rvec: Vector3<f64>, tvec: Vector3<f64>) -> Self {
        Self { rvec, tvec }
    }

    /// Build a pose from a proper rotation matrix.
    pub fn from_rotation(r: &Matrix3<f64>, tvec: Vector3<f64>) -> Self {
        let rot = Rotation3::from_matrix_unchecked(*r);
        Self {
            rvec: rot.scaled_axis(),
            tvec,
        }
    }

    #[inline]
    pub fn rotation(&self) -> Matrix3<f64> {
        rodrigues(&self.rvec)
    }

    /// Map a pattern point into camera coordinates.
    #[inline]
    pub fn transform(&self, pw: &Point3<f64>) -> Vector3<f64> {
        self.rotation() * pw.coords + self.tvec
    }

    pub fn is_finite(&self) -> bool {
        self.rvec.iter().chain(self.tvec.iter()).all(|v| v.is_finite())
    }
}
