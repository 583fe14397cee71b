//! Synthetic checkerboard frames and correspondences.
//!
//! Used by tests and demos to exercise the full pipeline against a known
//! camera. Rendering traces every sub-sample back onto the pattern plane, so
//! lens distortion is reproduced exactly (up to the undistortion iteration).

use crate::{Correspondence, GrayImage, IntrinsicModel, PatternModel, PoseEstimate};
use nalgebra::{Matrix3, Point2, Vector3};

/// Appearance of a rendered frame.
#[derive(Clone, Copy, Debug)]
pub struct RenderParams {
    pub width: usize,
    pub height: usize,
    /// Sub-samples per pixel along each axis.
    pub supersample: usize,
    pub dark: u8,
    pub light: u8,
    /// Fill outside the board and its quiet zone.
    pub background: u8,
    /// Width of the light quiet zone around the outer squares, in squares.
    pub margin_squares: f64,
}

impl Default for RenderParams {
    fn default() -> Self {
        Self {
            width: 640,
            height: 480,
            supersample: 4,
            dark: 25,
            light: 230,
            background: 128,
            margin_squares: 1.0,
        }
    }
}

/// Pose that places the board center at `(offset.x, offset.y, distance)` in
/// camera coordinates, rotated by `rvec` about its own center.
pub fn board_pose(
    pattern: &PatternModel,
    rvec: Vector3<f64>,
    distance: f64,
    offset: Point2<f64>,
) -> PoseEstimate {
    let pose = PoseEstimate::new(rvec, Vector3::zeros());
    let center = pose.rotation() * pattern.center().coords;
    PoseEstimate::new(rvec, Vector3::new(offset.x, offset.y, distance) - center)
}

/// A spread of tilted views suitable for calibration.
pub fn calibration_poses(pattern: &PatternModel, distance: f64) -> Vec<PoseEstimate> {
    let views = [
        ((0.25, 0.0, 0.05), (0.0, 0.0)),
        ((-0.25, 0.1, -0.05), (10.0, -5.0)),
        ((0.0, 0.3, 0.1), (-10.0, 5.0)),
        ((0.1, -0.3, 0.0), (5.0, 10.0)),
        ((-0.2, -0.2, 0.15), (-5.0, -10.0)),
        ((0.2, 0.25, -0.1), (0.0, 8.0)),
    ];
    views
        .iter()
        .map(|&((rx, ry, rz), (ox, oy))| {
            board_pose(
                pattern,
                Vector3::new(rx, ry, rz),
                distance,
                Point2::new(ox, oy),
            )
        })
        .collect()
}

/// Exact projections of the pattern under each pose.
pub fn correspondences(
    camera: &IntrinsicModel,
    pattern: &PatternModel,
    poses: &[PoseEstimate],
) -> Vec<Correspondence> {
    poses
        .iter()
        .map(|pose| {
            let image = pattern
                .points()
                .iter()
                .map(|p| camera.project(pose, p))
                .collect();
            Correspondence::new(pattern.points().to_vec(), image)
        })
        .collect()
}

/// Invert the distortion model by fixed-point iteration.
fn undistort(camera: &IntrinsicModel, xd: f64, yd: f64) -> (f64, f64) {
    let [k1, k2, p1, p2, k3] = camera.distortion;
    let (mut x, mut y) = (xd, yd);
    for _ in 0..20 {
        let r2 = x * x + y * y;
        let radial = 1.0 + r2 * (k1 + r2 * (k2 + r2 * k3));
        let dx = 2.0 * p1 * x * y + p2 * (r2 + 2.0 * x * x);
        let dy = p1 * (r2 + 2.0 * y * y) + 2.0 * p2 * x * y;
        x = (xd - dx) / radial;
        y = (yd - dy) / radial;
    }
    (x, y)
}

/// Render one frame of `pattern` seen by `camera` under `pose`.
///
/// Pixel centers sit at integer coordinates. Squares extend one spacing past
/// the outermost inner corners, so the board has `(cols + 1) x (rows + 1)`
/// squares, surrounded by a light quiet zone.
pub fn render(
    camera: &IntrinsicModel,
    pose: &PoseEstimate,
    pattern: &PatternModel,
    params: &RenderParams,
) -> GrayImage {
    let mut img = GrayImage::filled(params.width, params.height, params.background);

    // Normalized image plane -> pattern plane.
    let r = pose.rotation();
    let plane = Matrix3::from_columns(&[r.column(0).into_owned(), r.column(1).into_owned(), pose.tvec]);
    let Some(plane_inv) = plane.try_inverse() else {
        return img;
    };

    let s = pattern.spacing();
    let (cols, rows) = (pattern.cols() as f64, pattern.rows() as f64);
    let margin = params.margin_squares * s;
    let board_min = (-s, -s);
    let board_max = (cols * s, rows * s);

    let n = params.supersample.max(1);
    let step = 1.0 / n as f64;
    let weight = 1.0 / (n * n) as f64;

    for py in 0..params.height {
        for px in 0..params.width {
            let mut acc = 0.0;
            for sy in 0..n {
                for sx in 0..n {
                    let u = px as f64 - 0.5 + (sx as f64 + 0.5) * step;
                    let v = py as f64 - 0.5 + (sy as f64 + 0.5) * step;
                    let (x, y) = undistort(camera, (u - camera.cx) / camera.fx, (v - camera.cy) / camera.fy);
                    let q = plane_inv * Vector3::new(x, y, 1.0);
                    // Rays hitting the plane behind the camera see background.
                    let value = if q.z <= 0.0 {
                        params.background
                    } else {
                        let (bx, by) = (q.x / q.z, q.y / q.z);
                        if bx >= board_min.0 && bx < board_max.0 && by >= board_min.1 && by < board_max.1 {
                            let a = ((bx + s) / s).floor() as i64;
                            let b = ((by + s) / s).floor() as i64;
                            if (a + b) % 2 == 0 {
                                params.dark
                            } else {
                                params.light
                            }
                        } else if bx >= board_min.0 - margin
                            && bx < board_max.0 + margin
                            && by >= board_min.1 - margin
                            && by < board_max.1 + margin
                        {
                            params.light
                        } else {
                            params.background
                        }
                    };
                    acc += f64::from(value) * weight;
                }
            }
            img.data[py * params.width + px] = acc.round().clamp(0.0, 255.0) as u8;
        }
    }

    img
}
