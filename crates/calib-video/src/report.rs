use crate::core::{IntrinsicModel, PoseEstimate};
use crate::solver::{ReprojectionReport, SolveStats};
use serde::Serialize;
use std::fmt;
use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

/// Everything a successful run produced.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct CalibrationReport {
    pub intrinsics: IntrinsicModel,
    /// Row-major `K`.
    pub camera_matrix: [[f64; 3]; 3],
    /// `[k1, k2, p1, p2, k3]`.
    pub distortion: [f64; 5],
    /// One per solved frame, in detection order.
    pub poses: Vec<PoseEstimate>,
    pub reprojection: ReprojectionReport,
    /// `(width, height)` used for the principal point start.
    pub image_size: (usize, usize),
    pub frames_seen: usize,
    pub frames_detected: usize,
    pub samples_used: usize,
    pub solve: SolveStats,
    pub solve_seconds: f64,
}

impl CalibrationReport {
    /// Dump the report as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> io::Result<()> {
        let file = File::create(path)?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(io::Error::other)
    }
}

impl fmt::Display for CalibrationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "frames: {} seen, {} detected, {} solved ({:.2}s solve)",
            self.frames_seen, self.frames_detected, self.samples_used, self.solve_seconds
        )?;
        writeln!(f, "camera matrix:")?;
        for row in &self.camera_matrix {
            writeln!(f, "  [{:12.4} {:12.4} {:12.4}]", row[0], row[1], row[2])?;
        }
        let d = &self.distortion;
        writeln!(
            f,
            "distortion: [{:.6}, {:.6}, {:.6}, {:.6}, {:.6}]",
            d[0], d[1], d[2], d[3], d[4]
        )?;
        write!(
            f,
            "reprojection error: mean {:.4}px, rms {:.4}px, max {:.4}px",
            self.reprojection.mean_error, self.reprojection.rms_error, self.reprojection.max_error
        )
    }
}
