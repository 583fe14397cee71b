//! Levenberg–Marquardt refinement of shared intrinsics and per-view poses.
//!
//! Parameter layout: `[fx, fy, cx, cy, k1, k2, p1, p2, k3]` followed by
//! `[rx, ry, rz, tx, ty, tz]` for every view. Each view only touches the
//! intrinsic block and its own pose block, so the Jacobian is assembled from
//! small `2n x 15` per-view blocks scattered into the global matrix.
//! The trust-region iterations are delegated to `levenberg_marquardt`.

use crate::error::SolveError;
use crate::params::SolverParams;
use calib_video_core::{Correspondence, IntrinsicModel, PoseEstimate};
use levenberg_marquardt::{LeastSquaresProblem, LevenbergMarquardt, TerminationReason};
use log::debug;
use nalgebra::{storage::Owned, DMatrix, DVector, Dyn, Vector3};
use serde::{Deserialize, Serialize};

pub(crate) const INTRINSIC_PARAMS: usize = 9;
const POSE_PARAMS: usize = 6;
const VIEW_PARAMS: usize = INTRINSIC_PARAMS + POSE_PARAMS;

/// Scaled diagonal damping under which the start must still factorize.
const SINGULARITY_DAMPING: f64 = 1e-6;
/// Mean squared residual per point below which the fit is exact to rounding.
const COST_FLOOR_PER_POINT: f64 = 1e-24;

/// Convergence summary of the refinement.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SolveStats {
    /// Objective evaluations spent by the minimizer.
    pub iterations: usize,
    /// Sum of squared pixel residuals at the closed-form start.
    pub initial_cost: f64,
    pub final_cost: f64,
    /// Root mean squared per-point pixel distance after refinement.
    pub rms: f64,
    pub converged: bool,
}

fn pack(intrinsics: &IntrinsicModel, poses: &[PoseEstimate]) -> DVector<f64> {
    let mut p = DVector::zeros(INTRINSIC_PARAMS + POSE_PARAMS * poses.len());
    p[0] = intrinsics.fx;
    p[1] = intrinsics.fy;
    p[2] = intrinsics.cx;
    p[3] = intrinsics.cy;
    for (k, d) in intrinsics.distortion.iter().enumerate() {
        p[4 + k] = *d;
    }
    for (v, pose) in poses.iter().enumerate() {
        let o = INTRINSIC_PARAMS + POSE_PARAMS * v;
        for k in 0..3 {
            p[o + k] = pose.rvec[k];
            p[o + 3 + k] = pose.tvec[k];
        }
    }
    p
}

fn intrinsics_from(p: &[f64]) -> IntrinsicModel {
    IntrinsicModel::pinhole(p[0], p[1], p[2], p[3]).with_distortion([p[4], p[5], p[6], p[7], p[8]])
}

fn pose_from(p: &[f64]) -> PoseEstimate {
    PoseEstimate::new(Vector3::new(p[0], p[1], p[2]), Vector3::new(p[3], p[4], p[5]))
}

#[inline]
fn pose_offset(view: usize) -> usize {
    INTRINSIC_PARAMS + POSE_PARAMS * view
}

/// Residuals of one view from its 15 local parameters.
fn view_residuals(local: &[f64; VIEW_PARAMS], view: &Correspondence, out: &mut [f64]) {
    let intrinsics = intrinsics_from(&local[..INTRINSIC_PARAMS]);
    let pose = pose_from(&local[INTRINSIC_PARAMS..]);
    let r = pose.rotation();
    for (k, (obj, img)) in view.object.iter().zip(&view.image).enumerate() {
        let pc = r * obj.coords + pose.tvec;
        let proj = intrinsics.project_camera(&pc);
        out[2 * k] = proj.x - img.x;
        out[2 * k + 1] = proj.y - img.y;
    }
}

fn local_params(p: &DVector<f64>, view: usize) -> [f64; VIEW_PARAMS] {
    let mut local = [0.0; VIEW_PARAMS];
    local[..INTRINSIC_PARAMS].copy_from_slice(&p.as_slice()[..INTRINSIC_PARAMS]);
    let o = pose_offset(view);
    local[INTRINSIC_PARAMS..].copy_from_slice(&p.as_slice()[o..o + POSE_PARAMS]);
    local
}

/// The joint reprojection problem as seen by the minimizer.
struct PlanarProblem<'a> {
    views: &'a [Correspondence],
    params: DVector<f64>,
    rows: usize,
}

impl<'a> PlanarProblem<'a> {
    fn new(views: &'a [Correspondence], params: DVector<f64>) -> Self {
        let rows = views.iter().map(|v| 2 * v.len()).sum();
        Self {
            views,
            params,
            rows,
        }
    }

    fn residual_vector(&self) -> DVector<f64> {
        let mut r = DVector::zeros(self.rows);
        let mut row = 0;
        for (v, view) in self.views.iter().enumerate() {
            let m = 2 * view.len();
            view_residuals(
                &local_params(&self.params, v),
                view,
                &mut r.as_mut_slice()[row..row + m],
            );
            row += m;
        }
        r
    }

    /// Sum of squared residuals; non-finite when any projection is.
    fn cost(&self) -> f64 {
        self.residual_vector().norm_squared()
    }

    /// Central-difference Jacobian, one view block at a time.
    fn jacobian_matrix(&self) -> DMatrix<f64> {
        let mut jac = DMatrix::zeros(self.rows, self.params.len());
        let mut row = 0;
        for (v, view) in self.views.iter().enumerate() {
            let m = 2 * view.len();
            let local = local_params(&self.params, v);
            let o = pose_offset(v);
            let mut plus = vec![0.0; m];
            let mut minus = vec![0.0; m];
            for c in 0..VIEW_PARAMS {
                let h = 1e-6 * (1.0 + local[c].abs());
                let mut lp = local;
                lp[c] += h;
                view_residuals(&lp, view, &mut plus);
                let mut lm = local;
                lm[c] -= h;
                view_residuals(&lm, view, &mut minus);

                let col = if c < INTRINSIC_PARAMS {
                    c
                } else {
                    o + c - INTRINSIC_PARAMS
                };
                for k in 0..m {
                    jac[(row + k, col)] = (plus[k] - minus[k]) / (2.0 * h);
                }
            }
            row += m;
        }
        jac
    }
}

impl LeastSquaresProblem<f64, Dyn, Dyn> for PlanarProblem<'_> {
    type ResidualStorage = Owned<f64, Dyn>;
    type JacobianStorage = Owned<f64, Dyn, Dyn>;
    type ParameterStorage = Owned<f64, Dyn>;

    fn set_params(&mut self, x: &DVector<f64>) {
        self.params.clone_from(x);
    }

    fn params(&self) -> DVector<f64> {
        self.params.clone()
    }

    fn residuals(&self) -> Option<DVector<f64>> {
        Some(self.residual_vector())
    }

    fn jacobian(&self) -> Option<DMatrix<f64>> {
        let jac = self.jacobian_matrix();
        jac.iter().all(|v| v.is_finite()).then_some(jac)
    }
}

/// `true` when the Marquardt-scaled normal matrix `J^T J + mu diag(J^T J)`
/// cannot be factorized, i.e. some parameter moves no residual.
fn is_singular(jac: &DMatrix<f64>) -> bool {
    let mut normal = jac.tr_mul(jac);
    for i in 0..normal.nrows() {
        normal[(i, i)] *= 1.0 + SINGULARITY_DAMPING;
    }
    normal.cholesky().is_none()
}

/// Whether the minimizer converged, or the error its stop reason stands for.
fn termination_outcome(reason: &TerminationReason) -> Result<bool, SolveError> {
    match reason {
        TerminationReason::User(_) | TerminationReason::Numerical(_) => {
            Err(SolveError::NonFinite)
        }
        TerminationReason::NoParameters
        | TerminationReason::NoResiduals
        | TerminationReason::WrongDimensions(_) => Err(SolveError::DegenerateConfiguration(
            format!("minimizer rejected the problem: {reason:?}"),
        )),
        other => Ok(other.was_successful()),
    }
}

/// Refine `intrinsics` and `poses` jointly against `views`.
///
/// The minimizer stops once a step lowers the squared error by less than
/// `params.tolerance` (relative), or after `params.max_iterations` rounds of
/// `n + 1` evaluations each for `n` parameters. A start that already fits to
/// rounding is returned unchanged.
pub fn refine(
    intrinsics: &IntrinsicModel,
    poses: &[PoseEstimate],
    views: &[Correspondence],
    params: &SolverParams,
) -> Result<(IntrinsicModel, Vec<PoseEstimate>, SolveStats), SolveError> {
    let positive = |v: f64| v.is_finite() && v > 0.0;
    if !positive(params.tolerance) || !positive(params.step_bound) {
        return Err(SolveError::DegenerateConfiguration(format!(
            "solver tolerance ({}) and step bound ({}) must be finite and positive",
            params.tolerance, params.step_bound
        )));
    }

    let n_points: usize = views.iter().map(Correspondence::len).sum();
    let cost_floor = COST_FLOOR_PER_POINT * n_points.max(1) as f64;
    let rms = |cost: f64| (cost / n_points.max(1) as f64).sqrt();

    let problem = PlanarProblem::new(views, pack(intrinsics, poses));
    let initial_cost = problem.cost();
    if !initial_cost.is_finite() {
        return Err(SolveError::NonFinite);
    }
    if initial_cost <= cost_floor {
        let stats = SolveStats {
            iterations: 0,
            initial_cost,
            final_cost: initial_cost,
            rms: rms(initial_cost),
            converged: true,
        };
        return Ok((*intrinsics, poses.to_vec(), stats));
    }

    let jac = problem.jacobian_matrix();
    if jac.iter().any(|v| !v.is_finite()) {
        return Err(SolveError::NonFinite);
    }
    if is_singular(&jac) {
        return Err(SolveError::Singular);
    }

    let lm = LevenbergMarquardt::new()
        .with_ftol(params.tolerance)
        .with_stepbound(params.step_bound)
        .with_patience(params.max_iterations.max(1));
    let (problem, report) = lm.minimize(problem);
    debug!(
        "minimizer stopped after {} evaluations: {:?}",
        report.number_of_evaluations, report.termination
    );
    let converged = termination_outcome(&report.termination)?;

    let p = problem.params();
    let final_cost = problem.cost();
    let refined = intrinsics_from(&p.as_slice()[..INTRINSIC_PARAMS]);
    let refined_poses: Vec<PoseEstimate> = (0..poses.len())
        .map(|v| {
            let o = pose_offset(v);
            pose_from(&p.as_slice()[o..o + POSE_PARAMS])
        })
        .collect();
    if !final_cost.is_finite()
        || !refined.is_valid()
        || refined_poses.iter().any(|pose| !pose.is_finite())
    {
        return Err(SolveError::NonFinite);
    }

    let stats = SolveStats {
        iterations: report.number_of_evaluations,
        initial_cost,
        final_cost,
        rms: rms(final_cost),
        converged,
    };
    Ok((refined, refined_poses, stats))
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use calib_video_core::synthetic::{calibration_poses, correspondences};
    use calib_video_core::PatternModel;

    fn views_of(cam: &IntrinsicModel) -> (Vec<PoseEstimate>, Vec<Correspondence>) {
        let pattern = PatternModel::new(4, 5, 20.0).expect("pattern");
        let poses = calibration_poses(&pattern, 400.0);
        let views = correspondences(cam, &pattern, &poses);
        (poses, views)
    }

    #[test]
    fn pack_round_trips_layout() {
        let cam = IntrinsicModel::pinhole(1.0, 2.0, 3.0, 4.0).with_distortion([5.0, 6.0, 7.0, 8.0, 9.0]);
        let pose = PoseEstimate::new(Vector3::new(10.0, 11.0, 12.0), Vector3::new(13.0, 14.0, 15.0));
        let p = pack(&cam, &[pose, pose]);
        assert_eq!(p.len(), 21);
        assert_eq!(intrinsics_from(&p.as_slice()[..9]), cam);
        assert_eq!(pose_from(&p.as_slice()[15..21]), pose);
    }

    #[test]
    fn exact_start_needs_no_iterations() {
        let cam = IntrinsicModel::pinhole(500.0, 500.0, 320.0, 240.0);
        let (poses, views) = views_of(&cam);
        let (refined, _, stats) = refine(&cam, &poses, &views, &SolverParams::default()).expect("refine");
        assert_eq!(stats.iterations, 0);
        assert!(stats.converged);
        assert_eq!(refined, cam);
    }

    #[test]
    fn jacobian_rows_follow_views_and_columns_follow_layout() {
        let cam = IntrinsicModel::pinhole(500.0, 500.0, 320.0, 240.0);
        let (poses, views) = views_of(&cam);
        let problem = PlanarProblem::new(&views[..2], pack(&cam, &poses[..2]));
        let jac = problem.jacobian_matrix();
        assert_eq!(jac.shape(), (2 * 2 * 20, 9 + 2 * 6));

        // First view's rows never depend on the second view's pose.
        for row in 0..40 {
            for col in 15..21 {
                assert_eq!(jac[(row, col)], 0.0);
            }
        }
        // d(u)/d(cx) is exactly one for every point.
        for k in 0..40 {
            assert_relative_eq!(jac[(2 * k, 2)], 1.0, epsilon = 1e-6);
            assert_relative_eq!(jac[(2 * k + 1, 2)], 0.0, epsilon = 1e-6);
        }
    }

    #[test]
    fn recovers_perturbed_focal_and_distortion() {
        let pattern = PatternModel::new(6, 7, 20.0).expect("pattern");
        let truth = IntrinsicModel::pinhole(550.0, 560.0, 318.0, 243.0)
            .with_distortion([-0.08, 0.01, 0.0005, -0.0003, 0.0]);
        let poses = calibration_poses(&pattern, 450.0);
        let views = correspondences(&truth, &pattern, &poses);

        let start = IntrinsicModel::pinhole(530.0, 575.0, 319.5, 239.5);
        let (refined, _, stats) = refine(&start, &poses, &views, &SolverParams::default()).expect("refine");
        assert!(stats.iterations > 0);
        assert!(stats.final_cost < stats.initial_cost * 1e-6);
        assert_relative_eq!(refined.fx, truth.fx, max_relative = 1e-4);
        assert_relative_eq!(refined.fy, truth.fy, max_relative = 1e-4);
        assert_relative_eq!(refined.distortion[0], truth.distortion[0], epsilon = 1e-3);
    }

    #[test]
    fn board_on_the_camera_plane_is_non_finite() {
        let cam = IntrinsicModel::pinhole(500.0, 500.0, 320.0, 240.0);
        let (mut poses, views) = views_of(&cam);
        // Board plane z = 0 coincides with the camera's focal plane.
        poses[1] = PoseEstimate::new(Vector3::zeros(), Vector3::zeros());
        let start = IntrinsicModel::pinhole(510.0, 490.0, 320.0, 240.0);
        assert_eq!(
            refine(&start, &poses, &views, &SolverParams::default()),
            Err(SolveError::NonFinite)
        );
    }

    #[test]
    fn pose_of_an_empty_view_is_singular() {
        let cam = IntrinsicModel::pinhole(500.0, 500.0, 320.0, 240.0);
        let (poses, mut views) = views_of(&cam);
        // No residual depends on the last view's pose block.
        let last = views.len() - 1;
        views[last] = Correspondence::new(Vec::new(), Vec::new());
        let start = IntrinsicModel::pinhole(510.0, 490.0, 320.0, 240.0);
        assert_eq!(
            refine(&start, &poses, &views, &SolverParams::default()),
            Err(SolveError::Singular)
        );
    }

    #[test]
    fn minimizer_stop_reasons_map_to_outcomes() {
        assert_eq!(termination_outcome(&TerminationReason::ResidualsZero), Ok(true));
        assert_eq!(termination_outcome(&TerminationReason::LostPatience), Ok(false));
        assert_eq!(
            termination_outcome(&TerminationReason::Numerical("jacobian")),
            Err(SolveError::NonFinite)
        );
        assert_eq!(
            termination_outcome(&TerminationReason::User("residuals")),
            Err(SolveError::NonFinite)
        );
        assert!(matches!(
            termination_outcome(&TerminationReason::NoResiduals),
            Err(SolveError::DegenerateConfiguration(_))
        ));
    }
}
