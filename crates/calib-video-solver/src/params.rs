use serde::{Deserialize, Serialize};

/// Stopping rules of the joint refinement.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct SolverParams {
    /// Stop when a step lowers the squared error by less than this fraction.
    pub tolerance: f64,
    /// Budget in rounds of `n + 1` objective evaluations for `n` parameters.
    pub max_iterations: usize,
    /// Initial trust-region radius as a multiple of the scaled parameter norm.
    pub step_bound: f64,
}

impl Default for SolverParams {
    fn default() -> Self {
        Self {
            tolerance: 1e-5,
            max_iterations: 20,
            step_bound: 100.0,
        }
    }
}
