//! Run configuration: pattern geometry, sample policy, detector and solver tuning.

use crate::chessboard::{ChessboardDetector, ChessboardError, ChessboardParams};
use crate::core::{PatternError, PatternModel};
use crate::solver::{SolverParams, MIN_VIEWS};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// Inner-corner grid of the printed checkerboard.
#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct PatternConfig {
    pub rows: usize,
    pub cols: usize,
    /// Square side in physical units; the solved translations use the same unit.
    pub spacing: f64,
}

impl Default for PatternConfig {
    fn default() -> Self {
        Self {
            rows: 8,
            cols: 6,
            spacing: 25.0,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub pattern: PatternConfig,
    /// Fewest detected frames required before solving.
    pub min_samples: usize,
    /// At most this many detected frames (the earliest ones) are solved.
    pub max_samples: usize,
    pub detector: ChessboardParams,
    pub solver: SolverParams,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            pattern: PatternConfig::default(),
            min_samples: 5,
            max_samples: 50,
            detector: ChessboardParams::default(),
            solver: SolverParams::default(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(transparent)]
    Pattern(#[from] PatternError),
    #[error(transparent)]
    Detector(#[from] ChessboardError),
    #[error("min_samples must be at least 1")]
    ZeroMinSamples,
    #[error("min_samples ({found}) is below the {required} views the solver needs")]
    TooFewSamples { found: usize, required: usize },
    #[error("min_samples ({min}) exceeds max_samples ({max})")]
    MinExceedsMax { min: usize, max: usize },
    #[error("{name} must be finite and positive (got {value})")]
    NonPositiveTolerance { name: &'static str, value: f64 },
    #[error("{0} must be at least 1")]
    ZeroIterations(&'static str),
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigIoError {
    #[error("failed to access {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid JSON in {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

fn check_tolerance(name: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NonPositiveTolerance { name, value })
    }
}

impl CalibrationConfig {
    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.pattern_model()?;
        if self.min_samples == 0 {
            return Err(ConfigError::ZeroMinSamples);
        }
        if self.min_samples < MIN_VIEWS {
            return Err(ConfigError::TooFewSamples {
                found: self.min_samples,
                required: MIN_VIEWS,
            });
        }
        if self.min_samples > self.max_samples {
            return Err(ConfigError::MinExceedsMax {
                min: self.min_samples,
                max: self.max_samples,
            });
        }
        check_tolerance("solver.tolerance", self.solver.tolerance)?;
        check_tolerance("solver.step_bound", self.solver.step_bound)?;
        if self.solver.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("solver.max_iterations"));
        }
        let refine = &self.detector.refine;
        check_tolerance("detector.refine.tolerance", refine.tolerance)?;
        if refine.max_iterations == 0 {
            return Err(ConfigError::ZeroIterations("detector.refine.max_iterations"));
        }
        // Window parity and size are owned by the detector constructor.
        self.detector()?;
        Ok(())
    }

    pub fn pattern_model(&self) -> Result<PatternModel, ConfigError> {
        let p = &self.pattern;
        Ok(PatternModel::new(p.rows, p.cols, p.spacing)?)
    }

    pub fn detector(&self) -> Result<ChessboardDetector, ConfigError> {
        Ok(ChessboardDetector::new(
            self.pattern.rows,
            self.pattern.cols,
            self.detector.clone(),
        )?)
    }

    /// Read a config from JSON; absent fields take their defaults.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigIoError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| ConfigIoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::from_reader(BufReader::new(file)).map_err(|source| ConfigIoError::Json {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigIoError> {
        let path = path.as_ref();
        let file = File::create(path).map_err(|source| ConfigIoError::Io {
            path: path.display().to_string(),
            source,
        })?;
        serde_json::to_writer_pretty(BufWriter::new(file), self).map_err(|source| {
            ConfigIoError::Json {
                path: path.display().to_string(),
                source,
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let cfg = CalibrationConfig::default();
        assert_eq!((cfg.pattern.rows, cfg.pattern.cols), (8, 6));
        assert_eq!(cfg.pattern.spacing, 25.0);
        assert_eq!((cfg.min_samples, cfg.max_samples), (5, 50));
        assert_eq!(cfg.solver.tolerance, 1e-5);
        assert_eq!(cfg.solver.max_iterations, 20);
        assert_eq!(cfg.detector.refine.window_size, 11);
        assert_eq!(cfg.detector.refine.tolerance, 0.1);
        assert_eq!(cfg.detector.refine.max_iterations, 30);
        cfg.validate().expect("default config");
    }

    #[test]
    fn partial_json_fills_defaults() {
        let cfg: CalibrationConfig =
            serde_json::from_str(r#"{ "pattern": { "rows": 9 }, "min_samples": 3 }"#)
                .expect("parse");
        assert_eq!(cfg.pattern.rows, 9);
        assert_eq!(cfg.pattern.cols, 6);
        assert_eq!(cfg.min_samples, 3);
        assert_eq!(cfg.max_samples, 50);
        assert_eq!(cfg.detector, ChessboardParams::default());
    }

    #[test]
    fn invalid_settings_are_rejected() {
        let with = |f: fn(&mut CalibrationConfig)| {
            let mut cfg = CalibrationConfig::default();
            f(&mut cfg);
            cfg.validate()
        };

        assert!(matches!(
            with(|c| c.pattern.rows = 1),
            Err(ConfigError::Pattern(PatternError::TooSmall { .. }))
        ));
        assert!(matches!(
            with(|c| c.pattern.spacing = 0.0),
            Err(ConfigError::Pattern(PatternError::InvalidSpacing(_)))
        ));
        assert!(matches!(
            with(|c| c.pattern.spacing = f64::NAN),
            Err(ConfigError::Pattern(PatternError::InvalidSpacing(_)))
        ));
        assert_eq!(with(|c| c.min_samples = 0), Err(ConfigError::ZeroMinSamples));
        assert_eq!(
            with(|c| c.min_samples = 1),
            Err(ConfigError::TooFewSamples {
                found: 1,
                required: MIN_VIEWS
            })
        );
        assert_eq!(
            with(|c| {
                c.min_samples = 1;
                c.max_samples = 1;
            }),
            Err(ConfigError::TooFewSamples {
                found: 1,
                required: MIN_VIEWS
            })
        );
        assert_eq!(
            with(|c| {
                c.min_samples = 2;
                c.max_samples = 1;
            }),
            Err(ConfigError::MinExceedsMax { min: 2, max: 1 })
        );
        assert_eq!(
            with(|c| {
                c.min_samples = MIN_VIEWS;
                c.max_samples = MIN_VIEWS;
            }),
            Ok(())
        );
        assert_eq!(
            with(|c| c.min_samples = 60),
            Err(ConfigError::MinExceedsMax { min: 60, max: 50 })
        );
        assert!(matches!(
            with(|c| c.solver.tolerance = -1.0),
            Err(ConfigError::NonPositiveTolerance { .. })
        ));
        assert_eq!(
            with(|c| c.solver.step_bound = 0.0),
            Err(ConfigError::NonPositiveTolerance {
                name: "solver.step_bound",
                value: 0.0
            })
        );
        assert_eq!(
            with(|c| c.solver.max_iterations = 0),
            Err(ConfigError::ZeroIterations("solver.max_iterations"))
        );
        assert_eq!(
            with(|c| c.detector.refine.max_iterations = 0),
            Err(ConfigError::ZeroIterations("detector.refine.max_iterations"))
        );
        assert_eq!(
            with(|c| c.detector.refine.window_size = 10),
            Err(ConfigError::Detector(ChessboardError::InvalidWindow(10)))
        );
        assert_eq!(
            with(|c| c.detector.refine.window_size = 1),
            Err(ConfigError::Detector(ChessboardError::InvalidWindow(1)))
        );
    }
}
