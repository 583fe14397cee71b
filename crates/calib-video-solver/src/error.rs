/// Errors returned by [`calibrate`](crate::calibrate).
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SolveError {
    #[error("need at least {required} views, got {found}")]
    NotEnoughViews { found: usize, required: usize },
    #[error("view {view}: {reason}")]
    InvalidCorrespondence { view: usize, reason: String },
    #[error("degenerate configuration: {0}")]
    DegenerateConfiguration(String),
    #[error("normal equations are singular: some parameter moves no residual")]
    Singular,
    #[error("solver produced non-finite values")]
    NonFinite,
}

/// Errors returned by [`validate`](crate::validate).
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{poses} poses for {views} views")]
    PoseCountMismatch { poses: usize, views: usize },
    #[error("view {view}: {object} pattern points but {image} detections")]
    PointCountMismatch {
        view: usize,
        object: usize,
        image: usize,
    },
    #[error("view {0} has no points")]
    EmptyView(usize),
}
