use thiserror::Error;

pub type Result<T> = std::result::Result<T, CorrectionError>;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum CorrectionError {
    // Configuration
    #[error("velocity threshold must be > 0, got {0}")]
    InvalidThreshold(f64),
    #[error("window must be > 0, got {0}")]
    InvalidWindow(f64),
    #[error("window of {0} poses is not a whole number")]
    FractionalPoseWindow(f64),
    #[error("unknown window unit '{0}' (expected poses, ms or s)")]
    UnknownWindowUnit(String),
    #[error("unknown correction method '{0}'")]
    UnknownMethod(String),
    #[error("unknown spline kind '{0}'")]
    UnknownSplineKind(String),

    // Data invariants
    #[error("sequence has no poses")]
    EmptySequence,
    #[error("timestamp of pose {index} ({timestamp}s) is before its predecessor ({previous}s)")]
    NonMonotonicTimestamps {
        index: usize,
        timestamp: f64,
        previous: f64,
    },
    #[error("pose {pose} has no joint '{label}'")]
    MissingJoint { pose: usize, label: String },
    #[error("pose {pose} has joint '{label}' which pose 0 does not")]
    UnexpectedJoint { pose: usize, label: String },
    #[error("{values} values for {times} time points")]
    LengthMismatch { values: usize, times: usize },
    #[error("{kind} interpolation needs at least {needed} samples, got {got}")]
    TooFewSamples {
        kind: &'static str,
        needed: usize,
        got: usize,
    },
    #[error("sample times must be strictly increasing (index {0})")]
    NotStrictlyIncreasing(usize),
    #[error("target time {time}s outside sampled range [{start}s, {end}s]")]
    OutOfRange { time: f64, start: f64, end: f64 },
    #[error("no joint labelled '{0}'")]
    UnknownJoint(String),
    #[error("two poses share timestamp {0}s, velocity is undefined")]
    ZeroDelay(f64),
}

impl CorrectionError {
    /// True for errors raised before any pose is processed.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            CorrectionError::InvalidThreshold(_)
                | CorrectionError::InvalidWindow(_)
                | CorrectionError::FractionalPoseWindow(_)
                | CorrectionError::UnknownWindowUnit(_)
                | CorrectionError::UnknownMethod(_)
                | CorrectionError::UnknownSplineKind(_)
        )
    }
}
