//! # Error Types
//!
//! Every fallible operation in this crate fails fast on a contract violation
//! and returns one of the variants below. Numerical instability (NaN/Inf from
//! an oversized Langevin step, a wildly mis-scaled score model) is deliberately
//! *not* represented here: it propagates through the output arrays untouched,
//! so the caller sees the tuning problem instead of a masked error. There is
//! no retry logic anywhere; every computation is deterministic given its
//! inputs and RNG, so a retry would reproduce the same failure.

use thiserror::Error;

/// Errors produced by the score-matching core.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ScoreError {
    #[error("batch is empty")]
    EmptyBatch,

    #[error("batch width {got} does not match model dimension {expected}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("noise scale must be positive, got {0}")]
    InvalidSigma(f64),

    #[error("step size must be positive, got {0}")]
    InvalidStepSize(f64),

    #[error("burn-in ({n_burnin}) must be smaller than the step count ({n_steps})")]
    InvalidBurnIn { n_burnin: usize, n_steps: usize },

    #[error("grid needs at least 2 points per axis, got {n_x}x{n_y}")]
    DegenerateGrid { n_x: usize, n_y: usize },

    #[error("noise schedule is empty")]
    EmptySchedule,

    #[error("vector field shape {got:?} does not match grid {expected:?}")]
    FieldShapeMismatch {
        expected: (usize, usize, usize),
        got: (usize, usize, usize),
    },
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ScoreError>;
