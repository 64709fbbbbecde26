//! # Score Matching
//!
//! Numerical core for estimating and exploiting the score (gradient of
//! log-density) of an unknown data distribution.
//!
//! This library provides:
//! - Jacobian-trace estimation for the implicit score-matching objective,
//!   with an exact and a fast replicated-input strategy
//! - The score-matching loss family: implicit, denoising, noise-conditional
//! - Unadjusted and annealed Langevin dynamics for sampling
//! - Reconstruction of a scalar potential from a sampled 2-D score field
//!
//! The trainable score model stays outside the crate: everything here
//! consumes it through the [`model::ScoreModel`] traits (batch in, batch
//! out, with a directional-derivative primitive where differentiation is
//! needed). Reference MLP and closed-form models are included for tests
//! and experiments.
//!
//! ## Example
//!
//! ```rust
//! use ndarray::array;
//! use rand::rngs::StdRng;
//! use rand::SeedableRng;
//! use score_matching::{
//!     ism_loss, ula, GaussianScore, LangevinConfig, TraceStrategy,
//! };
//!
//! fn main() -> Result<(), score_matching::ScoreError> {
//!     let model = GaussianScore::standard(2);
//!     let batch = array![[0.5, -0.5], [1.0, 0.0]];
//!
//!     let loss = ism_loss(&model, &batch, TraceStrategy::Fast)?;
//!     assert!(loss.is_finite());
//!
//!     let mut rng = StdRng::seed_from_u64(0);
//!     let config = LangevinConfig { tau: 1e-2, n_steps: 100, n_burnin: 99 };
//!     let trajectory = ula(&model, &batch, &config, &mut rng)?;
//!     assert_eq!(trajectory.len(), 1);
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod field;
pub mod jacobian;
pub mod langevin;
pub mod loss;
pub mod model;
pub mod network;

pub use error::{Result, ScoreError};
pub use field::{
    integrate_field, integrate_field_along, integrate_score_grid, score_grid, GridSpec, PathOrder,
};
pub use jacobian::{trace_of_jacobian, TraceStrategy};
pub use langevin::{annealed_ula, ula, ula_final, LangevinConfig};
pub use loss::{dsm_loss, ism_loss, ncsm_loss, DsmLoss, IsmLoss, NcsmLoss, NoiseSchedule};
pub use model::{
    ConditionalScoreModel, DifferentiableScoreModel, GaussianMixtureScore, GaussianScore,
    ScoreModel,
};
pub use network::{ActivationFn, Layer, NoiseConditionedScoreNet, ScoreNet};

/// Library version.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
