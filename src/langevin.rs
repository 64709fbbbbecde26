//! # Unadjusted Langevin Sampling
//!
//! Draws approximate samples from the distribution a score model implies,
//! by simulating the discretized Langevin SDE:
//!
//! `x_{t+1} = x_t + τ·s(x_t) + sqrt(2τ)·z_t`, `z_t ~ N(0, I)`.
//!
//! Unadjusted means no Metropolis acceptance step: the discretization bias
//! at fixed τ is an accepted trade-off. An oversized τ diverges; there is
//! no internal safeguard, and NaN/Inf propagate to the caller untouched.
//!
//! Steps depend strictly on each other in time, so they cannot be
//! reordered; only the batch dimension parallelizes. The sampler keeps no
//! state between calls, and reproducibility is entirely in the caller's
//! RNG seed.

use ndarray::Array2;
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};
use crate::loss::NoiseSchedule;
use crate::model::{check_batch, ConditionalScoreModel, ScoreModel};

/// Configuration for [`ula`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LangevinConfig {
    /// Step size τ > 0. Too large diverges; caller's responsibility.
    pub tau: f64,
    /// Total number of simulated steps T.
    pub n_steps: usize,
    /// Steps discarded before the trajectory is recorded, 0 ≤ T_b < T.
    /// `n_steps - 1` keeps only the final state.
    pub n_burnin: usize,
}

impl Default for LangevinConfig {
    fn default() -> Self {
        Self {
            tau: 1e-2,
            n_steps: 1000,
            n_burnin: 999,
        }
    }
}

impl LangevinConfig {
    fn validate(&self) -> Result<()> {
        if self.tau <= 0.0 {
            return Err(ScoreError::InvalidStepSize(self.tau));
        }
        if self.n_burnin >= self.n_steps {
            return Err(ScoreError::InvalidBurnIn {
                n_burnin: self.n_burnin,
                n_steps: self.n_steps,
            });
        }
        Ok(())
    }
}

fn standard_noise<R: Rng>(shape: (usize, usize), rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| StandardNormal.sample(rng))
}

/// Unadjusted Langevin algorithm.
///
/// # Arguments
///
/// * `model` - Score model, evaluated in inference mode only
/// * `x0` - Initial batch (B×D)
/// * `config` - Step size, step count and burn-in
/// * `rng` - Noise source; seed it for reproducible trajectories
///
/// # Returns
///
/// The trajectory of the last `n_steps - n_burnin` states, one owned B×D
/// batch per retained step, oldest first.
pub fn ula<M: ScoreModel, R: Rng>(
    model: &M,
    x0: &Array2<f64>,
    config: &LangevinConfig,
    rng: &mut R,
) -> Result<Vec<Array2<f64>>> {
    config.validate()?;
    check_batch(model.dim(), x0)?;

    let noise_scale = (2.0 * config.tau).sqrt();
    let mut x = x0.to_owned();
    let mut trajectory = Vec::with_capacity(config.n_steps - config.n_burnin);

    for step in 0..config.n_steps {
        let drift = model.score(&x);
        let z = standard_noise(x.dim(), rng);
        x = &x + &(&drift * config.tau) + &(&z * noise_scale);
        if step >= config.n_burnin {
            trajectory.push(x.clone());
        }
    }
    Ok(trajectory)
}

/// Final state of a [`ula`] run, for callers who want no history.
pub fn ula_final<M: ScoreModel, R: Rng>(
    model: &M,
    x0: &Array2<f64>,
    config: &LangevinConfig,
    rng: &mut R,
) -> Result<Array2<f64>> {
    let keep_last = LangevinConfig {
        n_burnin: config.n_steps.saturating_sub(1),
        ..*config
    };
    let mut trajectory = ula(model, x0, &keep_last, rng)?;
    Ok(trajectory.pop().expect("trajectory holds the final state"))
}

/// Annealed Langevin sampling for a noise-conditioned model.
///
/// Walks the schedule from its first (largest) σ down to its last, running
/// `steps_per_level` ULA steps per level with the level-scaled step size
/// `base_tau · σ² / σ_min²`, and returns the final batch.
pub fn annealed_ula<M: ConditionalScoreModel, R: Rng>(
    model: &M,
    x0: &Array2<f64>,
    schedule: &NoiseSchedule,
    steps_per_level: usize,
    base_tau: f64,
    rng: &mut R,
) -> Result<Array2<f64>> {
    if base_tau <= 0.0 {
        return Err(ScoreError::InvalidStepSize(base_tau));
    }
    check_batch(model.dim(), x0)?;

    let sigma_min = schedule.sigma_min();
    let mut x = x0.to_owned();

    for level in 0..schedule.len() {
        let sigma = schedule.sigma(level);
        let tau = base_tau * sigma * sigma / (sigma_min * sigma_min);
        let noise_scale = (2.0 * tau).sqrt();
        let levels = vec![level; x.nrows()];

        for _ in 0..steps_per_level {
            let drift = model.score_at_level(&x, &levels);
            let z = standard_noise(x.dim(), rng);
            x = &x + &(&drift * tau) + &(&z * noise_scale);
        }
    }
    Ok(x)
}
