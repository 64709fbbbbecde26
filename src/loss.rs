//! # Score-Matching Losses
//!
//! The three objectives that fit a score model to data:
//!
//! - **ISM** (implicit): `mean(tr J_s(x) + 0.5·‖s(x)‖²)`. Needs the
//!   Jacobian-trace estimator but no noise and no density.
//! - **DSM** (denoising): noise each point with a fixed σ and regress the
//!   score at the noised point onto `−ε/σ`. The q(y|x) kernel is
//!   N(y; x, σ²·I), hence ∇_y log q = (x − y)/σ². The smaller σ, the larger
//!   the targets and gradients, since q peaks more sharply.
//! - **NCSM** (noise-conditional): DSM across a schedule of noise levels
//!   with a level-conditioned model; each sample draws its own level and is
//!   weighted by λ(σ) = σ² before the batch mean, which equalizes the loss
//!   magnitude across levels.
//!
//! All randomness comes through the caller's RNG; seeding it is the only
//! reproducibility knob.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, StandardNormal};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};
use crate::jacobian::{trace_of_jacobian, TraceStrategy};
use crate::model::{check_batch, ConditionalScoreModel, DifferentiableScoreModel, ScoreModel};

/// An ordered set of positive noise levels σ_1..σ_K, immutable after
/// construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NoiseSchedule {
    sigmas: Array1<f64>,
}

impl NoiseSchedule {
    pub fn new(sigmas: Array1<f64>) -> Result<Self> {
        if sigmas.is_empty() {
            return Err(ScoreError::EmptySchedule);
        }
        for &s in sigmas.iter() {
            if s <= 0.0 {
                return Err(ScoreError::InvalidSigma(s));
            }
        }
        Ok(Self { sigmas })
    }

    /// Geometric schedule from `sigma_max` down to `sigma_min`, the standard
    /// choice for noise-conditional training.
    pub fn geometric(sigma_max: f64, sigma_min: f64, len: usize) -> Result<Self> {
        if len == 0 {
            return Err(ScoreError::EmptySchedule);
        }
        if sigma_max <= 0.0 {
            return Err(ScoreError::InvalidSigma(sigma_max));
        }
        if sigma_min <= 0.0 {
            return Err(ScoreError::InvalidSigma(sigma_min));
        }
        let sigmas = Array1::from_iter((0..len).map(|i| {
            let t = i as f64 / (len - 1).max(1) as f64;
            sigma_max * (sigma_min / sigma_max).powf(t)
        }));
        Ok(Self { sigmas })
    }

    pub fn len(&self) -> usize {
        self.sigmas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sigmas.is_empty()
    }

    /// Noise level at `level`, clamped to the last entry.
    pub fn sigma(&self, level: usize) -> f64 {
        self.sigmas[level.min(self.sigmas.len() - 1)]
    }

    /// Smallest noise level in the schedule.
    pub fn sigma_min(&self) -> f64 {
        self.sigmas.fold(f64::INFINITY, |a, &b| a.min(b))
    }

    pub fn sigmas(&self) -> &Array1<f64> {
        &self.sigmas
    }
}

fn standard_noise<R: Rng>(shape: (usize, usize), rng: &mut R) -> Array2<f64> {
    Array2::from_shape_fn(shape, |_| StandardNormal.sample(rng))
}

/// Implicit score-matching loss:
/// `mean_k( tr J_s(x_k) + 0.5·‖s(x_k)‖² )`.
///
/// Unbiased (up to a data-dependent constant) estimator of the Fisher
/// divergence between the model score and the true data score; its cost is
/// dominated entirely by the trace estimator.
pub fn ism_loss<M: DifferentiableScoreModel>(
    model: &M,
    x: &Array2<f64>,
    strategy: TraceStrategy,
) -> Result<f64> {
    let tr = trace_of_jacobian(model, x, strategy)?;
    let scores = model.score(x);
    let b = x.nrows();
    let mut total = 0.0;
    for k in 0..b {
        let sq: f64 = scores.row(k).iter().map(|s| s * s).sum();
        total += tr[k] + 0.5 * sq;
    }
    Ok(total / b as f64)
}

/// Denoising score-matching loss at a fixed noise scale σ > 0:
/// `0.5·mean_k( ‖s(x_k + σε_k) + ε_k/σ‖² )`.
pub fn dsm_loss<M: ScoreModel, R: Rng>(
    model: &M,
    x: &Array2<f64>,
    sigma: f64,
    rng: &mut R,
) -> Result<f64> {
    if sigma <= 0.0 {
        return Err(ScoreError::InvalidSigma(sigma));
    }
    check_batch(model.dim(), x)?;

    let eps = standard_noise(x.dim(), rng);
    let x_noisy = x + &(&eps * sigma);
    let targets = eps.mapv(|e| -e / sigma);
    let scores = model.score(&x_noisy);

    let b = x.nrows();
    let mut total = 0.0;
    for k in 0..b {
        let sq: f64 = scores
            .row(k)
            .iter()
            .zip(targets.row(k).iter())
            .map(|(s, t)| (s - t) * (s - t))
            .sum();
        total += 0.5 * sq;
    }
    Ok(total / b as f64)
}

/// Noise-conditional score-matching loss over a schedule of K levels.
///
/// Each sample draws its own level uniformly, is noised at that level, and
/// contributes `0.5·σ²·‖s(x+σε, level) + ε/σ‖²`; the σ² weighting is applied
/// per sample, before the batch mean.
pub fn ncsm_loss<M: ConditionalScoreModel, R: Rng>(
    model: &M,
    x: &Array2<f64>,
    schedule: &NoiseSchedule,
    rng: &mut R,
) -> Result<f64> {
    check_batch(model.dim(), x)?;

    let (b, d) = x.dim();
    let eps = standard_noise((b, d), rng);
    let levels: Vec<usize> = (0..b).map(|_| rng.gen_range(0..schedule.len())).collect();

    let mut x_noisy = x.to_owned();
    for k in 0..b {
        let sigma = schedule.sigma(levels[k]);
        for j in 0..d {
            x_noisy[[k, j]] += sigma * eps[[k, j]];
        }
    }

    let scores = model.score_at_level(&x_noisy, &levels);

    let mut total = 0.0;
    for k in 0..b {
        let sigma = schedule.sigma(levels[k]);
        let sq: f64 = scores
            .row(k)
            .iter()
            .zip(eps.row(k).iter())
            .map(|(s, e)| {
                let t = -e / sigma;
                (s - t) * (s - t)
            })
            .sum();
        total += 0.5 * sq * sigma * sigma;
    }
    Ok(total / b as f64)
}

/// Implicit score matching with the trace strategy fixed at construction.
#[derive(Debug, Clone, Copy)]
pub struct IsmLoss {
    pub strategy: TraceStrategy,
}

impl IsmLoss {
    pub fn new(strategy: TraceStrategy) -> Self {
        if strategy == TraceStrategy::Fast {
            log::warn!(
                "fast Jacobian-trace strategy replicates the batch D-fold and \
                 requires the model to treat rows independently"
            );
        }
        Self { strategy }
    }

    pub fn loss<M: DifferentiableScoreModel>(&self, model: &M, x: &Array2<f64>) -> Result<f64> {
        ism_loss(model, x, self.strategy)
    }
}

/// Denoising score matching with σ fixed at construction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DsmLoss {
    sigma: f64,
}

impl DsmLoss {
    pub fn new(sigma: f64) -> Result<Self> {
        if sigma <= 0.0 {
            return Err(ScoreError::InvalidSigma(sigma));
        }
        Ok(Self { sigma })
    }

    pub fn sigma(&self) -> f64 {
        self.sigma
    }

    pub fn loss<M: ScoreModel, R: Rng>(
        &self,
        model: &M,
        x: &Array2<f64>,
        rng: &mut R,
    ) -> Result<f64> {
        dsm_loss(model, x, self.sigma, rng)
    }
}

/// Noise-conditional score matching owning its schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NcsmLoss {
    schedule: NoiseSchedule,
}

impl NcsmLoss {
    pub fn new(schedule: NoiseSchedule) -> Self {
        Self { schedule }
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    pub fn loss<M: ConditionalScoreModel, R: Rng>(
        &self,
        model: &M,
        x: &Array2<f64>,
        rng: &mut R,
    ) -> Result<f64> {
        ncsm_loss(model, x, &self.schedule, rng)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GaussianMixtureScore, GaussianScore};
    use approx::assert_relative_eq;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    /// Conditional wrapper that ignores its level input; used to pin NCSM
    /// against DSM on a one-level schedule.
    struct LevelBlind(GaussianScore);

    impl ConditionalScoreModel for LevelBlind {
        fn dim(&self) -> usize {
            ScoreModel::dim(&self.0)
        }

        fn score_at_level(&self, x: &Array2<f64>, _levels: &[usize]) -> Array2<f64> {
            self.0.score(x)
        }
    }

    #[test]
    fn schedule_validation() {
        assert_eq!(
            NoiseSchedule::new(Array1::zeros(0)),
            Err(ScoreError::EmptySchedule)
        );
        assert_eq!(
            NoiseSchedule::new(array![1.0, 0.0]),
            Err(ScoreError::InvalidSigma(0.0))
        );
        assert!(NoiseSchedule::new(array![1.0, 0.1]).is_ok());
    }

    #[test]
    fn geometric_schedule_endpoints() {
        let s = NoiseSchedule::geometric(1.0, 0.01, 10).unwrap();
        assert_eq!(s.len(), 10);
        assert_relative_eq!(s.sigma(0), 1.0, epsilon = 1e-12);
        assert_relative_eq!(s.sigma(9), 0.01, epsilon = 1e-12);
        for i in 1..10 {
            assert!(s.sigma(i) < s.sigma(i - 1));
        }
        assert_relative_eq!(s.sigma_min(), 0.01, epsilon = 1e-12);
    }

    #[test]
    fn ism_invariant_to_trace_strategy() {
        let model = GaussianMixtureScore::new(
            array![[-2.0, -2.0], [2.0, 2.0]],
            array![0.2, 0.8],
            1.0,
        )
        .unwrap();
        let x = array![[0.5, -0.5], [1.0, 2.0], [-1.8, -2.2]];
        let a = ism_loss(&model, &x, TraceStrategy::Exact).unwrap();
        let b = ism_loss(&model, &x, TraceStrategy::Fast).unwrap();
        assert_relative_eq!(a, b, epsilon = 1e-10);
    }

    #[test]
    fn ism_closed_form_for_standard_normal() {
        // s(x) = −x, tr J = −D, so the loss is mean(−D + 0.5‖x‖²).
        let model = GaussianScore::standard(2);
        let x = array![[1.0, 1.0], [2.0, 0.0]];
        let expected = ((-2.0 + 0.5 * 2.0) + (-2.0 + 0.5 * 4.0)) / 2.0;
        let loss = ism_loss(&model, &x, TraceStrategy::Exact).unwrap();
        assert_relative_eq!(loss, expected, epsilon = 1e-12);
    }

    #[test]
    fn dsm_sensitivity_grows_as_sigma_shrinks() {
        let model = GaussianScore::standard(2);
        let x = array![[0.3, -0.2], [1.0, 0.4], [-0.7, 0.9], [0.0, 0.0]];
        let mut previous = 0.0;
        for (i, sigma) in [0.5, 0.25, 0.1, 0.05].iter().enumerate() {
            // Reseed per sigma so every loss sees the same noise draws.
            let mut rng = StdRng::seed_from_u64(99);
            let loss = dsm_loss(&model, &x, *sigma, &mut rng).unwrap();
            if i > 0 {
                assert!(loss > previous, "loss must grow as sigma shrinks");
            }
            previous = loss;
        }
    }

    #[test]
    fn one_level_ncsm_is_sigma_squared_dsm() {
        let sigma = 0.4;
        let model = GaussianScore::standard(2);
        let conditional = LevelBlind(GaussianScore::standard(2));
        let x = array![[0.5, -0.5], [1.2, 0.3], [-0.8, -0.1]];
        let schedule = NoiseSchedule::new(array![sigma]).unwrap();

        let mut rng = StdRng::seed_from_u64(5);
        let dsm = dsm_loss(&model, &x, sigma, &mut rng).unwrap();
        let mut rng = StdRng::seed_from_u64(5);
        let ncsm = ncsm_loss(&conditional, &x, &schedule, &mut rng).unwrap();

        assert_relative_eq!(ncsm, sigma * sigma * dsm, epsilon = 1e-10);
    }

    #[test]
    fn fail_fast_on_bad_inputs() {
        let model = GaussianScore::standard(2);
        let mut rng = StdRng::seed_from_u64(0);

        let x = array![[0.0, 0.0]];
        assert_eq!(
            dsm_loss(&model, &x, -1.0, &mut rng),
            Err(ScoreError::InvalidSigma(-1.0))
        );
        assert_eq!(DsmLoss::new(0.0), Err(ScoreError::InvalidSigma(0.0)));

        let empty = Array2::<f64>::zeros((0, 2));
        assert_eq!(
            dsm_loss(&model, &empty, 0.1, &mut rng),
            Err(ScoreError::EmptyBatch)
        );
        assert_eq!(
            ism_loss(&model, &empty, TraceStrategy::Exact),
            Err(ScoreError::EmptyBatch)
        );
    }

    #[test]
    fn loss_objects_match_free_functions() {
        let model = GaussianScore::standard(2);
        let x = array![[0.4, 0.6], [-1.0, 0.2]];

        let obj = IsmLoss::new(TraceStrategy::Fast);
        assert_relative_eq!(
            obj.loss(&model, &x).unwrap(),
            ism_loss(&model, &x, TraceStrategy::Fast).unwrap(),
            epsilon = 1e-12
        );

        let dsm = DsmLoss::new(0.2).unwrap();
        let mut r1 = StdRng::seed_from_u64(17);
        let mut r2 = StdRng::seed_from_u64(17);
        assert_relative_eq!(
            dsm.loss(&model, &x, &mut r1).unwrap(),
            dsm_loss(&model, &x, 0.2, &mut r2).unwrap(),
            epsilon = 1e-12
        );
    }
}
