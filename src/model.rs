//! # Score-Model Traits
//!
//! The numerical core never owns a model: estimators, losses and samplers
//! receive the score function s(x) = ∇_x log p(x) through the traits below.
//! A model maps a batch of points to a batch of scores row by row; the
//! differentiable extension additionally exposes a directional derivative
//! (a forward-mode Jacobian-vector product), which is all the trace
//! estimator ever needs.
//!
//! Two closed-form models are provided alongside the traits: the isotropic
//! Gaussian and an equal-variance isotropic Gaussian mixture. Both carry
//! exact scores and exact JVPs, which makes them the reference points for
//! testing the learned-model paths.

use ndarray::{Array1, Array2};

use crate::error::{Result, ScoreError};

/// A score function s(x) = ∇_x log p(x), applied row-wise to batches.
pub trait ScoreModel {
    /// Input/output dimensionality D. Output rows always have this width.
    fn dim(&self) -> usize;

    /// Score for each row of `x` (B×D in, B×D out).
    fn score(&self, x: &Array2<f64>) -> Array2<f64>;
}

/// A score model through which directional derivatives can be computed.
pub trait DifferentiableScoreModel: ScoreModel {
    /// Per-row Jacobian-vector product: row k of the result is
    /// `J_s(x_k) · v_k`.
    ///
    /// Rows must be treated independently. Models that couple rows of a
    /// batch (e.g. through batch normalization) cannot satisfy this
    /// contract, and the fast trace strategy relies on it.
    fn jvp(&self, x: &Array2<f64>, v: &Array2<f64>) -> Array2<f64>;
}

/// A score model conditioned on a discrete noise-level index.
pub trait ConditionalScoreModel {
    /// Input/output dimensionality D.
    fn dim(&self) -> usize;

    /// Score for each row of `x` at its corresponding noise level.
    /// `levels.len()` must equal `x.nrows()`.
    fn score_at_level(&self, x: &Array2<f64>, levels: &[usize]) -> Array2<f64>;
}

/// Shared fail-fast check: batch is non-empty and matches the model width.
pub(crate) fn check_batch(dim: usize, x: &Array2<f64>) -> Result<()> {
    if x.nrows() == 0 {
        return Err(ScoreError::EmptyBatch);
    }
    if x.ncols() != dim {
        return Err(ScoreError::DimensionMismatch {
            expected: dim,
            got: x.ncols(),
        });
    }
    Ok(())
}

/// Closed-form score of an isotropic Gaussian N(mean, variance·I):
/// s(x) = (mean − x) / variance.
#[derive(Debug, Clone)]
pub struct GaussianScore {
    pub mean: Array1<f64>,
    pub variance: f64,
}

impl GaussianScore {
    pub fn new(mean: Array1<f64>, variance: f64) -> Result<Self> {
        if variance <= 0.0 {
            return Err(ScoreError::InvalidSigma(variance));
        }
        Ok(Self { mean, variance })
    }

    /// Standard normal in `dim` dimensions.
    pub fn standard(dim: usize) -> Self {
        Self {
            mean: Array1::zeros(dim),
            variance: 1.0,
        }
    }
}

impl ScoreModel for GaussianScore {
    fn dim(&self) -> usize {
        self.mean.len()
    }

    fn score(&self, x: &Array2<f64>) -> Array2<f64> {
        (x - &self.mean).mapv(|v| -v / self.variance)
    }
}

impl DifferentiableScoreModel for GaussianScore {
    // J = −I/variance everywhere, so J·v = −v/variance.
    fn jvp(&self, _x: &Array2<f64>, v: &Array2<f64>) -> Array2<f64> {
        v.mapv(|t| -t / self.variance)
    }
}

/// Closed-form score of a mixture of isotropic Gaussians sharing one
/// variance: p(x) = Σ_i w_i N(x; μ_i, σ²·I).
///
/// With posterior responsibilities r_i(x) and per-component scores
/// d_i(x) = (μ_i − x)/σ², the mixture score is s(x) = Σ_i r_i d_i and its
/// Jacobian-vector product is
/// `J·v = −v/σ² + Σ_i r_i ((d_i − s)·v) d_i`.
#[derive(Debug, Clone)]
pub struct GaussianMixtureScore {
    /// Component means, one per row (K×D).
    means: Array2<f64>,
    /// Mixture weights, normalized at construction.
    weights: Array1<f64>,
    /// Shared per-component variance σ².
    variance: f64,
}

impl GaussianMixtureScore {
    pub fn new(means: Array2<f64>, weights: Array1<f64>, variance: f64) -> Result<Self> {
        if variance <= 0.0 {
            return Err(ScoreError::InvalidSigma(variance));
        }
        if means.nrows() == 0 || means.nrows() != weights.len() {
            return Err(ScoreError::DimensionMismatch {
                expected: means.nrows(),
                got: weights.len(),
            });
        }
        let total: f64 = weights.sum();
        Ok(Self {
            means,
            weights: weights.mapv(|w| w / total),
            variance,
        })
    }

    pub fn dim(&self) -> usize {
        self.means.ncols()
    }

    /// Posterior responsibilities r_i(x) for one point, computed through
    /// log-sum-exp so distant components underflow gracefully.
    fn responsibilities(&self, x: &[f64]) -> Array1<f64> {
        let k = self.means.nrows();
        let mut log_terms = Array1::zeros(k);
        for i in 0..k {
            let sq: f64 = self
                .means
                .row(i)
                .iter()
                .zip(x)
                .map(|(m, xi)| (xi - m) * (xi - m))
                .sum();
            log_terms[i] = self.weights[i].ln() - 0.5 * sq / self.variance;
        }
        let max = log_terms.fold(f64::NEG_INFINITY, |a, &b| a.max(b));
        let mut r = log_terms.mapv(|l| (l - max).exp());
        let norm = r.sum();
        r.mapv_inplace(|v| v / norm);
        r
    }

    /// Unnormalized log-density at a single point; the additive constant is
    /// the mixture's normalizer, irrelevant to score and potential checks.
    pub fn log_density(&self, x: &[f64]) -> f64 {
        let d = self.dim() as f64;
        let log_norm = -0.5 * d * (2.0 * std::f64::consts::PI * self.variance).ln();
        let mut acc = f64::NEG_INFINITY;
        let mut terms = Vec::with_capacity(self.means.nrows());
        for i in 0..self.means.nrows() {
            let sq: f64 = self
                .means
                .row(i)
                .iter()
                .zip(x)
                .map(|(m, xi)| (xi - m) * (xi - m))
                .sum();
            let t = self.weights[i].ln() + log_norm - 0.5 * sq / self.variance;
            acc = acc.max(t);
            terms.push(t);
        }
        acc + terms.iter().map(|t| (t - acc).exp()).sum::<f64>().ln()
    }
}

impl ScoreModel for GaussianMixtureScore {
    fn dim(&self) -> usize {
        self.means.ncols()
    }

    fn score(&self, x: &Array2<f64>) -> Array2<f64> {
        let d = self.dim();
        let mut out = Array2::zeros((x.nrows(), d));
        for (k, row) in x.rows().into_iter().enumerate() {
            let xs = row.to_vec();
            let r = self.responsibilities(&xs);
            for i in 0..self.means.nrows() {
                for j in 0..d {
                    out[[k, j]] += r[i] * (self.means[[i, j]] - xs[j]) / self.variance;
                }
            }
        }
        out
    }
}

impl DifferentiableScoreModel for GaussianMixtureScore {
    fn jvp(&self, x: &Array2<f64>, v: &Array2<f64>) -> Array2<f64> {
        let d = self.dim();
        let scores = self.score(x);
        let mut out = v.mapv(|t| -t / self.variance);
        for k in 0..x.nrows() {
            let xs: Vec<f64> = x.row(k).to_vec();
            let r = self.responsibilities(&xs);
            for i in 0..self.means.nrows() {
                // (d_i − s) · v for this row
                let mut dot = 0.0;
                for j in 0..d {
                    let di = (self.means[[i, j]] - xs[j]) / self.variance;
                    dot += (di - scores[[k, j]]) * v[[k, j]];
                }
                for j in 0..d {
                    let di = (self.means[[i, j]] - xs[j]) / self.variance;
                    out[[k, j]] += r[i] * dot * di;
                }
            }
        }
        out
    }
}
