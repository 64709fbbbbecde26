//! # Reference Score Networks
//!
//! Small MLP score models used to exercise the estimator, loss and sampler
//! paths with a nontrivial architecture. Every activation carries an
//! analytic derivative, so the Jacobian-vector product is exact forward-mode
//! propagation through the layers rather than a finite-difference
//! approximation.
//!
//! Parameter optimization is an external concern; these networks expose
//! their forward and tangent passes and nothing else.

use ndarray::{Array1, Array2};
use rand::Rng;
use rand_distr::{Distribution, Normal};
use std::f64::consts::PI;

use crate::loss::NoiseSchedule;
use crate::model::{ConditionalScoreModel, DifferentiableScoreModel, ScoreModel};

/// Activation functions with analytic derivatives.
#[derive(Debug, Clone, Copy)]
pub enum ActivationFn {
    /// Gaussian Error Linear Unit (tanh approximation).
    Gelu,
    /// Rectified Linear Unit.
    Relu,
    /// Hyperbolic tangent.
    Tanh,
    /// Identity (no activation).
    Identity,
}

impl ActivationFn {
    pub fn apply(&self, x: f64) -> f64 {
        match self {
            ActivationFn::Gelu => {
                let sqrt_2_pi = (2.0 / PI).sqrt();
                0.5 * x * (1.0 + (sqrt_2_pi * (x + 0.044715 * x.powi(3))).tanh())
            }
            ActivationFn::Relu => x.max(0.0),
            ActivationFn::Tanh => x.tanh(),
            ActivationFn::Identity => x,
        }
    }

    pub fn derivative(&self, x: f64) -> f64 {
        match self {
            ActivationFn::Gelu => {
                let sqrt_2_pi = (2.0 / PI).sqrt();
                let inner = sqrt_2_pi * (x + 0.044715 * x.powi(3));
                let tanh_inner = inner.tanh();
                let sech2 = 1.0 - tanh_inner.powi(2);
                let inner_deriv = sqrt_2_pi * (1.0 + 3.0 * 0.044715 * x.powi(2));
                0.5 * (1.0 + tanh_inner) + 0.5 * x * sech2 * inner_deriv
            }
            ActivationFn::Relu => {
                if x > 0.0 {
                    1.0
                } else {
                    0.0
                }
            }
            ActivationFn::Tanh => 1.0 - x.tanh().powi(2),
            ActivationFn::Identity => 1.0,
        }
    }
}

/// Dense layer: y = act(Wx + b).
#[derive(Debug, Clone)]
pub struct Layer {
    /// Weight matrix (output_dim × input_dim).
    pub weights: Array2<f64>,
    /// Bias vector (output_dim).
    pub bias: Array1<f64>,
    /// Activation function.
    pub activation: ActivationFn,
}

impl Layer {
    /// Xavier/Glorot-initialized layer. The caller supplies the RNG so
    /// parameter draws are reproducible.
    pub fn new<R: Rng>(
        input_dim: usize,
        output_dim: usize,
        activation: ActivationFn,
        rng: &mut R,
    ) -> Self {
        let std = (2.0 / (input_dim + output_dim) as f64).sqrt();
        let normal = Normal::new(0.0, std).expect("finite init std");
        let weights = Array2::from_shape_fn((output_dim, input_dim), |_| normal.sample(rng));
        let bias = Array1::zeros(output_dim);
        Self {
            weights,
            bias,
            activation,
        }
    }

    pub fn forward(&self, input: &Array1<f64>) -> Array1<f64> {
        let z = self.weights.dot(input) + &self.bias;
        z.mapv(|v| self.activation.apply(v))
    }

    /// Forward pass carrying a tangent: returns (act(z), act'(z) ⊙ W·tangent).
    pub fn forward_tangent(
        &self,
        input: &Array1<f64>,
        tangent: &Array1<f64>,
    ) -> (Array1<f64>, Array1<f64>) {
        let z = self.weights.dot(input) + &self.bias;
        let dz = self.weights.dot(tangent);
        let a = z.mapv(|v| self.activation.apply(v));
        let da = Array1::from_iter(
            z.iter()
                .zip(dz.iter())
                .map(|(zi, dzi)| self.activation.derivative(*zi) * dzi),
        );
        (a, da)
    }
}

/// MLP score model s_θ: R^D → R^D with GELU hidden layers and a linear
/// output head.
#[derive(Debug, Clone)]
pub struct ScoreNet {
    input: Layer,
    hidden: Vec<Layer>,
    output: Layer,
    dim: usize,
}

impl ScoreNet {
    /// # Arguments
    ///
    /// * `dim` - Input/output dimensionality D
    /// * `hidden_dim` - Width of each hidden layer
    /// * `depth` - Number of hidden layers after the input projection
    /// * `rng` - Source for the parameter initialization
    pub fn new<R: Rng>(dim: usize, hidden_dim: usize, depth: usize, rng: &mut R) -> Self {
        let input = Layer::new(dim, hidden_dim, ActivationFn::Gelu, rng);
        let hidden = (0..depth)
            .map(|_| Layer::new(hidden_dim, hidden_dim, ActivationFn::Gelu, rng))
            .collect();
        let output = Layer::new(hidden_dim, dim, ActivationFn::Identity, rng);
        Self {
            input,
            hidden,
            output,
            dim,
        }
    }

    fn forward_row(&self, x: &Array1<f64>) -> Array1<f64> {
        let mut h = self.input.forward(x);
        for layer in &self.hidden {
            h = layer.forward(&h);
        }
        self.output.forward(&h)
    }

    fn forward_tangent_row(&self, x: &Array1<f64>, v: &Array1<f64>) -> Array1<f64> {
        let (mut h, mut dh) = self.input.forward_tangent(x, v);
        for layer in &self.hidden {
            let (nh, ndh) = layer.forward_tangent(&h, &dh);
            h = nh;
            dh = ndh;
        }
        let (_, dout) = self.output.forward_tangent(&h, &dh);
        dout
    }
}

impl ScoreModel for ScoreNet {
    fn dim(&self) -> usize {
        self.dim
    }

    fn score(&self, x: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.dim));
        for (k, row) in x.rows().into_iter().enumerate() {
            out.row_mut(k).assign(&self.forward_row(&row.to_owned()));
        }
        out
    }
}

impl DifferentiableScoreModel for ScoreNet {
    fn jvp(&self, x: &Array2<f64>, v: &Array2<f64>) -> Array2<f64> {
        let mut out = Array2::zeros((x.nrows(), self.dim));
        for k in 0..x.nrows() {
            let dout = self.forward_tangent_row(&x.row(k).to_owned(), &v.row(k).to_owned());
            out.row_mut(k).assign(&dout);
        }
        out
    }
}

/// Noise-conditioned score model: a [`ScoreNet`] body with an additive
/// learned embedding per noise level, for use with the NCSM loss and
/// annealed Langevin sampling.
#[derive(Debug, Clone)]
pub struct NoiseConditionedScoreNet {
    body: ScoreNet,
    /// One embedding row per noise level (K × hidden_dim).
    embeddings: Array2<f64>,
    schedule: NoiseSchedule,
}

impl NoiseConditionedScoreNet {
    pub fn new<R: Rng>(
        dim: usize,
        hidden_dim: usize,
        depth: usize,
        schedule: NoiseSchedule,
        rng: &mut R,
    ) -> Self {
        let body = ScoreNet::new(dim, hidden_dim, depth, rng);
        let std = (1.0 / hidden_dim as f64).sqrt();
        let normal = Normal::new(0.0, std).expect("finite init std");
        let embeddings =
            Array2::from_shape_fn((schedule.len(), hidden_dim), |_| normal.sample(rng));
        Self {
            body,
            embeddings,
            schedule,
        }
    }

    pub fn schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    fn forward_row(&self, x: &Array1<f64>, level: usize) -> Array1<f64> {
        let level = level.min(self.schedule.len() - 1);
        let mut h = self.body.input.forward(x);
        h += &self.embeddings.row(level);
        for layer in &self.body.hidden {
            h = layer.forward(&h);
        }
        self.body.output.forward(&h)
    }
}

impl ConditionalScoreModel for NoiseConditionedScoreNet {
    fn dim(&self) -> usize {
        self.body.dim
    }

    fn score_at_level(&self, x: &Array2<f64>, levels: &[usize]) -> Array2<f64> {
        debug_assert_eq!(levels.len(), x.nrows());
        let mut out = Array2::zeros((x.nrows(), self.body.dim));
        for (k, row) in x.rows().into_iter().enumerate() {
            out.row_mut(k)
                .assign(&self.forward_row(&row.to_owned(), levels[k]));
        }
        out
    }
}
