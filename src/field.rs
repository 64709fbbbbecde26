//! # Conservative-Field Integration
//!
//! Reconstructs a scalar potential U from a 2-D vector field V sampled on a
//! regular grid, assuming ∇U ≈ V. A trained score field that is (close to)
//! conservative integrates to its log-density up to a constant, which is
//! the main validation tool for a learned score.
//!
//! The walk is an L-shaped path from the grid's first corner: seed the
//! corner, accumulate trapezoidal x-increments along the bottom row, then
//! accumulate trapezoidal y-increments up every column. On a genuinely
//! conservative field the result is path-independent up to discretization
//! error; on a non-conservative field it is path-dependent and only
//! approximate, which is an accepted limitation, not something the
//! integrator tries to correct.

use ndarray::{Array2, Array3};
use serde::{Deserialize, Serialize};

use crate::error::{Result, ScoreError};
use crate::model::ScoreModel;

/// A regular grid over axis-aligned extents.
///
/// Fields are stored y-major: `field[[iy, ix, 0]]` is Vx and
/// `field[[iy, ix, 1]]` is Vy at `(x(ix), y(iy))`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GridSpec {
    pub xlim: (f64, f64),
    pub ylim: (f64, f64),
    pub n_x: usize,
    pub n_y: usize,
}

impl GridSpec {
    pub fn new(xlim: (f64, f64), ylim: (f64, f64), n_x: usize, n_y: usize) -> Self {
        Self {
            xlim,
            ylim,
            n_x,
            n_y,
        }
    }

    /// Square grid with the same extents and count on both axes.
    pub fn square(lim: (f64, f64), n: usize) -> Self {
        Self::new(lim, lim, n, n)
    }

    fn validate(&self) -> Result<()> {
        if self.n_x < 2 || self.n_y < 2 {
            return Err(ScoreError::DegenerateGrid {
                n_x: self.n_x,
                n_y: self.n_y,
            });
        }
        Ok(())
    }

    /// Grid spacing in x: (x1 − x0) / (n_x − 1).
    pub fn hx(&self) -> f64 {
        (self.xlim.1 - self.xlim.0) / (self.n_x - 1) as f64
    }

    /// Grid spacing in y: (y1 − y0) / (n_y − 1).
    pub fn hy(&self) -> f64 {
        (self.ylim.1 - self.ylim.0) / (self.n_y - 1) as f64
    }

    pub fn x(&self, ix: usize) -> f64 {
        self.xlim.0 + ix as f64 * self.hx()
    }

    pub fn y(&self, iy: usize) -> f64 {
        self.ylim.0 + iy as f64 * self.hy()
    }
}

/// Which leg of the L-path is walked first. [`integrate_field`] uses
/// [`PathOrder::XThenY`]; the transposed order exists so path-independence
/// can be checked on a given field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathOrder {
    /// Bottom row first, then up each column.
    XThenY,
    /// Left column first, then across each row.
    YThenX,
}

/// Evaluate a 2-D score model on the grid, producing an (n_y × n_x × 2)
/// vector field.
pub fn score_grid<M: ScoreModel>(model: &M, spec: &GridSpec) -> Result<Array3<f64>> {
    spec.validate()?;
    if model.dim() != 2 {
        return Err(ScoreError::DimensionMismatch {
            expected: 2,
            got: model.dim(),
        });
    }

    let mut points = Array2::zeros((spec.n_y * spec.n_x, 2));
    for iy in 0..spec.n_y {
        for ix in 0..spec.n_x {
            let row = iy * spec.n_x + ix;
            points[[row, 0]] = spec.x(ix);
            points[[row, 1]] = spec.y(iy);
        }
    }

    let scores = model.score(&points);
    let mut field = Array3::zeros((spec.n_y, spec.n_x, 2));
    for iy in 0..spec.n_y {
        for ix in 0..spec.n_x {
            let row = iy * spec.n_x + ix;
            field[[iy, ix, 0]] = scores[[row, 0]];
            field[[iy, ix, 1]] = scores[[row, 1]];
        }
    }
    Ok(field)
}

/// Reconstruct the potential U with the default L-path (x first, then y),
/// seeded with `U[0, 0] = c`.
pub fn integrate_field(field: &Array3<f64>, spec: &GridSpec, c: f64) -> Result<Array2<f64>> {
    integrate_field_along(field, spec, c, PathOrder::XThenY)
}

/// Reconstruct the potential U along the chosen L-path order.
///
/// # Arguments
///
/// * `field` - Vector field sampled on the grid (n_y × n_x × 2)
/// * `spec` - Grid geometry; spacings come from its extents and counts
/// * `c` - Seed value for the first corner, `U[0, 0]`
/// * `order` - Which leg of the L-path is walked first
pub fn integrate_field_along(
    field: &Array3<f64>,
    spec: &GridSpec,
    c: f64,
    order: PathOrder,
) -> Result<Array2<f64>> {
    spec.validate()?;
    let expected = (spec.n_y, spec.n_x, 2);
    if field.dim() != expected {
        return Err(ScoreError::FieldShapeMismatch {
            expected,
            got: field.dim(),
        });
    }

    let hx = spec.hx();
    let hy = spec.hy();
    let mut u = Array2::zeros((spec.n_y, spec.n_x));
    u[[0, 0]] = c;

    match order {
        PathOrder::XThenY => {
            for ix in 1..spec.n_x {
                u[[0, ix]] =
                    u[[0, ix - 1]] + 0.5 * (field[[0, ix, 0]] + field[[0, ix - 1, 0]]) * hx;
            }
            for ix in 0..spec.n_x {
                for iy in 1..spec.n_y {
                    u[[iy, ix]] =
                        u[[iy - 1, ix]] + 0.5 * (field[[iy, ix, 1]] + field[[iy - 1, ix, 1]]) * hy;
                }
            }
        }
        PathOrder::YThenX => {
            for iy in 1..spec.n_y {
                u[[iy, 0]] =
                    u[[iy - 1, 0]] + 0.5 * (field[[iy, 0, 1]] + field[[iy - 1, 0, 1]]) * hy;
            }
            for iy in 0..spec.n_y {
                for ix in 1..spec.n_x {
                    u[[iy, ix]] =
                        u[[iy, ix - 1]] + 0.5 * (field[[iy, ix, 0]] + field[[iy, ix - 1, 0]]) * hx;
                }
            }
        }
    }
    Ok(u)
}

/// Evaluate a score model on the grid and integrate it in one call.
pub fn integrate_score_grid<M: ScoreModel>(
    model: &M,
    spec: &GridSpec,
    c: f64,
) -> Result<Array2<f64>> {
    let field = score_grid(model, spec)?;
    integrate_field(&field, spec, c)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::GaussianScore;
    use approx::assert_relative_eq;
    use ndarray::Array1;

    fn gradient_field<F>(spec: &GridSpec, grad: F) -> Array3<f64>
    where
        F: Fn(f64, f64) -> (f64, f64),
    {
        let mut field = Array3::zeros((spec.n_y, spec.n_x, 2));
        for iy in 0..spec.n_y {
            for ix in 0..spec.n_x {
                let (vx, vy) = grad(spec.x(ix), spec.y(iy));
                field[[iy, ix, 0]] = vx;
                field[[iy, ix, 1]] = vy;
            }
        }
        field
    }

    #[test]
    fn round_trip_paraboloid() {
        // U = x² + y², V = (2x, 2y), seeded with U(−1, −1) = 2.
        let spec = GridSpec::square((-1.0, 1.0), 101);
        let field = gradient_field(&spec, |x, y| (2.0 * x, 2.0 * y));
        let u = integrate_field(&field, &spec, 2.0).unwrap();

        for iy in 0..spec.n_y {
            for ix in 0..spec.n_x {
                let expected = spec.x(ix).powi(2) + spec.y(iy).powi(2);
                assert_relative_eq!(u[[iy, ix]], expected, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn path_independent_on_conservative_field() {
        let spec = GridSpec::square((-1.0, 1.0), 61);
        let field = gradient_field(&spec, |x, y| (2.0 * x + y, x - 3.0 * y * y));
        let a = integrate_field_along(&field, &spec, 0.0, PathOrder::XThenY).unwrap();
        let b = integrate_field_along(&field, &spec, 0.0, PathOrder::YThenX).unwrap();
        let max_diff = (&a - &b).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
        assert!(max_diff < 1e-3, "conservative field disagreed by {max_diff}");
    }

    #[test]
    fn path_dependent_on_rotational_field() {
        // V = (−y, x) has curl 2 everywhere; the two walk orders must
        // visibly disagree, which is the documented approximate-only case.
        let spec = GridSpec::square((-1.0, 1.0), 61);
        let field = gradient_field(&spec, |x, y| (-y, x));
        let a = integrate_field_along(&field, &spec, 0.0, PathOrder::XThenY).unwrap();
        let b = integrate_field_along(&field, &spec, 0.0, PathOrder::YThenX).unwrap();
        let max_diff = (&a - &b).mapv(f64::abs).fold(0.0, |m: f64, &v| m.max(v));
        assert!(max_diff > 0.5, "rotational field should be path-dependent");
    }

    #[test]
    fn gaussian_score_integrates_to_log_density_shape() {
        // For N(0, I), the score integrates to −‖x‖²/2 + const.
        let model = GaussianScore::standard(2);
        let spec = GridSpec::square((-2.0, 2.0), 81);
        let c = -(2.0_f64.powi(2) + 2.0_f64.powi(2)) / 2.0; // U at the corner
        let u = integrate_score_grid(&model, &spec, c).unwrap();

        for iy in (0..spec.n_y).step_by(20) {
            for ix in (0..spec.n_x).step_by(20) {
                let expected = -(spec.x(ix).powi(2) + spec.y(iy).powi(2)) / 2.0;
                assert_relative_eq!(u[[iy, ix]], expected, epsilon = 1e-3);
            }
        }
    }

    #[test]
    fn degenerate_grids_and_shapes_fail_fast() {
        let spec = GridSpec::square((-1.0, 1.0), 1);
        let field = Array3::zeros((1, 1, 2));
        assert_eq!(
            integrate_field(&field, &spec, 0.0),
            Err(ScoreError::DegenerateGrid { n_x: 1, n_y: 1 })
        );

        let spec = GridSpec::square((-1.0, 1.0), 4);
        let wrong = Array3::zeros((3, 4, 2));
        assert_eq!(
            integrate_field(&wrong, &spec, 0.0),
            Err(ScoreError::FieldShapeMismatch {
                expected: (4, 4, 2),
                got: (3, 4, 2)
            })
        );

        let narrow = GaussianScore::new(Array1::zeros(3), 1.0).unwrap();
        assert_eq!(
            score_grid(&narrow, &spec),
            Err(ScoreError::DimensionMismatch { expected: 2, got: 3 })
        );
    }
}
