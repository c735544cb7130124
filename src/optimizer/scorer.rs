//! # Allocation Scorer
//!
//! $$
//! S(\mathbf{w}) = \frac{\bar r_g - r^\*}{\sigma_d \cdot \mathbf{w}^\top C_d \mathbf{w}}
//! $$
//!
//! Downside-risk-adjusted fitness of an allocation: geometric mean excess
//! return over the required return, divided by the semi-deviation of
//! below-target periods, optionally scaled by the allocation's exposure to
//! correlated downside co-movement.

use ndarray::Array1;
use ndarray::ArrayView1;
use ndarray::Axis;

use crate::types::Allocation;
use crate::types::ReturnMatrix;
use crate::types::Score;

/// Minimum number of below-target periods required before the downside
/// correlation matrix is considered usable. Smaller samples degrade the
/// penalty to 1 instead of propagating an ill-conditioned correlation.
pub const MIN_PENALTY_SAMPLES: usize = 3;

fn geometric_mean(xs: &Array1<f64>) -> f64 {
  (xs.mapv(f64::ln).sum() / xs.len() as f64).exp()
}

pub(crate) fn pearson(x: &ArrayView1<f64>, y: &ArrayView1<f64>) -> f64 {
  let n = x.len();
  if n < 2 {
    return 0.0;
  }

  let mx = x.sum() / n as f64;
  let my = y.sum() / n as f64;

  let mut cov = 0.0;
  let mut sx = 0.0;
  let mut sy = 0.0;

  for i in 0..n {
    let dx = x[i] - mx;
    let dy = y[i] - my;
    cov += dx * dy;
    sx += dx * dx;
    sy += dy * dy;
  }

  let denom = (sx * sy).sqrt();
  if denom < 1e-15 {
    0.0
  } else {
    (cov / denom).clamp(-1.0, 1.0)
  }
}

/// Exposure of the allocation to correlated downside co-movement:
/// `w' C w` where `C` is the Pearson correlation matrix of asset returns
/// restricted to the periods where the portfolio fell below target.
fn downside_correlation_penalty(
  matrix: &ReturnMatrix,
  allocation: &Allocation,
  portfolio: &Array1<f64>,
  required_return: f64,
) -> f64 {
  let below: Vec<usize> = portfolio
    .iter()
    .enumerate()
    .filter(|(_, &r)| r < required_return)
    .map(|(t, _)| t)
    .collect();

  if below.len() < MIN_PENALTY_SAMPLES {
    return 1.0;
  }

  let sub = matrix.select(Axis(0), &below);
  let n_assets = sub.ncols();

  let mut penalty = 0.0;
  for i in 0..n_assets {
    for j in 0..n_assets {
      let c_ij = if i == j {
        1.0
      } else {
        pearson(&sub.column(i), &sub.column(j))
      };
      penalty += allocation[i] * c_ij * allocation[j];
    }
  }

  if penalty.is_finite() && penalty > 1e-15 {
    penalty
  } else {
    1.0
  }
}

/// Score an allocation against the return matrix and required per-period
/// return.
///
/// Returns `None` when the candidate cannot be scored at all (a non-positive
/// or non-finite portfolio return makes the geometric mean undefined); the
/// round reduction excludes such candidates instead of comparing NaN.
///
/// The shortfall branch is a correctness rule, not an optimization: when the
/// geometric mean falls below the required return, the raw shortfall is
/// returned directly. Computing the risk ratio there would divide a negative
/// excess by a small semi-deviation and reward stagnant allocations.
pub fn score_allocation(
  matrix: &ReturnMatrix,
  allocation: &Allocation,
  required_return: f64,
  downside_correlation: bool,
) -> Option<Score> {
  let portfolio = matrix.dot(allocation);
  if portfolio.iter().any(|&r| !r.is_finite() || r <= 0.0) {
    return None;
  }

  let mean_return = geometric_mean(&portfolio);
  if !mean_return.is_finite() {
    return None;
  }

  if mean_return < required_return {
    return Some(Score::Finite(mean_return - required_return));
  }

  let shortfalls = portfolio.mapv(|r| (r - required_return).min(0.0));
  let downside_risk = (shortfalls.mapv(|d| d * d).sum() / shortfalls.len() as f64).sqrt();

  if downside_risk == 0.0 {
    return Some(Score::Infinite);
  }

  let mut denom = downside_risk;
  if downside_correlation {
    denom *= downside_correlation_penalty(matrix, allocation, &portfolio, required_return);
  }

  let score = (mean_return - required_return) / denom;
  if score.is_finite() {
    Some(Score::Finite(score))
  } else {
    None
  }
}
