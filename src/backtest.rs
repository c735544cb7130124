//! # Backtest Replay
//!
//! $$
//! \text{Sortino} = \frac{\bar r_g - r^\*}{\sigma_d}
//! $$
//!
//! Replays a dated allocation schedule over a return matrix. Between
//! rebalance points weights drift with realized returns; on a rebalance row
//! they snap to the scheduled allocation. The replayed return series is
//! summarized as excess return, downside risk and Sortino ratio.

use tracing::debug;

use crate::error::OptimizeError;
use crate::error::Result;
use crate::types::Allocation;
use crate::types::ReturnMatrix;

/// Summary statistics of one replay.
#[derive(Clone, Debug)]
pub struct BacktestReport {
  /// Geometric mean per-period portfolio return.
  pub mean_return: f64,
  /// `mean_return - required_return`.
  pub excess_return: f64,
  /// Semi-deviation of below-target periods, over all periods.
  pub downside_risk: f64,
  /// `excess_return / downside_risk`; infinite when nothing fell below
  /// target and the excess is positive.
  pub sortino: f64,
  /// Replayed per-period portfolio returns.
  pub returns: Vec<f64>,
}

/// Replay `schedule` (row index at which each allocation takes effect,
/// ascending, starting at row 0) over the matrix.
pub fn replay_schedule(
  schedule: &[(usize, Allocation)],
  matrix: &ReturnMatrix,
  required_return: f64,
) -> Result<BacktestReport> {
  if matrix.nrows() < 2 || matrix.ncols() == 0 {
    return Err(OptimizeError::InvalidInput(
      "backtest needs at least 2 periods and 1 asset".into(),
    ));
  }
  if schedule.first().map(|(row, _)| *row) != Some(0) {
    return Err(OptimizeError::InvalidInput(
      "allocation schedule must be non-empty and start at row 0".into(),
    ));
  }
  for window in schedule.windows(2) {
    if window[1].0 <= window[0].0 {
      return Err(OptimizeError::InvalidInput(
        "allocation schedule rows must be strictly ascending".into(),
      ));
    }
  }
  if schedule.iter().any(|(row, allocation)| {
    *row >= matrix.nrows() || allocation.len() != matrix.ncols()
  }) {
    return Err(OptimizeError::InvalidInput(
      "allocation schedule does not fit the return matrix".into(),
    ));
  }

  let mut weights = schedule[0].1.clone();
  let mut next_rebalance = 1;
  let mut returns = Vec::with_capacity(matrix.nrows());

  for t in 0..matrix.nrows() {
    if next_rebalance < schedule.len() && schedule[next_rebalance].0 == t {
      weights = schedule[next_rebalance].1.clone();
      next_rebalance += 1;
    }

    let row = matrix.row(t);
    let r = weights.dot(&row);
    returns.push(r);

    if r > 0.0 {
      // Holdings drift with realized returns until the next rebalance.
      weights = &weights * &row.mapv(|x| x / r);
    }
  }

  if returns.iter().any(|&r| !r.is_finite() || r <= 0.0) {
    return Err(OptimizeError::InvalidInput(
      "replay produced a non-positive portfolio return".into(),
    ));
  }

  let mean_return =
    (returns.iter().map(|r| r.ln()).sum::<f64>() / returns.len() as f64).exp();
  let excess_return = mean_return - required_return;
  let downside_risk = (returns
    .iter()
    .map(|r| (r - required_return).min(0.0).powi(2))
    .sum::<f64>()
    / returns.len() as f64)
    .sqrt();

  let sortino = if downside_risk > 0.0 {
    excess_return / downside_risk
  } else if excess_return > 0.0 {
    f64::INFINITY
  } else {
    0.0
  };

  debug!(
    periods = returns.len(),
    mean_return, excess_return, downside_risk, "replayed schedule"
  );

  Ok(BacktestReport {
    mean_return,
    excess_return,
    downside_risk,
    sortino,
    returns,
  })
}
