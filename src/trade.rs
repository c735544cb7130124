//! # Trade Ranking
//!
//! $$
//! \rho\left(R\,\mathbf{w}_{\text{post}},\; R\,\mathbf{w}_{\text{target}}\right)
//! $$
//!
//! Rebalancing recommendations from an actual allocation toward the
//! optimizer's target: overweight tickers are candidate sells, underweight
//! ones candidate buys, and every feasible pair is ranked by how closely the
//! post-trade portfolio's recent return series tracks the target portfolio.

use std::collections::BTreeMap;

use ndarray::Array1;

use crate::error::OptimizeError;
use crate::error::Result;
use crate::optimizer::scorer::pearson;
use crate::types::Allocation;
use crate::types::ReturnMatrix;

/// Weight below which an over/underweight is not worth trading.
const MIN_TRADE_WEIGHT: f64 = 1e-6;

/// One recommended rebalancing trade.
#[derive(Clone, Debug)]
pub struct TradeCandidate {
  /// Correlation of the post-trade portfolio's returns with the target
  /// portfolio's returns over the recent window.
  pub correlation: f64,
  pub sell: String,
  pub buy: String,
  /// Weight transferred: the lesser of the sell's overweight and the buy's
  /// underweight.
  pub amount: f64,
}

/// Replay an allocation map against a return matrix, yielding the per-period
/// portfolio return series.
pub fn allocation_returns(
  allocation_map: &BTreeMap<String, f64>,
  tickers: &[String],
  matrix: &ReturnMatrix,
) -> Array1<f64> {
  matrix.dot(&aligned_weights(allocation_map, tickers))
}

fn aligned_weights(allocation_map: &BTreeMap<String, f64>, tickers: &[String]) -> Allocation {
  Array1::from_iter(
    tickers
      .iter()
      .map(|t| allocation_map.get(t).copied().unwrap_or(0.0)),
  )
}

/// Rank every feasible rebalancing trade from `actual` toward `target`.
///
/// Results are sorted by correlation, descending; equal correlations keep
/// `(sell, buy)` enumeration order. The recent matrix must share its column
/// order with `tickers`.
pub fn rank_trades(
  target: &BTreeMap<String, f64>,
  actual: &BTreeMap<String, f64>,
  tickers: &[String],
  recent: &ReturnMatrix,
) -> Result<Vec<TradeCandidate>> {
  if recent.ncols() != tickers.len() {
    return Err(OptimizeError::InvalidInput(format!(
      "recent matrix has {} columns for {} tickers",
      recent.ncols(),
      tickers.len()
    )));
  }
  if recent.nrows() < 2 {
    return Err(OptimizeError::InvalidInput(
      "recent matrix needs at least 2 periods to correlate".into(),
    ));
  }

  let target_w = aligned_weights(target, tickers);
  let actual_w = aligned_weights(actual, tickers);
  let target_returns = recent.dot(&target_w);

  let overweight: Vec<(usize, f64)> = tickers
    .iter()
    .enumerate()
    .map(|(i, _)| (i, actual_w[i] - target_w[i]))
    .filter(|(_, d)| *d > MIN_TRADE_WEIGHT)
    .collect();
  let underweight: Vec<(usize, f64)> = tickers
    .iter()
    .enumerate()
    .map(|(i, _)| (i, target_w[i] - actual_w[i]))
    .filter(|(_, d)| *d > MIN_TRADE_WEIGHT)
    .collect();

  let mut candidates = Vec::with_capacity(overweight.len() * underweight.len());
  for &(sell, over) in &overweight {
    for &(buy, under) in &underweight {
      let amount = over.min(under);
      let mut post = actual_w.clone();
      post[sell] -= amount;
      post[buy] += amount;

      let post_returns = recent.dot(&post);
      let correlation = pearson(&post_returns.view(), &target_returns.view());

      candidates.push(TradeCandidate {
        correlation,
        sell: tickers[sell].clone(),
        buy: tickers[buy].clone(),
        amount,
      });
    }
  }

  // Stable sort keeps enumeration order for equal correlations.
  candidates.sort_by(|a, b| {
    b.correlation
      .partial_cmp(&a.correlation)
      .unwrap_or(std::cmp::Ordering::Equal)
  });

  Ok(candidates)
}
