//! # Allocation Types
//!
//! $$
//! \mathbf{w} \in \Delta^{n-1}, \quad R \in \mathbb{R}_{>0}^{T \times n}
//! $$
//!
//! Shared data model for the allocation search: the aligned return matrix,
//! allocation vectors on the simplex, candidate trades and their scores.

use ndarray::Array1;
use ndarray::Array2;

/// Aligned multiplicative returns, rows = periods, columns = assets.
///
/// Cell `(t, i)` holds `price[t] / price[t - 1]` for asset `i`. Columns are
/// ordered alphabetically by asset identifier and every column has the same
/// number of rows; the cleaning layer guarantees both. Read-only for the
/// duration of an optimization run.
pub type ReturnMatrix = Array2<f64>;

/// Portfolio weights aligned positionally with [`ReturnMatrix`] columns.
///
/// Non-negative, summing to 1.0 within floating-point tolerance. Accepted
/// moves produce a new vector rather than mutating in place, so concurrent
/// workers can evaluate candidates independently.
pub type Allocation = Array1<f64>;

/// A single-pair trade: transfer `step` of weight from `sell` to `buy`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CandidateMove {
  /// Column index of the asset being reduced.
  pub sell: usize,
  /// Column index of the asset being increased.
  pub buy: usize,
  /// Amount of weight transferred.
  pub step: f64,
}

/// Fitness of an allocation under the downside-risk-adjusted score.
///
/// `Infinite` marks the degenerate zero-downside case: no period ever fell
/// below the required return, so the risk ratio is undefined and the
/// allocation is treated as unbeatable. Modeling this as a variant keeps
/// comparisons exact and NaN out of the reduction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Score {
  Finite(f64),
  Infinite,
}

impl Score {
  /// Strict `>` comparison; ties never beat, so the earliest-enumerated
  /// candidate wins a round.
  pub fn beats(&self, other: &Score) -> bool {
    match (self, other) {
      (Score::Infinite, Score::Infinite) => false,
      (Score::Infinite, Score::Finite(_)) => true,
      (Score::Finite(_), Score::Infinite) => false,
      (Score::Finite(a), Score::Finite(b)) => a > b,
    }
  }

  /// Collapse to a plain float at the API boundary.
  pub fn as_f64(&self) -> f64 {
    match self {
      Score::Finite(v) => *v,
      Score::Infinite => f64::INFINITY,
    }
  }
}

/// A candidate allocation together with its score, produced by one worker
/// and consumed by the round reduction.
#[derive(Clone, Debug)]
pub struct ScoredCandidate {
  pub score: Score,
  pub allocation: Allocation,
}
