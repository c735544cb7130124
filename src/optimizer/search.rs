//! # Multi-Scale Allocation Search
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w} \in \Delta^{n-1}} S(\mathbf{w})
//! $$
//!
//! Coarse-to-fine local search over single-pair trades. Starting from 100%
//! in the first asset, each round scores every feasible trade at the current
//! step size in parallel; an improving round moves the base point, a
//! stagnant round halves the step, and the search stops once the step falls
//! below the minimum granularity. The best score is monotonically
//! non-decreasing across the whole run.

use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use ndarray::Array1;
use tracing::debug;
use tracing::info;
use tracing::warn;

use super::evaluator::RayonEvaluator;
use super::evaluator::RoundEvaluator;
use super::moves::generate_moves;
use super::scorer::score_allocation;
use crate::error::OptimizeError;
use crate::error::Result;
use crate::types::Allocation;
use crate::types::ReturnMatrix;

/// Coarsest trade: move the entire allocation in one step.
pub const INITIAL_TRADE_STEP: f64 = 1.0;

/// Finest trade granularity; the search stops below this.
pub const MIN_TRADE_STEP: f64 = 1.0 / 1024.0;

/// Tuning knobs for one optimization run.
#[derive(Clone, Debug)]
pub struct OptimizerConfig {
  /// Required per-period multiplicative return. Annualized targets must be
  /// converted via `annual.powf(1.0 / periods_per_year)` before calling in.
  pub required_return: f64,
  /// Scale downside risk by the allocation's downside correlation exposure.
  pub downside_correlation: bool,
  /// Worker threads; `None` lets rayon pick.
  pub threads: Option<usize>,
  /// Stop once the trade step falls below this.
  pub min_step: f64,
}

impl Default for OptimizerConfig {
  fn default() -> Self {
    Self {
      required_return: 1.0,
      downside_correlation: true,
      threads: None,
      min_step: MIN_TRADE_STEP,
    }
  }
}

/// Result of a completed search.
#[derive(Clone, Debug)]
pub struct Optimization {
  /// Best score found; `f64::INFINITY` when no period fell below target.
  pub score: f64,
  /// Best allocation found, aligned with the matrix columns.
  pub weights: Allocation,
  /// Search rounds executed.
  pub rounds: usize,
  /// Improving moves accepted.
  pub accepted_moves: usize,
}

fn validate_inputs(matrix: &ReturnMatrix, config: &OptimizerConfig) -> Result<()> {
  if matrix.ncols() == 0 {
    return Err(OptimizeError::InvalidInput(
      "return matrix has no assets".into(),
    ));
  }
  if matrix.nrows() < 2 {
    return Err(OptimizeError::InvalidInput(format!(
      "return matrix needs at least 2 periods, got {}",
      matrix.nrows()
    )));
  }
  if !config.required_return.is_finite() || config.required_return <= 0.0 {
    return Err(OptimizeError::InvalidInput(format!(
      "required return must be finite and positive, got {}",
      config.required_return
    )));
  }
  if !(config.min_step > 0.0 && config.min_step <= INITIAL_TRADE_STEP) {
    return Err(OptimizeError::InvalidInput(format!(
      "minimum step must be in (0, {INITIAL_TRADE_STEP}], got {}",
      config.min_step
    )));
  }

  Ok(())
}

/// Search for the best allocation using a rayon worker pool.
///
/// The pool is created once for the run and reused by every round. Returns
/// the best `(score, weights)` found, or `InvalidInput` before any worker is
/// spawned when the matrix or configuration is unusable.
pub fn find_optimal_allocation(
  matrix: &ReturnMatrix,
  config: &OptimizerConfig,
) -> Result<Optimization> {
  validate_inputs(matrix, config)?;
  let evaluator = RayonEvaluator::new(config.threads, config.downside_correlation)?;
  search_with_evaluator(matrix, config, &evaluator, None)
}

/// Like [`find_optimal_allocation`], checking `cancel` at the top of every
/// round. A cancelled search returns the best allocation found so far.
pub fn find_optimal_allocation_cancellable(
  matrix: &ReturnMatrix,
  config: &OptimizerConfig,
  cancel: &AtomicBool,
) -> Result<Optimization> {
  validate_inputs(matrix, config)?;
  let evaluator = RayonEvaluator::new(config.threads, config.downside_correlation)?;
  search_with_evaluator(matrix, config, &evaluator, Some(cancel))
}

/// Core search loop over an injected evaluator.
///
/// The only state is `(step, current, current_score)`. Exposed so the
/// control flow can be unit-tested with a scripted evaluator.
pub fn search_with_evaluator(
  matrix: &ReturnMatrix,
  config: &OptimizerConfig,
  evaluator: &dyn RoundEvaluator,
  cancel: Option<&AtomicBool>,
) -> Result<Optimization> {
  validate_inputs(matrix, config)?;

  let mut current = seed_allocation(matrix.ncols());
  let mut current_score =
    score_allocation(matrix, &current, config.required_return, config.downside_correlation)
      .ok_or_else(|| {
        OptimizeError::InvalidInput("seed allocation produced an unscorable portfolio".into())
      })?;

  let mut step = INITIAL_TRADE_STEP;
  let mut rounds = 0usize;
  let mut accepted_moves = 0usize;

  while step >= config.min_step {
    if cancel.is_some_and(|c| c.load(Ordering::Relaxed)) {
      info!(rounds, "search cancelled, returning best allocation so far");
      break;
    }

    rounds += 1;
    let moves = generate_moves(&current, step);
    if moves.is_empty() {
      step /= 2.0;
      continue;
    }

    match evaluator.evaluate_round(matrix, &current, &moves, config.required_return) {
      Ok(best) => {
        if best.score.beats(&current_score) {
          current = best.allocation;
          current_score = best.score;
          accepted_moves += 1;
          debug!(step, score = current_score.as_f64(), "accepted trade");
        } else {
          step /= 2.0;
          debug!(step, "no improving trade, refining step");
        }
      }
      Err(OptimizeError::RoundFailure) => {
        warn!(
          rounds,
          "round produced no valid candidate, keeping best allocation so far"
        );
        break;
      }
      Err(e) => return Err(e),
    }
  }

  info!(
    rounds,
    accepted_moves,
    score = current_score.as_f64(),
    "search converged"
  );

  Ok(Optimization {
    score: current_score.as_f64(),
    weights: current,
    rounds,
    accepted_moves,
  })
}

fn seed_allocation(n_assets: usize) -> Allocation {
  let mut seed = Array1::zeros(n_assets);
  seed[0] = 1.0;
  seed
}

#[cfg(test)]
mod tests {
  use std::sync::Mutex;

  use ndarray::arr1;
  use ndarray::arr2;
  use tracing_test::traced_test;

  use super::*;
  use crate::types::CandidateMove;
  use crate::types::Score;
  use crate::types::ScoredCandidate;

  /// Scripted evaluator: pops one pre-built outcome per round, then keeps
  /// reporting a hopeless candidate so the step halves down to termination.
  struct ScriptedEvaluator {
    script: Mutex<Vec<Result<ScoredCandidate>>>,
  }

  impl ScriptedEvaluator {
    fn new(mut outcomes: Vec<Result<ScoredCandidate>>) -> Self {
      outcomes.reverse();
      Self {
        script: Mutex::new(outcomes),
      }
    }
  }

  impl RoundEvaluator for ScriptedEvaluator {
    fn evaluate_round(
      &self,
      _matrix: &ReturnMatrix,
      base: &Allocation,
      _moves: &[CandidateMove],
      _required_return: f64,
    ) -> Result<ScoredCandidate> {
      self.script.lock().unwrap().pop().unwrap_or_else(|| {
        Ok(ScoredCandidate {
          score: Score::Finite(f64::MIN),
          allocation: base.clone(),
        })
      })
    }
  }

  fn two_asset_matrix() -> ReturnMatrix {
    arr2(&[
      [1.0507, 1.0245],
      [0.9733, 0.9895],
      [0.9793, 0.9846],
      [0.9843, 0.9987],
      [0.9839, 0.9886],
      [0.9993, 1.0013],
      [0.9794, 0.9915],
      [0.9818, 0.9861],
      [0.9976, 0.9986],
      [1.0061, 1.0157],
    ])
  }

  fn config(required_return: f64) -> OptimizerConfig {
    OptimizerConfig {
      required_return,
      downside_correlation: true,
      threads: Some(2),
      min_step: MIN_TRADE_STEP,
    }
  }

  #[test]
  fn rejects_empty_universe() {
    let matrix = ReturnMatrix::zeros((5, 0));
    let err = find_optimal_allocation(&matrix, &config(1.0)).unwrap_err();
    assert!(matches!(err, OptimizeError::InvalidInput(_)));
  }

  #[test]
  fn rejects_single_period() {
    let matrix = arr2(&[[1.01, 1.02]]);
    let err = find_optimal_allocation(&matrix, &config(1.0)).unwrap_err();
    assert!(matches!(err, OptimizeError::InvalidInput(_)));
  }

  #[test]
  fn rejects_bad_required_return() {
    let matrix = two_asset_matrix();
    for bad in [0.0, -1.0, f64::NAN, f64::INFINITY] {
      let err = find_optimal_allocation(&matrix, &config(bad)).unwrap_err();
      assert!(matches!(err, OptimizeError::InvalidInput(_)));
    }
  }

  #[test]
  fn stagnant_search_terminates_after_all_scales() {
    let matrix = two_asset_matrix();
    let evaluator = ScriptedEvaluator::new(Vec::new());

    let result = search_with_evaluator(&matrix, &config(0.9950), &evaluator, None).unwrap();
    // Steps 1, 1/2, ..., 1/1024: eleven scales, no accepted moves.
    assert_eq!(result.rounds, 11);
    assert_eq!(result.accepted_moves, 0);
    assert_eq!(result.weights, arr1(&[1.0, 0.0]));
  }

  #[test]
  fn accepted_moves_keep_score_monotone() {
    let matrix = two_asset_matrix();
    let seed_score =
      score_allocation(&matrix, &arr1(&[1.0, 0.0]), 0.9950, true).unwrap();

    let improving = ScoredCandidate {
      score: Score::Finite(seed_score.as_f64() + 1.0),
      allocation: arr1(&[0.5, 0.5]),
    };
    let evaluator = ScriptedEvaluator::new(vec![Ok(improving.clone())]);

    let result = search_with_evaluator(&matrix, &config(0.9950), &evaluator, None).unwrap();
    assert_eq!(result.accepted_moves, 1);
    assert!(result.score >= seed_score.as_f64());
    assert_eq!(result.weights, improving.allocation);
  }

  #[test]
  #[traced_test]
  fn round_failure_keeps_prior_best() {
    let matrix = two_asset_matrix();
    let improving = ScoredCandidate {
      score: Score::Finite(1e6),
      allocation: arr1(&[0.5, 0.5]),
    };
    let evaluator = ScriptedEvaluator::new(vec![
      Ok(improving.clone()),
      Err(OptimizeError::RoundFailure),
    ]);

    let result = search_with_evaluator(&matrix, &config(0.9950), &evaluator, None).unwrap();
    assert_eq!(result.weights, improving.allocation);
    assert_eq!(result.score, 1e6);
    assert!(logs_contain("no valid candidate"));
  }

  #[test]
  fn cancellation_stops_between_rounds() {
    let matrix = two_asset_matrix();
    let cancel = AtomicBool::new(true);
    let evaluator = ScriptedEvaluator::new(Vec::new());

    let result =
      search_with_evaluator(&matrix, &config(0.9950), &evaluator, Some(&cancel)).unwrap();
    assert_eq!(result.rounds, 0);
    assert_eq!(result.weights, arr1(&[1.0, 0.0]));
  }

  #[test]
  fn full_search_improves_on_seed_and_stays_on_simplex() {
    let matrix = two_asset_matrix();
    let seed_score =
      score_allocation(&matrix, &arr1(&[1.0, 0.0]), 0.9950, true).unwrap();

    let result = find_optimal_allocation(&matrix, &config(0.9950)).unwrap();
    assert!(result.score >= seed_score.as_f64());
    assert!((result.weights.sum() - 1.0).abs() < 1e-9);
    assert!(result.weights.iter().all(|&w| w >= 0.0));
  }

  /// Records every base allocation the loop submits for evaluation. A new
  /// base only appears after an accepted trade, so the log covers each
  /// intermediate allocation the search moved through.
  struct TrackingEvaluator {
    inner: RayonEvaluator,
    bases: Mutex<Vec<Allocation>>,
  }

  impl RoundEvaluator for TrackingEvaluator {
    fn evaluate_round(
      &self,
      matrix: &ReturnMatrix,
      base: &Allocation,
      moves: &[CandidateMove],
      required_return: f64,
    ) -> Result<ScoredCandidate> {
      self.bases.lock().unwrap().push(base.clone());
      self.inner.evaluate_round(matrix, base, moves, required_return)
    }
  }

  #[test]
  fn every_intermediate_allocation_stays_on_simplex() {
    let matrix = two_asset_matrix();
    let evaluator = TrackingEvaluator {
      inner: RayonEvaluator::new(Some(2), true).unwrap(),
      bases: Mutex::new(Vec::new()),
    };

    let result = search_with_evaluator(&matrix, &config(0.9950), &evaluator, None).unwrap();
    assert!(result.accepted_moves >= 1);

    let bases = evaluator.bases.lock().unwrap();
    assert_eq!(bases.len(), result.rounds);
    for base in bases.iter() {
      assert!((base.sum() - 1.0).abs() < 1e-9);
      assert!(base.iter().all(|&w| w >= 0.0));
    }
  }

  #[test]
  fn full_search_is_reproducible() {
    let matrix = two_asset_matrix();

    let a = find_optimal_allocation(&matrix, &config(0.9950)).unwrap();
    let b = find_optimal_allocation(&matrix, &config(0.9950)).unwrap();
    assert_eq!(a.score.to_bits(), b.score.to_bits());
    assert_eq!(a.weights, b.weights);
  }
}
