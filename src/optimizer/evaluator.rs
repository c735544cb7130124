//! # Round Evaluator
//!
//! $$
//! \mathbf{w}^\dagger = \arg\max_{m \in \mathcal{M}} S(\mathbf{w} + m)
//! $$
//!
//! Parallel scoring of one round's candidate moves and the deterministic
//! reduction to the round winner.

use rayon::prelude::*;
use tracing::warn;

use super::moves::apply_move;
use super::scorer::score_allocation;
use crate::error::OptimizeError;
use crate::error::Result;
use crate::types::Allocation;
use crate::types::CandidateMove;
use crate::types::ReturnMatrix;
use crate::types::ScoredCandidate;

/// Scores a full round of candidate moves and picks the winner.
///
/// The search loop only depends on this trait, so control-flow tests can
/// inject a scripted evaluator instead of a thread pool.
pub trait RoundEvaluator {
  fn evaluate_round(
    &self,
    matrix: &ReturnMatrix,
    base: &Allocation,
    moves: &[CandidateMove],
    required_return: f64,
  ) -> Result<ScoredCandidate>;
}

/// Rayon-backed evaluator holding one thread pool for the whole run.
///
/// The pool is built once per optimization run and reused across every
/// round; the return matrix is shared by reference into the workers, which
/// are stateless with respect to accepted allocations.
pub struct RayonEvaluator {
  pool: rayon::ThreadPool,
  downside_correlation: bool,
}

impl RayonEvaluator {
  pub fn new(threads: Option<usize>, downside_correlation: bool) -> Result<Self> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(threads) = threads {
      builder = builder.num_threads(threads);
    }
    let pool = builder.build()?;

    Ok(Self {
      pool,
      downside_correlation,
    })
  }
}

impl RoundEvaluator for RayonEvaluator {
  fn evaluate_round(
    &self,
    matrix: &ReturnMatrix,
    base: &Allocation,
    moves: &[CandidateMove],
    required_return: f64,
  ) -> Result<ScoredCandidate> {
    let downside_correlation = self.downside_correlation;

    // All results are collected before reducing; picking the winner by
    // completion order would make ties racy.
    let scored: Vec<Option<ScoredCandidate>> = self.pool.install(|| {
      moves
        .par_iter()
        .map(|mv| {
          let candidate = apply_move(base, mv);
          score_allocation(matrix, &candidate, required_return, downside_correlation).map(
            |score| ScoredCandidate {
              score,
              allocation: candidate,
            },
          )
        })
        .collect()
    });

    reduce_round(scored)
  }
}

/// Reduce collected candidate scores to the round winner.
///
/// Iterates in enumeration order with a strict `>` comparison, so equal
/// scores keep the earliest `(sell, buy)` pair no matter which worker
/// finished first. Unscorable candidates are excluded; if every candidate is
/// excluded the round cannot decide accept-vs-halve and fails as a whole.
pub fn reduce_round(scored: Vec<Option<ScoredCandidate>>) -> Result<ScoredCandidate> {
  let total = scored.len();
  let mut best: Option<ScoredCandidate> = None;
  let mut excluded = 0usize;

  for candidate in scored {
    match candidate {
      None => excluded += 1,
      Some(candidate) => {
        let improves = match &best {
          None => true,
          Some(b) => candidate.score.beats(&b.score),
        };
        if improves {
          best = Some(candidate);
        }
      }
    }
  }

  if excluded > 0 {
    warn!(excluded, total, "excluded unscorable candidates from round");
  }

  best.ok_or(OptimizeError::RoundFailure)
}
