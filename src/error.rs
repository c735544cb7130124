//! Error types for the allocation pipeline.

use thiserror::Error;

/// Failures surfaced by the optimizer, cleaning and cache layers.
#[derive(Error, Debug)]
pub enum OptimizeError {
  /// A structural invariant was violated before any work started: empty
  /// asset universe, too few periods, a non-positive or non-finite required
  /// return, or mismatched dimensions.
  #[error("invalid input: {0}")]
  InvalidInput(String),

  /// Every candidate in a search round failed to produce a valid score, so
  /// the accept/halve decision cannot be made. Recovered by the search loop,
  /// which keeps the best allocation from a prior round.
  #[error("no candidate in the round produced a valid score")]
  RoundFailure,

  #[error("worker pool: {0}")]
  Pool(#[from] rayon::ThreadPoolBuildError),

  #[error("I/O error: {0}")]
  Io(#[from] std::io::Error),

  #[error("malformed cache entry: {0}")]
  MalformedCache(String),

  #[error("date parse error: {0}")]
  DateParse(#[from] chrono::ParseError),
}

/// Result type alias for this crate.
pub type Result<T> = std::result::Result<T, OptimizeError>;
