//! # sortino-rs
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w} \in \Delta^{n-1}}
//! \frac{\bar r_g(\mathbf{w}) - r^\*}{\sigma_d(\mathbf{w})}
//! $$
//!
//! Downside-risk-adjusted portfolio allocation. The core is a parallel
//! multi-scale local search over single-pair trades on a historical return
//! matrix, maximizing a Sortino-style score subject to a required minimum
//! return. Around it: an on-disk price cache, cleaning of raw histories into
//! the aligned return matrix, ranked rebalancing trades toward the optimized
//! target, and a backtest replay.

pub mod backtest;
pub mod data;
pub mod error;
pub mod optimizer;
pub mod trade;
pub mod types;

pub use backtest::BacktestReport;
pub use backtest::replay_schedule;
pub use data::PriceSeries;
pub use data::RefreshPolicy;
pub use data::build_return_matrix;
pub use error::OptimizeError;
pub use error::Result;
pub use optimizer::Optimization;
pub use optimizer::OptimizerConfig;
pub use optimizer::find_optimal_allocation;
pub use optimizer::find_optimal_allocation_cancellable;
pub use trade::TradeCandidate;
pub use trade::rank_trades;
pub use types::Allocation;
pub use types::CandidateMove;
pub use types::ReturnMatrix;
pub use types::Score;
pub use types::ScoredCandidate;

/// Trading days per year, used to convert annualized targets to per-period.
pub const TRADING_DAYS_PER_YEAR: u32 = 252;

/// Convert an annualized multiplicative target into the per-period required
/// return the optimizer consumes.
pub fn per_period_return(annual_target: f64) -> f64 {
  annual_target.powf(1.0 / TRADING_DAYS_PER_YEAR as f64)
}
