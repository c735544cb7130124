//! # Optimizer
//!
//! $$
//! \mathbf{w}^\* = \arg\max_{\mathbf{w} \in \Delta^{n-1}}
//! \frac{\bar r_g(\mathbf{w}) - r^\*}{\sigma_d(\mathbf{w})}
//! $$
//!
//! Parallel multi-scale local search for a downside-risk-adjusted optimal
//! allocation.

pub mod evaluator;
pub mod moves;
pub mod scorer;
pub mod search;

pub use evaluator::RayonEvaluator;
pub use evaluator::RoundEvaluator;
pub use evaluator::reduce_round;
pub use moves::apply_move;
pub use moves::generate_moves;
pub use scorer::MIN_PENALTY_SAMPLES;
pub use scorer::score_allocation;
pub use search::INITIAL_TRADE_STEP;
pub use search::MIN_TRADE_STEP;
pub use search::Optimization;
pub use search::OptimizerConfig;
pub use search::find_optimal_allocation;
pub use search::find_optimal_allocation_cancellable;
pub use search::search_with_evaluator;
