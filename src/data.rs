//! # Data
//!
//! Price-history plumbing around the optimizer: the on-disk cache and the
//! cleaning step that turns raw histories into the aligned return matrix.

pub mod cache;
pub mod clean;

pub use cache::CacheStatus;
pub use cache::RefreshPolicy;
pub use cache::load_series;
pub use cache::load_universe;
pub use cache::partition_by_freshness;
pub use cache::store_series;
pub use clean::PriceSeries;
pub use clean::build_return_matrix;
