//! # Price Cleaning
//!
//! $$
//! R_{t,i} = \frac{p_{t,i}}{p_{t-1,i}}
//! $$
//!
//! Conversion of raw per-ticker price histories into the aligned return
//! matrix the optimizer consumes: drop observations on or after the
//! evaluation date, drop tickers with too little history, intersect the
//! survivors' date sets so no row is ragged, and take consecutive price
//! ratios.

use std::collections::BTreeMap;
use std::collections::BTreeSet;

use chrono::NaiveDate;
use ndarray::Array2;
use tracing::debug;

use crate::error::OptimizeError;
use crate::error::Result;
use crate::types::ReturnMatrix;

/// Dated close prices for one ticker; the map keeps dates ordered.
pub type PriceSeries = BTreeMap<NaiveDate, f64>;

/// Build the aligned return matrix for an evaluation date.
///
/// Tickers come out alphabetically ordered, matching the matrix columns.
/// Only dates strictly before `end_date` are used, and a ticker must retain
/// at least `required_days` observations to stay in the universe.
pub fn build_return_matrix(
  histories: &BTreeMap<String, PriceSeries>,
  required_days: usize,
  end_date: NaiveDate,
) -> Result<(Vec<String>, ReturnMatrix)> {
  let mut filtered: BTreeMap<&str, BTreeMap<&NaiveDate, f64>> = BTreeMap::new();
  for (ticker, series) in histories {
    let past: BTreeMap<&NaiveDate, f64> = series
      .iter()
      .filter(|(date, _)| **date < end_date)
      .map(|(date, price)| (date, *price))
      .collect();
    if past.len() >= required_days {
      filtered.insert(ticker, past);
    } else {
      debug!(ticker = %ticker, days = past.len(), required_days, "dropping ticker");
    }
  }

  if filtered.is_empty() {
    return Err(OptimizeError::InvalidInput(
      "no ticker has enough history before the evaluation date".into(),
    ));
  }

  // Keep only dates where every surviving ticker has an observation.
  let mut common: Option<BTreeSet<&NaiveDate>> = None;
  for series in filtered.values() {
    let dates: BTreeSet<&NaiveDate> = series.keys().copied().collect();
    common = Some(match common {
      None => dates,
      Some(acc) => acc.intersection(&dates).copied().collect(),
    });
  }
  let common = common.unwrap_or_default();

  if common.len() < 2 {
    return Err(OptimizeError::InvalidInput(format!(
      "only {} common trading dates across the universe",
      common.len()
    )));
  }

  let tickers: Vec<String> = filtered.keys().map(|t| t.to_string()).collect();
  let dates: Vec<&NaiveDate> = common.into_iter().collect();
  let n_periods = dates.len() - 1;

  let mut matrix = Array2::zeros((n_periods, tickers.len()));
  for (col, series) in filtered.values().enumerate() {
    for t in 1..dates.len() {
      matrix[[t - 1, col]] = series[dates[t]] / series[dates[t - 1]];
    }
  }

  debug!(
    tickers = tickers.len(),
    periods = n_periods,
    "built return matrix"
  );

  Ok((tickers, matrix))
}
