//! On-disk price cache.
//!
//! One CSV file per ticker (`<TICKER>.csv`, `date,close` rows) under a cache
//! directory. Remote refresh belongs to the data-gathering collaborator;
//! this layer loads, stores, and decides which tickers are stale enough to
//! hand back for refreshing.

use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use std::time::SystemTime;

use chrono::NaiveDate;
use tracing::debug;

use super::clean::PriceSeries;
use crate::error::OptimizeError;
use crate::error::Result;

/// Which cached tickers should be re-fetched.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RefreshPolicy {
  /// Refresh tickers whose cache file is missing or older than the max age.
  Outdated,
  /// Trust every existing cache file; only missing tickers are stale.
  Never,
  /// Refresh everything.
  All,
}

/// Partition of a requested universe into usable and stale tickers.
#[derive(Clone, Debug, Default)]
pub struct CacheStatus {
  pub fresh: Vec<String>,
  pub stale: Vec<String>,
}

fn cache_path(dir: &Path, ticker: &str) -> std::path::PathBuf {
  dir.join(format!("{ticker}.csv"))
}

/// Load one ticker's price series from the cache directory.
pub fn load_series(dir: &Path, ticker: &str) -> Result<PriceSeries> {
  let path = cache_path(dir, ticker);
  let contents = fs::read_to_string(&path)?;

  let mut series = PriceSeries::new();
  for (lineno, line) in contents.lines().enumerate() {
    let line = line.trim();
    if line.is_empty() {
      continue;
    }
    let (date, close) = line.split_once(',').ok_or_else(|| {
      OptimizeError::MalformedCache(format!("{ticker}.csv line {}: missing comma", lineno + 1))
    })?;
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")?;
    let close: f64 = close.trim().parse().map_err(|_| {
      OptimizeError::MalformedCache(format!(
        "{ticker}.csv line {}: bad close {close:?}",
        lineno + 1
      ))
    })?;
    if !close.is_finite() || close <= 0.0 {
      return Err(OptimizeError::MalformedCache(format!(
        "{ticker}.csv line {}: non-positive close {close}",
        lineno + 1
      )));
    }
    series.insert(date, close);
  }

  Ok(series)
}

/// Write one ticker's price series atomically (temp file + rename).
pub fn store_series(dir: &Path, ticker: &str, series: &PriceSeries) -> Result<()> {
  fs::create_dir_all(dir)?;

  let mut tmp = tempfile::NamedTempFile::new_in(dir)?;
  for (date, close) in series {
    writeln!(tmp, "{},{}", date.format("%Y-%m-%d"), close)?;
  }
  tmp
    .persist(cache_path(dir, ticker))
    .map_err(|e| OptimizeError::Io(e.error))?;

  debug!(ticker, points = series.len(), "stored price series");
  Ok(())
}

/// Load every requested ticker that exists in the cache.
pub fn load_universe(dir: &Path, tickers: &[String]) -> Result<BTreeMap<String, PriceSeries>> {
  let mut universe = BTreeMap::new();
  for ticker in tickers {
    if cache_path(dir, ticker).exists() {
      universe.insert(ticker.clone(), load_series(dir, ticker)?);
    }
  }
  Ok(universe)
}

/// Split the requested tickers into fresh-on-disk and needs-refresh.
pub fn partition_by_freshness(
  dir: &Path,
  tickers: &[String],
  policy: RefreshPolicy,
  max_age: Duration,
) -> Result<CacheStatus> {
  let mut status = CacheStatus::default();
  let now = SystemTime::now();

  for ticker in tickers {
    let path = cache_path(dir, ticker);
    let stale = match policy {
      RefreshPolicy::All => true,
      _ if !path.exists() => true,
      RefreshPolicy::Never => false,
      RefreshPolicy::Outdated => {
        let modified = fs::metadata(&path)?.modified()?;
        now
          .duration_since(modified)
          .map(|age| age > max_age)
          .unwrap_or(false)
      }
    };

    if stale {
      status.stale.push(ticker.clone());
    } else {
      status.fresh.push(ticker.clone());
    }
  }

  Ok(status)
}

#[cfg(test)]
mod tests {
  use super::*;

  fn sample_series() -> PriceSeries {
    [
      (NaiveDate::from_ymd_opt(2024, 1, 2).unwrap(), 101.25),
      (NaiveDate::from_ymd_opt(2024, 1, 3).unwrap(), 99.5),
    ]
    .into_iter()
    .collect()
  }

  #[test]
  fn store_then_load_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let series = sample_series();

    store_series(dir.path(), "AAA", &series).unwrap();
    let loaded = load_series(dir.path(), "AAA").unwrap();
    assert_eq!(loaded, series);
  }

  #[test]
  fn malformed_rows_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("BAD.csv"), "2024-01-02;101.0\n").unwrap();

    let err = load_series(dir.path(), "BAD").unwrap_err();
    assert!(matches!(err, OptimizeError::MalformedCache(_)));
  }

  #[test]
  fn non_positive_closes_are_rejected() {
    let dir = tempfile::tempdir().unwrap();
    fs::write(dir.path().join("ZRO.csv"), "2024-01-02,0.0\n").unwrap();

    let err = load_series(dir.path(), "ZRO").unwrap_err();
    assert!(matches!(err, OptimizeError::MalformedCache(_)));
  }

  #[test]
  fn missing_files_are_always_stale() {
    let dir = tempfile::tempdir().unwrap();
    store_series(dir.path(), "AAA", &sample_series()).unwrap();

    let tickers = vec!["AAA".to_string(), "ZZZ".to_string()];
    let status = partition_by_freshness(
      dir.path(),
      &tickers,
      RefreshPolicy::Never,
      Duration::from_secs(3600),
    )
    .unwrap();

    assert_eq!(status.fresh, vec!["AAA".to_string()]);
    assert_eq!(status.stale, vec!["ZZZ".to_string()]);
  }

  #[test]
  fn refresh_all_marks_everything_stale() {
    let dir = tempfile::tempdir().unwrap();
    store_series(dir.path(), "AAA", &sample_series()).unwrap();

    let tickers = vec!["AAA".to_string()];
    let status = partition_by_freshness(
      dir.path(),
      &tickers,
      RefreshPolicy::All,
      Duration::from_secs(3600),
    )
    .unwrap();

    assert!(status.fresh.is_empty());
    assert_eq!(status.stale, tickers);
  }

  #[test]
  fn freshly_written_files_pass_the_age_check() {
    let dir = tempfile::tempdir().unwrap();
    store_series(dir.path(), "AAA", &sample_series()).unwrap();

    let tickers = vec!["AAA".to_string()];
    let status = partition_by_freshness(
      dir.path(),
      &tickers,
      RefreshPolicy::Outdated,
      Duration::from_secs(3600),
    )
    .unwrap();

    assert_eq!(status.fresh, tickers);
    assert!(status.stale.is_empty());
  }

  #[test]
  fn load_universe_skips_missing_tickers() {
    let dir = tempfile::tempdir().unwrap();
    store_series(dir.path(), "AAA", &sample_series()).unwrap();

    let universe = load_universe(
      dir.path(),
      &["AAA".to_string(), "MISSING".to_string()],
    )
    .unwrap();
    assert_eq!(universe.len(), 1);
    assert!(universe.contains_key("AAA"));
  }
}
