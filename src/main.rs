use std::collections::BTreeMap;
use std::path::Path;
use std::path::PathBuf;
use std::time::Duration;
use std::time::Instant;

use anyhow::Context;
use anyhow::Result;
use anyhow::bail;
use chrono::NaiveDate;
use chrono::Utc;
use sortino_rs::TRADING_DAYS_PER_YEAR;
use sortino_rs::data;
use sortino_rs::data::RefreshPolicy;
use sortino_rs::optimizer;
use sortino_rs::optimizer::OptimizerConfig;
use sortino_rs::per_period_return;
use sortino_rs::trade;

/// Recent window used when ranking rebalancing trades.
const TRADE_WINDOW_DAYS: usize = 60;

const CACHE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

#[derive(Debug)]
struct Args {
  cache_dir: PathBuf,
  annual_return: f64,
  required_days: usize,
  end_date: NaiveDate,
  refresh: RefreshPolicy,
  downside_correlation: bool,
  threads: Option<usize>,
  actual: BTreeMap<String, f64>,
}

fn parse_args(argv: impl Iterator<Item = String>) -> Result<Args> {
  let mut args = Args {
    cache_dir: PathBuf::from("cache"),
    annual_return: 0.0,
    required_days: (TRADING_DAYS_PER_YEAR * 14) as usize,
    end_date: Utc::now().date_naive(),
    refresh: RefreshPolicy::Outdated,
    downside_correlation: true,
    threads: None,
    actual: BTreeMap::new(),
  };

  for arg in argv {
    match arg.split_once('=') {
      Some(("--cache-dir", v)) => args.cache_dir = PathBuf::from(v),
      Some(("--required-return", v)) => {
        args.annual_return = v.parse().context("bad --required-return")?
      }
      Some(("--required-days", v)) => {
        args.required_days = v.parse().context("bad --required-days")?
      }
      Some(("--date", v)) => {
        args.end_date = NaiveDate::parse_from_str(v, "%Y-%m-%d").context("bad --date")?
      }
      Some(("--refresh", v)) => {
        args.refresh = match v {
          "outdated" => RefreshPolicy::Outdated,
          "none" => RefreshPolicy::Never,
          "all" => RefreshPolicy::All,
          _ => bail!("unrecognized --refresh value: {v} (expected outdated, none or all)"),
        }
      }
      Some(("--threads", v)) => args.threads = Some(v.parse().context("bad --threads")?),
      Some(("--actual", v)) => {
        for entry in v.split(',') {
          let (ticker, weight) = entry
            .split_once(':')
            .context("expected --actual=TICKER:WEIGHT,...")?;
          args
            .actual
            .insert(ticker.to_string(), weight.parse().context("bad --actual weight")?);
        }
      }
      _ if arg == "--no-correlation-penalty" => args.downside_correlation = false,
      _ => bail!("unrecognized argument: {arg}"),
    }
  }

  if args.annual_return <= 0.0 {
    bail!("need --required-return=<annual multiplicative target>");
  }

  Ok(args)
}

fn cached_tickers(dir: &Path) -> Result<Vec<String>> {
  let mut tickers = Vec::new();
  for entry in
    std::fs::read_dir(dir).with_context(|| format!("reading cache dir {}", dir.display()))?
  {
    let path = entry?.path();
    if path.extension().is_some_and(|ext| ext == "csv") {
      if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
        tickers.push(stem.to_string());
      }
    }
  }
  tickers.sort();
  Ok(tickers)
}

fn main() -> Result<()> {
  tracing_subscriber::fmt::init();
  let args = parse_args(std::env::args().skip(1))?;
  let daily_return = per_period_return(args.annual_return);

  let start = Instant::now();
  let tickers = cached_tickers(&args.cache_dir)?;
  let status =
    data::partition_by_freshness(&args.cache_dir, &tickers, args.refresh, CACHE_MAX_AGE)?;
  if !status.stale.is_empty() {
    println!(
      "{} of {} tickers are stale; refresh them before trusting the result",
      status.stale.len(),
      tickers.len()
    );
  }

  let universe = data::load_universe(&args.cache_dir, &tickers)?;
  let (tickers, matrix) =
    data::build_return_matrix(&universe, args.required_days, args.end_date)?;
  println!(
    "Loading and cleaning data took {:.2}s",
    start.elapsed().as_secs_f64()
  );

  let config = OptimizerConfig {
    required_return: daily_return,
    downside_correlation: args.downside_correlation,
    threads: args.threads,
    ..OptimizerConfig::default()
  };

  let start = Instant::now();
  let result = optimizer::find_optimal_allocation(&matrix, &config)?;
  println!("Optimization took {:.2}s", start.elapsed().as_secs_f64());

  println!("Score: {:.4}", result.score);
  for (ticker, weight) in tickers.iter().zip(result.weights.iter()) {
    if *weight > 0.0 {
      println!("  {ticker}: {weight:.4}");
    }
  }

  if !args.actual.is_empty() {
    let target: BTreeMap<String, f64> = tickers
      .iter()
      .cloned()
      .zip(result.weights.iter().copied())
      .collect();
    let window = matrix.nrows().min(TRADE_WINDOW_DAYS);
    let recent = matrix
      .slice(ndarray::s![matrix.nrows() - window.., ..])
      .to_owned();

    println!("Recommended trades:");
    for t in trade::rank_trades(&target, &args.actual, &tickers, &recent)? {
      println!(
        "  sell {} buy {} amount {:.4} (correlation {:.4})",
        t.sell, t.buy, t.amount, t.correlation
      );
    }
  }

  Ok(())
}
