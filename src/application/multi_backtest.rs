//! Multi-Pair Backtest
//!
//! Backtests every enabled pair from its CSV histories. Pairs share nothing,
//! so they run in parallel on the rayon pool; results come back sorted by
//! pair name regardless of completion order.

use std::path::Path;

use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use thiserror::Error;

use crate::adapters::csv_prices::{load_price_history, PriceLoadError};
use crate::backtest::{BacktestReport, BacktestSimulator};
use crate::config::{AppConfig, PairSection};
use crate::domain::series::PriceSeries;
use crate::strategy::cointegration::CointegrationValidator;
use crate::strategy::params::ConfigError;
use crate::strategy::spread::calculate_all_signals;

/// Pairs with fewer defined z-scores than this are not backtested
pub const MIN_DEFINED_ZSCORES: usize = 5;

#[derive(Debug, Error)]
pub enum PairBacktestError {
    #[error("Price history: {0}")]
    Load(#[from] PriceLoadError),
    #[error("Only {0} defined z-scores (need {min})", min = MIN_DEFINED_ZSCORES)]
    TooFewZscores(usize),
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// One CSV row of the multi-pair summary
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairBacktestSummary {
    pub pair: String,
    pub bars: usize,
    pub n_trades: usize,
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    pub annual_volatility_pct: f64,
    pub sharpe_ratio: f64,
    pub max_drawdown_pct: f64,
    pub win_rate_pct: f64,
    pub profit_factor: f64,
    pub avg_trade_pnl_usd: f64,
    pub avg_duration_hours: f64,
    pub final_equity: f64,
    pub open_position: bool,
    pub is_cointegrated: bool,
    pub adf_pvalue: f64,
    pub half_life: Option<f64>,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct BacktestWindow {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Only the first `limit` enabled pairs
    pub limit: Option<usize>,
}

#[derive(Debug)]
pub struct PairBacktest {
    pub summary: PairBacktestSummary,
    pub report: BacktestReport,
}

#[derive(Debug, Default)]
pub struct MultiBacktestResult {
    pub summaries: Vec<PairBacktestSummary>,
    /// Pairs that could not be backtested, with the reason
    pub skipped: Vec<(String, String)>,
}

/// Backtest one pair over already-loaded series
pub fn backtest_pair(
    config: &AppConfig,
    pair: &str,
    y: &PriceSeries,
    x: &PriceSeries,
) -> Result<PairBacktest, PairBacktestError> {
    let table = calculate_all_signals(y, x, &config.windows);
    let defined = table.defined_zscores();
    if defined < MIN_DEFINED_ZSCORES {
        return Err(PairBacktestError::TooFewZscores(defined));
    }

    let simulator = BacktestSimulator::new(config.backtest, config.risk, config.costs)?;
    let report = simulator.run(&table.rows, &config.thresholds)?;
    let cointegration = CointegrationValidator::new(config.cointegration)?.test(x, y);

    let m = &report.metrics;
    let summary = PairBacktestSummary {
        pair: pair.to_string(),
        bars: table.len(),
        n_trades: m.n_trades,
        total_return_pct: m.total_return_pct,
        annual_return_pct: m.annual_return_pct,
        annual_volatility_pct: m.annual_volatility_pct,
        sharpe_ratio: m.sharpe_ratio,
        max_drawdown_pct: m.max_drawdown_pct,
        win_rate_pct: m.win_rate_pct,
        profit_factor: m.profit_factor,
        avg_trade_pnl_usd: m.avg_trade_pnl_usd,
        avg_duration_hours: m.avg_duration_hours,
        final_equity: m.final_equity,
        open_position: report.open_trade.is_some(),
        is_cointegrated: cointegration.is_cointegrated,
        adf_pvalue: cointegration.adf_pvalue,
        half_life: cointegration.half_life,
    };
    Ok(PairBacktest { summary, report })
}

fn backtest_pair_files(
    config: &AppConfig,
    pair: &PairSection,
    window: &BacktestWindow,
) -> Result<PairBacktest, PairBacktestError> {
    let y = load_price_history(&pair.y_file)?.series.between(window.start, window.end);
    let x = load_price_history(&pair.x_file)?.series.between(window.start, window.end);
    backtest_pair(config, &pair.name, &y, &x)
}

/// Backtest all enabled pairs in parallel
pub fn run_multi_backtest(config: &AppConfig, window: &BacktestWindow) -> MultiBacktestResult {
    let pairs: Vec<&PairSection> = config
        .enabled_pairs()
        .take(window.limit.unwrap_or(usize::MAX))
        .collect();

    let outcomes: Vec<(String, Result<PairBacktest, PairBacktestError>)> = pairs
        .par_iter()
        .map(|pair| (pair.name.clone(), backtest_pair_files(config, pair, window)))
        .collect();

    let mut result = MultiBacktestResult::default();
    for (name, outcome) in outcomes {
        match outcome {
            Ok(run) => result.summaries.push(run.summary),
            Err(e) => {
                tracing::warn!(pair = %name, error = %e, "Pair skipped");
                result.skipped.push((name, e.to_string()));
            }
        }
    }
    result.summaries.sort_by(|a, b| a.pair.cmp(&b.pair));
    result.skipped.sort();

    tracing::info!(
        backtested = result.summaries.len(),
        skipped = result.skipped.len(),
        "Multi-pair backtest complete"
    );
    result
}

pub fn write_summary_csv(
    path: impl AsRef<Path>,
    summaries: &[PairBacktestSummary],
) -> Result<(), csv::Error> {
    let mut writer = csv::Writer::from_path(path)?;
    for row in summaries {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapters::csv_prices::write_price_history;
    use crate::domain::series::PriceHistory;
    use chrono::{Duration, TimeZone};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};
    use std::path::PathBuf;

    fn ts(i: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i)
    }

    /// Log-price random walk X and Y = X * exp(AR(1) noise)
    fn pair_series(seed: u64, n: usize) -> (PriceSeries, PriceSeries) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut log_x = 4.0_f64;
        let mut noise = 0.0_f64;
        let mut xs = Vec::with_capacity(n);
        let mut ys = Vec::with_capacity(n);
        for _ in 0..n {
            log_x += rng.gen_range(-0.01..0.01);
            noise = 0.6 * noise + rng.gen_range(-0.02..0.02);
            xs.push(log_x.exp());
            ys.push((0.5 + log_x + noise).exp());
        }
        let stamps: Vec<_> = (0..n as i64).map(ts).collect();
        (
            PriceSeries::from_parts(stamps.clone(), ys).unwrap(),
            PriceSeries::from_parts(stamps, xs).unwrap(),
        )
    }

    fn small_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.windows.beta_window = 30;
        config.windows.zscore_window = 20;
        config.cointegration.lookback = 150;
        config
    }

    fn write(dir: &Path, name: &str, series: PriceSeries) -> PathBuf {
        let path = dir.join(name);
        write_price_history(&path, &PriceHistory::new(series, None).unwrap()).unwrap();
        path
    }

    #[test]
    fn test_backtest_pair_summary() {
        let (y, x) = pair_series(7, 300);
        let run = backtest_pair(&small_config(), "SYN", &y, &x).unwrap();
        assert_eq!(run.summary.pair, "SYN");
        assert_eq!(run.summary.bars, 300);
        assert_eq!(run.summary.n_trades, run.report.trades.len());
        assert_eq!(run.summary.final_equity, run.report.metrics.final_equity);
        assert!(run.summary.max_drawdown_pct >= 0.0);
    }

    #[test]
    fn test_too_few_zscores() {
        let (y, x) = pair_series(1, 40);
        let err = backtest_pair(&AppConfig::default(), "SHORT", &y, &x).unwrap_err();
        assert!(matches!(err, PairBacktestError::TooFewZscores(0)));
    }

    #[test]
    fn test_multi_backtest_sorted_and_isolated() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();

        let (y1, x1) = pair_series(11, 250);
        let (y2, x2) = pair_series(12, 250);
        let files = [
            ("ZZZ_X", write(dir.path(), "z.csv", y1), write(dir.path(), "zx.csv", x1)),
            ("AAA_X", write(dir.path(), "a.csv", y2), write(dir.path(), "ax.csv", x2)),
            ("MISSING", dir.path().join("nope.csv"), dir.path().join("ax.csv")),
        ];
        for (name, y_file, x_file) in files {
            config.pairs.push(PairSection {
                name: name.to_string(),
                asset_y: format!("{name}_Y"),
                asset_x: "X".to_string(),
                y_file,
                x_file,
                enabled: true,
            });
        }

        let result = run_multi_backtest(&config, &BacktestWindow::default());
        let names: Vec<_> = result.summaries.iter().map(|s| s.pair.as_str()).collect();
        assert_eq!(names, vec!["AAA_X", "ZZZ_X"]);
        assert_eq!(result.skipped.len(), 1);
        assert_eq!(result.skipped[0].0, "MISSING");

        let out = dir.path().join("summary.csv");
        write_summary_csv(&out, &result.summaries).unwrap();
        let mut reader = csv::Reader::from_path(&out).unwrap();
        let headers = reader.headers().unwrap().clone();
        assert_eq!(&headers[0], "pair");
        assert_eq!(reader.records().count(), 2);
    }

    #[test]
    fn test_date_window_and_limit() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = small_config();
        let (y, x) = pair_series(5, 200);
        config.pairs.push(PairSection {
            name: "P".to_string(),
            asset_y: "Y".to_string(),
            asset_x: "X".to_string(),
            y_file: write(dir.path(), "y.csv", y),
            x_file: write(dir.path(), "x.csv", x),
            enabled: true,
        });

        let window = BacktestWindow {
            start: Some(ts(100)),
            end: Some(ts(199)),
            limit: None,
        };
        let result = run_multi_backtest(&config, &window);
        assert_eq!(result.summaries[0].bars, 100);

        let window = BacktestWindow {
            limit: Some(0),
            ..Default::default()
        };
        assert!(run_multi_backtest(&config, &window).summaries.is_empty());
    }
}
