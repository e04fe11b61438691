//! Performance Metrics
//!
//! Whole-run statistics over an equity curve and its closed trades.
//! Annualization uses bars-per-year, either configured or inferred from the
//! median spacing between bars.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::trade::{BacktestTrade, EquityPoint};
use crate::strategy::stats;

/// Bars per year assumed when spacing cannot be measured (hourly)
pub const DEFAULT_BARS_PER_YEAR: f64 = 365.0 * 24.0;
const SECONDS_PER_YEAR: f64 = 365.0 * 24.0 * 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformanceMetrics {
    pub total_return_pct: f64,
    pub annual_return_pct: f64,
    pub annual_volatility_pct: f64,
    /// annual return / annual volatility; 0 when volatility is 0
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough decline, as a positive percentage
    pub max_drawdown_pct: f64,
    pub n_trades: usize,
    pub win_rate_pct: f64,
    pub avg_win_usd: f64,
    /// Magnitude of the average losing trade
    pub avg_loss_usd: f64,
    /// Gross profit / gross loss; 0 when there are no losses
    pub profit_factor: f64,
    /// Average win / average loss; 0 when there are no losses
    pub payoff_ratio: f64,
    pub avg_trade_pnl_usd: f64,
    pub avg_duration_hours: f64,
    pub avg_duration_bars: f64,
    pub final_equity: f64,
    pub bars_per_year: f64,
}

/// Bars per year implied by the median spacing of `timestamps`
pub fn infer_bars_per_year(timestamps: &[DateTime<Utc>]) -> f64 {
    let mut spacings: Vec<i64> = timestamps
        .windows(2)
        .map(|w| (w[1] - w[0]).num_seconds())
        .filter(|s| *s > 0)
        .collect();
    if spacings.is_empty() {
        return DEFAULT_BARS_PER_YEAR;
    }
    spacings.sort_unstable();
    let mid = spacings.len() / 2;
    let median = if spacings.len() % 2 == 0 {
        (spacings[mid - 1] + spacings[mid]) as f64 / 2.0
    } else {
        spacings[mid] as f64
    };
    SECONDS_PER_YEAR / median
}

pub fn max_drawdown_pct(equity: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &value in equity {
        peak = peak.max(value);
        if peak > 0.0 {
            worst = worst.max((peak - value) / peak);
        }
    }
    worst * 100.0
}

pub fn compute_metrics(
    equity_curve: &[EquityPoint],
    trades: &[BacktestTrade],
    initial_capital: f64,
    bars_per_year: f64,
) -> PerformanceMetrics {
    let equity: Vec<f64> = equity_curve.iter().map(|p| p.equity).collect();
    let final_equity = equity.last().copied().unwrap_or(initial_capital);

    let total_return_pct = (final_equity / initial_capital - 1.0) * 100.0;

    let years = equity.len() as f64 / bars_per_year;
    let growth = final_equity / initial_capital;
    let annual_return_pct = if years > 0.0 && growth > 0.0 {
        (growth.powf(1.0 / years) - 1.0) * 100.0
    } else if years > 0.0 {
        -100.0
    } else {
        0.0
    };

    let returns: Vec<f64> = equity
        .windows(2)
        .filter(|w| w[0] != 0.0)
        .map(|w| w[1] / w[0] - 1.0)
        .collect();
    let annual_volatility_pct = if returns.len() >= 2 {
        stats::sample_std(&returns) * bars_per_year.sqrt() * 100.0
    } else {
        0.0
    };
    let sharpe_ratio = if annual_volatility_pct > 0.0 {
        annual_return_pct / annual_volatility_pct
    } else {
        0.0
    };

    let mut metrics = PerformanceMetrics {
        total_return_pct,
        annual_return_pct,
        annual_volatility_pct,
        sharpe_ratio,
        max_drawdown_pct: max_drawdown_pct(&equity),
        final_equity,
        bars_per_year,
        ..Default::default()
    };
    apply_trade_stats(&mut metrics, trades);
    metrics
}

fn apply_trade_stats(metrics: &mut PerformanceMetrics, trades: &[BacktestTrade]) {
    if trades.is_empty() {
        return;
    }
    let n = trades.len() as f64;
    let wins: Vec<f64> = trades.iter().filter(|t| t.is_win()).map(|t| t.realized_pnl).collect();
    let losses: Vec<f64> = trades
        .iter()
        .filter(|t| !t.is_win())
        .map(|t| t.realized_pnl)
        .collect();

    let gross_profit: f64 = wins.iter().sum();
    let gross_loss: f64 = losses.iter().map(|l| l.abs()).sum();
    let avg_win = if wins.is_empty() { 0.0 } else { gross_profit / wins.len() as f64 };
    let avg_loss = if losses.is_empty() { 0.0 } else { gross_loss / losses.len() as f64 };

    metrics.n_trades = trades.len();
    metrics.win_rate_pct = wins.len() as f64 / n * 100.0;
    metrics.avg_win_usd = avg_win;
    metrics.avg_loss_usd = avg_loss;
    metrics.profit_factor = if gross_loss > 0.0 { gross_profit / gross_loss } else { 0.0 };
    metrics.payoff_ratio = if avg_loss > 0.0 { avg_win / avg_loss } else { 0.0 };
    metrics.avg_trade_pnl_usd = trades.iter().map(|t| t.realized_pnl).sum::<f64>() / n;
    metrics.avg_duration_hours = trades.iter().map(|t| t.duration_hours()).sum::<f64>() / n;
    metrics.avg_duration_bars = trades.iter().map(|t| t.duration_bars as f64).sum::<f64>() / n;
}
