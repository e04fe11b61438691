//! Backtest Simulator
//!
//! Replays a signal table with next-bar execution:
//! - position[i] is decided from z[i] using the state-machine rules
//! - P&L[i] = units[i-1] * (price[i] - price[i-1]) summed over both legs
//! - costs[i] = |units[i] - units[i-1]| * price[i] * (fee + slippage)
//!
//! A position opened at bar i therefore earns nothing until bar i+1.
//! Trades are the contiguous non-neutral runs; each trade's P&L is the sum
//! of net bar P&L from its entry bar through its exit bar.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::backtest::metrics::{compute_metrics, infer_bars_per_year, PerformanceMetrics};
use crate::domain::signal::{PositionState, SignalRow};
use crate::domain::trade::{BacktestTrade, EquityPoint, ExitReason, OpenTrade, TradeDirection};
use crate::strategy::params::{
    BacktestConfig, ConfigError, CostConfig, EntryMode, SizingConfig, ThresholdConfig,
};
use crate::strategy::sizing::PositionSizer;

/// Per-bar accounting line
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BarPnl {
    pub timestamp: DateTime<Utc>,
    pub position: PositionState,
    pub units_y: f64,
    pub units_x: f64,
    /// Mark-to-market on units held from the previous bar
    pub gross_pnl: f64,
    pub costs: f64,
    pub net_pnl: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestReport {
    pub equity_curve: Vec<EquityPoint>,
    pub bars: Vec<BarPnl>,
    /// Closed trades only
    pub trades: Vec<BacktestTrade>,
    /// Position still held on the last bar
    pub open_trade: Option<OpenTrade>,
    pub metrics: PerformanceMetrics,
}

/// Position path with the reason each run was closed
struct PositionPath {
    states: Vec<PositionState>,
    exits: Vec<Option<ExitReason>>,
}

#[derive(Debug, Clone)]
pub struct BacktestSimulator {
    config: BacktestConfig,
    sizer: PositionSizer,
}

impl BacktestSimulator {
    pub fn new(
        config: BacktestConfig,
        sizing: SizingConfig,
        costs: CostConfig,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let sizer = PositionSizer::new(sizing, costs)?;
        Ok(Self { config, sizer })
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    pub fn run(
        &self,
        rows: &[SignalRow],
        thresholds: &ThresholdConfig,
    ) -> Result<BacktestReport, ConfigError> {
        thresholds.validate()?;

        let path = derive_positions(rows, thresholds);
        let units = self.size_positions(rows, &path.states);
        let bars = self.account(rows, &path.states, &units);

        let initial = self.config.initial_capital;
        let mut equity = initial;
        let equity_curve: Vec<EquityPoint> = bars
            .iter()
            .map(|bar| {
                equity += bar.net_pnl;
                EquityPoint {
                    timestamp: bar.timestamp,
                    equity,
                }
            })
            .collect();

        let (trades, open_trade) = extract_trades(rows, &path, &bars);

        let bars_per_year = self.config.bars_per_year.unwrap_or_else(|| {
            let timestamps: Vec<DateTime<Utc>> = rows.iter().map(|r| r.timestamp).collect();
            infer_bars_per_year(&timestamps)
        });
        let metrics = compute_metrics(&equity_curve, &trades, initial, bars_per_year);

        tracing::info!(
            bars = rows.len(),
            trades = metrics.n_trades,
            total_return_pct = metrics.total_return_pct,
            sharpe = metrics.sharpe_ratio,
            max_drawdown_pct = metrics.max_drawdown_pct,
            "Backtest complete"
        );

        Ok(BacktestReport {
            equity_curve,
            bars,
            trades,
            open_trade,
            metrics,
        })
    }

    /// Signed leg units held at the close of each bar
    fn size_positions(&self, rows: &[SignalRow], states: &[PositionState]) -> Vec<(f64, f64)> {
        let mut units = Vec::with_capacity(rows.len());
        let mut previous = (0.0, 0.0);
        let mut previous_state = PositionState::Neutral;

        for (row, state) in rows.iter().zip(states) {
            let direction = state.direction() as f64;
            let current = if state.is_neutral() {
                (0.0, 0.0)
            } else if self.config.hold_units_until_exit && *state == previous_state {
                previous
            } else {
                // no usable beta or sigma: keep whatever is held
                match row.beta.filter(|b| b.is_finite()) {
                    Some(beta) => {
                        let (y_notional, x_notional) =
                            self.sizer.capped_notionals(beta, row.spread_std);
                        if y_notional > 0.0 {
                            // Long spread: long Y, short X when beta > 0
                            let x_sign = if beta < 0.0 { 1.0 } else { -1.0 };
                            (
                                direction * y_notional / row.price_y,
                                direction * x_sign * x_notional / row.price_x,
                            )
                        } else {
                            previous
                        }
                    }
                    None => previous,
                }
            };
            units.push(current);
            previous = current;
            previous_state = *state;
        }
        units
    }

    fn account(
        &self,
        rows: &[SignalRow],
        states: &[PositionState],
        units: &[(f64, f64)],
    ) -> Vec<BarPnl> {
        let cost_rate = self.sizer.cost_config().total_rate();
        let mut bars = Vec::with_capacity(rows.len());

        for i in 0..rows.len() {
            let (held_y, held_x) = if i == 0 { (0.0, 0.0) } else { units[i - 1] };
            let gross_pnl = if i == 0 {
                0.0
            } else {
                held_y * (rows[i].price_y - rows[i - 1].price_y)
                    + held_x * (rows[i].price_x - rows[i - 1].price_x)
            };
            let (units_y, units_x) = units[i];
            let traded_notional = (units_y - held_y).abs() * rows[i].price_y
                + (units_x - held_x).abs() * rows[i].price_x;
            let costs = traded_notional * cost_rate;

            bars.push(BarPnl {
                timestamp: rows[i].timestamp,
                position: states[i],
                units_y,
                units_x,
                gross_pnl,
                costs,
                net_pnl: gross_pnl - costs,
            });
        }
        bars
    }
}

/// Forward-filled position path using the state-machine rules: entry per
/// `entry_mode`, stop dominates exit, an undefined z holds the position and
/// leaves the crossing reference untouched.
fn derive_positions(rows: &[SignalRow], thresholds: &ThresholdConfig) -> PositionPath {
    let ThresholdConfig {
        z_in,
        z_out,
        z_stop,
        entry_mode,
    } = *thresholds;

    let mut states = Vec::with_capacity(rows.len());
    let mut exits = Vec::with_capacity(rows.len());
    let mut state = PositionState::Neutral;
    let mut prev_z: Option<f64> = None;

    for row in rows {
        let mut exit = None;
        if let Some(z) = row.zscore.filter(|z| z.is_finite()) {
            state = match state {
                PositionState::Neutral => {
                    let (long, short) = match entry_mode {
                        EntryMode::Crossing => match prev_z {
                            Some(p) => (p >= -z_in && z < -z_in, p <= z_in && z > z_in),
                            None => (false, false),
                        },
                        EntryMode::Level => (z <= -z_in, z >= z_in),
                    };
                    if long {
                        PositionState::LongSpread
                    } else if short {
                        PositionState::ShortSpread
                    } else {
                        PositionState::Neutral
                    }
                }
                held => {
                    if z.abs() > z_stop {
                        exit = Some(ExitReason::StopLoss);
                        PositionState::Neutral
                    } else if z.abs() < z_out {
                        exit = Some(ExitReason::Exit);
                        PositionState::Neutral
                    } else {
                        held
                    }
                }
            };
            prev_z = Some(z);
        }
        states.push(state);
        exits.push(exit);
    }

    PositionPath { states, exits }
}

fn extract_trades(
    rows: &[SignalRow],
    path: &PositionPath,
    bars: &[BarPnl],
) -> (Vec<BacktestTrade>, Option<OpenTrade>) {
    let mut trades = Vec::new();
    let mut entry: Option<usize> = None;

    for i in 0..rows.len() {
        let state = path.states[i];
        let was_flat = i == 0 || path.states[i - 1].is_neutral();

        if entry.is_none() && !state.is_neutral() && was_flat {
            entry = Some(i);
            continue;
        }

        if let (Some(start), Some(reason)) = (entry, path.exits[i]) {
            let direction = match TradeDirection::from_state(path.states[start]) {
                Some(d) => d,
                None => continue,
            };
            let entry_row = &rows[start];
            let exit_row = &rows[i];
            trades.push(BacktestTrade {
                entry_timestamp: entry_row.timestamp,
                exit_timestamp: exit_row.timestamp,
                entry_price_y: entry_row.price_y,
                entry_price_x: entry_row.price_x,
                exit_price_y: exit_row.price_y,
                exit_price_x: exit_row.price_x,
                entry_zscore: entry_row.zscore.unwrap_or_default(),
                exit_zscore: exit_row.zscore,
                entry_beta: entry_row.beta,
                direction,
                exit_reason: reason,
                realized_pnl: bars[start..=i].iter().map(|b| b.net_pnl).sum(),
                duration_bars: i - start,
            });
            entry = None;
        }
    }

    let open_trade = entry.and_then(|start| {
        let direction = TradeDirection::from_state(path.states[start])?;
        Some(OpenTrade {
            entry_timestamp: rows[start].timestamp,
            entry_zscore: rows[start].zscore.unwrap_or_default(),
            direction,
            unrealized_pnl: bars[start..].iter().map(|b| b.net_pnl).sum(),
            bars_held: rows.len() - 1 - start,
        })
    });

    (trades, open_trade)
}
