use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::signal::PositionState;

/// Side of the spread a simulated trade held
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradeDirection {
    LongSpread,
    ShortSpread,
}

impl TradeDirection {
    pub fn from_state(state: PositionState) -> Option<Self> {
        match state {
            PositionState::LongSpread => Some(TradeDirection::LongSpread),
            PositionState::ShortSpread => Some(TradeDirection::ShortSpread),
            PositionState::Neutral => None,
        }
    }
}

impl fmt::Display for TradeDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TradeDirection::LongSpread => write!(f, "long_spread"),
            TradeDirection::ShortSpread => write!(f, "short_spread"),
        }
    }
}

/// Why a simulated trade was flattened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// |z| fell below the exit band
    Exit,
    /// |z| rose above the stop band
    StopLoss,
}

/// A closed simulated trade. Sealed once the position is flattened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BacktestTrade {
    pub entry_timestamp: DateTime<Utc>,
    pub exit_timestamp: DateTime<Utc>,
    pub entry_price_y: f64,
    pub entry_price_x: f64,
    pub exit_price_y: f64,
    pub exit_price_x: f64,
    pub entry_zscore: f64,
    pub exit_zscore: Option<f64>,
    pub entry_beta: Option<f64>,
    pub direction: TradeDirection,
    pub exit_reason: ExitReason,
    /// Sum of per-bar net P&L from the entry bar through the exit bar
    pub realized_pnl: f64,
    /// Number of bars from entry to exit
    pub duration_bars: usize,
}

impl BacktestTrade {
    pub fn duration(&self) -> chrono::Duration {
        self.exit_timestamp - self.entry_timestamp
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration().num_seconds() as f64 / 3600.0
    }

    pub fn is_win(&self) -> bool {
        self.realized_pnl > 0.0
    }
}

/// Position still open when the data ran out
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpenTrade {
    pub entry_timestamp: DateTime<Utc>,
    pub entry_zscore: f64,
    pub direction: TradeDirection,
    /// Mark-to-market P&L accrued so far (net of costs)
    pub unrealized_pnl: f64,
    pub bars_held: usize,
}

/// One point of the equity curve
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub equity: f64,
}
