use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Position held on the spread. Exactly one per pair at any time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PositionState {
    /// No position
    #[default]
    Neutral,
    /// Long Y, short beta * X
    LongSpread,
    /// Short Y, long beta * X
    ShortSpread,
}

impl PositionState {
    /// +1 for long spread, -1 for short spread, 0 when flat
    pub fn direction(&self) -> i8 {
        match self {
            PositionState::Neutral => 0,
            PositionState::LongSpread => 1,
            PositionState::ShortSpread => -1,
        }
    }

    pub fn is_neutral(&self) -> bool {
        matches!(self, PositionState::Neutral)
    }
}

impl fmt::Display for PositionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PositionState::Neutral => write!(f, "neutral"),
            PositionState::LongSpread => write!(f, "long_spread"),
            PositionState::ShortSpread => write!(f, "short_spread"),
        }
    }
}

/// Discrete signal emitted once per processed tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalKind {
    EnterLong,
    EnterShort,
    Exit,
    StopLoss,
    NoAction,
}

impl SignalKind {
    pub fn is_entry(&self) -> bool {
        matches!(self, SignalKind::EnterLong | SignalKind::EnterShort)
    }

    pub fn is_actionable(&self) -> bool {
        !matches!(self, SignalKind::NoAction)
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::EnterLong => write!(f, "enter_long_spread"),
            SignalKind::EnterShort => write!(f, "enter_short_spread"),
            SignalKind::Exit => write!(f, "exit_position"),
            SignalKind::StopLoss => write!(f, "stop_loss"),
            SignalKind::NoAction => write!(f, "no_action"),
        }
    }
}

/// One aligned bar of derived pair statistics.
///
/// `None` means "not yet computable"; it is never coerced to zero.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SignalRow {
    pub timestamp: DateTime<Utc>,
    pub price_y: f64,
    pub price_x: f64,
    pub beta: Option<f64>,
    pub spread: Option<f64>,
    pub spread_mean: Option<f64>,
    pub spread_std: Option<f64>,
    pub zscore: Option<f64>,
}

impl SignalRow {
    /// Input for the state machine
    pub fn to_tick(&self) -> Tick {
        Tick {
            timestamp: self.timestamp,
            zscore: self.zscore,
            beta: self.beta,
            spread: self.spread,
            price_y: self.price_y,
            price_x: self.price_x,
        }
    }
}

/// Output of `calculate_all_signals`, one row per aligned timestamp
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalTable {
    pub rows: Vec<SignalRow>,
}

impl SignalTable {
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn last(&self) -> Option<&SignalRow> {
        self.rows.last()
    }

    pub fn zscores(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.zscore).collect()
    }

    pub fn spreads(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.spread).collect()
    }

    pub fn betas(&self) -> Vec<Option<f64>> {
        self.rows.iter().map(|r| r.beta).collect()
    }

    /// Number of rows with a defined z-score
    pub fn defined_zscores(&self) -> usize {
        self.rows.iter().filter(|r| r.zscore.is_some()).count()
    }
}

/// Per-tick input to the signal state machine
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tick {
    pub timestamp: DateTime<Utc>,
    pub zscore: Option<f64>,
    pub beta: Option<f64>,
    pub spread: Option<f64>,
    pub price_y: f64,
    pub price_x: f64,
}

/// Immutable record of one state-machine evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TradingSignal {
    pub timestamp: DateTime<Utc>,
    pub kind: SignalKind,
    pub zscore: Option<f64>,
    pub beta: Option<f64>,
    pub spread: Option<f64>,
    /// Why the signal did (or did not) fire
    pub reason: String,
    pub price_y: f64,
    pub price_x: f64,
    pub previous_state: PositionState,
    pub new_state: PositionState,
}

impl TradingSignal {
    pub fn changed_state(&self) -> bool {
        self.previous_state != self.new_state
    }
}
