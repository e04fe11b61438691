//! Pair Scanner
//!
//! One scheduling tick across every configured pair: derive the signal
//! table, apply the liquidity and cointegration gates, advance that pair's
//! persisted state machine by the latest bar and size anything actionable.
//! A failing pair is reported in its own outcome and never stops the others.

use std::collections::HashMap;
use std::path::PathBuf;

use serde::Serialize;

use crate::adapters::csv_prices::load_price_history;
use crate::config::{AppConfig, FiltersSection, PairSection};
use crate::domain::series::PriceHistory;
use crate::domain::signal::{PositionState, SignalTable, TradingSignal};
use crate::ports::state_store::StateStore;
use crate::strategy::cointegration::{CointegrationResult, CointegrationValidator};
use crate::strategy::params::{ConfigError, ThresholdConfig, WindowConfig};
use crate::strategy::sizing::{PositionSizeResult, PositionSizer, SizingRequest};
use crate::strategy::spread::calculate_all_signals;
use crate::strategy::state_machine::{PersistPolicy, SignalStateMachine};

/// What happened to one pair during a scan
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// An actionable signal was produced
    Signal,
    NoSignal,
    /// Average daily volume below the configured minimum on either leg
    AdvFiltered,
    NotCointegrated,
    /// Not enough overlapping bars to evaluate
    NoData,
    Failed(String),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub pair: String,
    pub status: ScanStatus,
    /// Position state after the scan; Neutral when the machine never ran
    pub state: PositionState,
    pub signal: Option<TradingSignal>,
    pub position: Option<PositionSizeResult>,
    pub cointegration: Option<CointegrationResult>,
    /// 0-100 heuristic, present for actionable signals
    pub confidence: Option<f64>,
    pub adv_y_usd: Option<f64>,
    pub adv_x_usd: Option<f64>,
}

impl ScanOutcome {
    fn skipped(pair: &str, status: ScanStatus) -> Self {
        Self {
            pair: pair.to_string(),
            status,
            state: PositionState::Neutral,
            signal: None,
            position: None,
            cointegration: None,
            confidence: None,
            adv_y_usd: None,
            adv_x_usd: None,
        }
    }

    pub fn is_actionable(&self) -> bool {
        self.status == ScanStatus::Signal
    }
}

/// Trading confidence in [0, 100].
///
/// Up to 40 points for cointegration strength, 40 for z-score magnitude and
/// 20 for a half-life in the preferred range.
pub fn confidence_score(zscore: f64, p_value: f64, half_life: Option<f64>) -> f64 {
    let mut confidence = 0.0;

    if p_value < 0.01 {
        confidence += 40.0;
    } else if p_value < 0.03 {
        confidence += 30.0;
    } else if p_value < 0.05 {
        confidence += 20.0;
    }

    let abs_z = zscore.abs();
    if abs_z > 3.0 {
        confidence += 40.0;
    } else if abs_z > 2.5 {
        confidence += 30.0;
    } else if abs_z > 2.0 {
        confidence += 20.0;
    }

    if let Some(hl) = half_life {
        if (2.0..=10.0).contains(&hl) {
            confidence += 20.0;
        } else if (1.0..=20.0).contains(&hl) {
            confidence += 10.0;
        }
    }

    confidence
}

pub struct PairScanner<S: StateStore> {
    windows: WindowConfig,
    thresholds: ThresholdConfig,
    filters: FiltersSection,
    validator: CointegrationValidator,
    sizer: PositionSizer,
    store: S,
}

impl<S: StateStore> PairScanner<S> {
    pub fn new(config: &AppConfig, store: S) -> Result<Self, ConfigError> {
        config.windows.validate()?;
        config.thresholds.validate()?;
        Ok(Self {
            windows: config.windows,
            thresholds: config.thresholds,
            filters: config.filters.clone(),
            validator: CointegrationValidator::new(config.cointegration)?,
            sizer: PositionSizer::new(config.risk, config.costs)?,
            store,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn filters(&self) -> &FiltersSection {
        &self.filters
    }

    /// Scan pairs whose histories live in CSV files. Each file is read once
    /// even when several pairs share a leg.
    pub fn scan_files<'a, I>(&self, pairs: I) -> Vec<ScanOutcome>
    where
        I: IntoIterator<Item = &'a PairSection>,
    {
        let mut cache: HashMap<PathBuf, Result<PriceHistory, String>> = HashMap::new();
        let mut outcomes = Vec::new();

        for pair in pairs {
            for path in [&pair.y_file, &pair.x_file] {
                cache
                    .entry(path.clone())
                    .or_insert_with(|| load_price_history(path).map_err(|e| e.to_string()));
            }
            let outcome = match (&cache[&pair.y_file], &cache[&pair.x_file]) {
                (Ok(y), Ok(x)) => self.scan_pair(&pair.name, y, x),
                (Err(e), _) | (_, Err(e)) => {
                    tracing::error!(pair = %pair.name, error = %e, "Failed to load price history");
                    ScanOutcome::skipped(&pair.name, ScanStatus::Failed(e.clone()))
                }
            };
            outcomes.push(outcome);
        }

        let actionable = outcomes.iter().filter(|o| o.is_actionable()).count();
        tracing::info!(pairs = outcomes.len(), signals = actionable, "Scan complete");
        outcomes
    }

    /// Scan one pair. `y` is the dependent leg, `x` the hedge leg.
    pub fn scan_pair(&self, pair: &str, y: &PriceHistory, x: &PriceHistory) -> ScanOutcome {
        let table = calculate_all_signals(&y.series, &x.series, &self.windows);
        if table.is_empty() {
            tracing::warn!(pair = %pair, "No overlapping bars");
            return ScanOutcome::skipped(pair, ScanStatus::NoData);
        }

        let adv_y_usd = y.adv_usd(self.filters.bars_per_day, self.filters.adv_days);
        let adv_x_usd = x.adv_usd(self.filters.bars_per_day, self.filters.adv_days);
        if !self.filters.bypass_adv && !self.passes_adv(adv_y_usd, adv_x_usd) {
            tracing::info!(pair = %pair, adv_y = ?adv_y_usd, adv_x = ?adv_x_usd, "ADV filter not met");
            let mut outcome = ScanOutcome::skipped(pair, ScanStatus::AdvFiltered);
            outcome.adv_y_usd = adv_y_usd;
            outcome.adv_x_usd = adv_x_usd;
            return outcome;
        }

        let cointegration = self.validator.test(&x.series, &y.series);
        self.process_latest(pair, &table, adv_y_usd, adv_x_usd, cointegration)
    }

    /// Missing volume fails the filter
    fn passes_adv(&self, adv_y: Option<f64>, adv_x: Option<f64>) -> bool {
        let min = self.filters.min_adv_usd;
        matches!((adv_y, adv_x), (Some(y), Some(x)) if y >= min && x >= min)
    }

    fn process_latest(
        &self,
        pair: &str,
        table: &SignalTable,
        adv_y_usd: Option<f64>,
        adv_x_usd: Option<f64>,
        cointegration: CointegrationResult,
    ) -> ScanOutcome {
        let mut outcome = ScanOutcome::skipped(pair, ScanStatus::NoSignal);
        outcome.adv_y_usd = adv_y_usd;
        outcome.adv_x_usd = adv_x_usd;

        let latest = match table.last() {
            Some(row) => *row,
            None => {
                outcome.status = ScanStatus::NoData;
                return outcome;
            }
        };

        if self.filters.require_cointegration && !cointegration.is_cointegrated {
            tracing::info!(
                pair = %pair,
                reasons = ?cointegration.rejection_reasons,
                "Pair not cointegrated"
            );
            outcome.status = ScanStatus::NotCointegrated;
            outcome.cointegration = Some(cointegration);
            return outcome;
        }

        // Every tick is written so the next run crosses against this bar.
        let mut machine = match SignalStateMachine::new(self.thresholds, pair, &self.store) {
            Ok(m) => m.with_policy(PersistPolicy::EveryTick),
            Err(e) => {
                outcome.status = ScanStatus::Failed(e.to_string());
                return outcome;
            }
        };
        if table.len() >= 2 {
            machine.seed_previous_zscore(table.rows[table.len() - 2].zscore);
        }

        let signal = machine.process_tick(&latest.to_tick());
        outcome.state = machine.current_state();

        if signal.kind.is_actionable() {
            outcome.status = ScanStatus::Signal;
            outcome.position = signal.beta.map(|beta| {
                self.sizer.size(&SizingRequest {
                    beta,
                    spread_std: latest.spread_std,
                    price_y: signal.price_y,
                    price_x: signal.price_x,
                    adv_y_usd,
                    adv_x_usd,
                    capital: None,
                })
            });
            outcome.confidence = signal.zscore.map(|z| {
                confidence_score(z, cointegration.adf_pvalue, cointegration.half_life)
            });
        } else {
            tracing::debug!(pair = %pair, "No signal");
        }

        outcome.signal = Some(signal);
        outcome.cointegration = Some(cointegration);
        outcome
    }
}
