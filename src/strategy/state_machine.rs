//! Signal State Machine
//!
//! Turns a z-score stream into discrete trading signals for one pair.
//!
//! Transition table (crossing entry mode):
//! - z undefined            -> NoAction, nothing changes
//! - Neutral, prev >= -z_in and z < -z_in -> EnterLong  (LongSpread)
//! - Neutral, prev <=  z_in and z >  z_in -> EnterShort (ShortSpread)
//! - In position, |z| > z_stop -> StopLoss (Neutral)
//! - In position, |z| < z_out  -> Exit     (Neutral)
//! - otherwise               -> NoAction
//!
//! `previous_zscore` is refreshed on every defined tick. Together with the
//! current state it is the only input to the next transition.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::signal::{PositionState, SignalKind, SignalRow, Tick, TradingSignal};
use crate::ports::state_store::{PersistedState, StateStore, StateStoreError};
use crate::strategy::params::{ConfigError, EntryMode, ThresholdConfig};

/// When the machine writes its snapshot to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistPolicy {
    /// Only on ticks that change the position state
    #[default]
    OnTransition,
    /// On every tick with a defined z-score
    EveryTick,
}

/// Read-only view of the current position
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionInfo {
    pub pair_id: String,
    pub state: PositionState,
    pub entry_zscore: Option<f64>,
    pub entry_timestamp: Option<DateTime<Utc>>,
    pub entry_beta: Option<f64>,
    pub previous_zscore: Option<f64>,
    /// Hours since entry, measured at the last processed tick
    pub hours_in_position: Option<f64>,
}

pub struct SignalStateMachine<S: StateStore> {
    config: ThresholdConfig,
    pair_id: String,
    store: S,
    policy: PersistPolicy,
    snapshot: PersistedState,
}

impl<S: StateStore> SignalStateMachine<S> {
    /// Validate thresholds and resume from the stored snapshot. A missing,
    /// unreadable or inconsistent snapshot starts the machine Neutral.
    pub fn new(
        config: ThresholdConfig,
        pair_id: impl Into<String>,
        store: S,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        let pair_id = pair_id.into();
        let snapshot = load_or_neutral(&store, &pair_id);
        Ok(Self {
            config,
            pair_id,
            store,
            policy: PersistPolicy::default(),
            snapshot,
        })
    }

    pub fn with_policy(mut self, policy: PersistPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn pair_id(&self) -> &str {
        &self.pair_id
    }

    pub fn config(&self) -> &ThresholdConfig {
        &self.config
    }

    pub fn current_state(&self) -> PositionState {
        self.snapshot.state
    }

    pub fn previous_zscore(&self) -> Option<f64> {
        self.snapshot.previous_zscore
    }

    pub fn snapshot(&self) -> PersistedState {
        self.snapshot.clone()
    }

    pub fn position_info(&self) -> PositionInfo {
        let hours_in_position = match (self.snapshot.entry_timestamp, self.snapshot.last_updated) {
            (Some(entry), Some(now)) => Some((now - entry).num_seconds() as f64 / 3600.0),
            _ => None,
        };
        PositionInfo {
            pair_id: self.pair_id.clone(),
            state: self.snapshot.state,
            entry_zscore: self.snapshot.entry_zscore,
            entry_timestamp: self.snapshot.entry_timestamp,
            entry_beta: self.snapshot.entry_beta,
            previous_zscore: self.snapshot.previous_zscore,
            hours_in_position,
        }
    }

    /// Seed the crossing reference when none is stored. Returns whether the
    /// seed was applied.
    pub fn seed_previous_zscore(&mut self, zscore: Option<f64>) -> bool {
        match zscore {
            Some(z) if z.is_finite() && self.snapshot.previous_zscore.is_none() => {
                self.snapshot.previous_zscore = Some(z);
                tracing::debug!(pair = %self.pair_id, zscore = z, "Seeded previous z-score");
                true
            }
            _ => false,
        }
    }

    /// Write the current snapshot regardless of policy
    pub fn checkpoint(&self) -> Result<(), StateStoreError> {
        self.store.save(&self.pair_id, &self.snapshot)?;
        tracing::debug!(pair = %self.pair_id, state = %self.snapshot.state, "State saved");
        Ok(())
    }

    /// Force Neutral, forget entry data and the crossing reference
    pub fn reset(&mut self) -> Result<(), StateStoreError> {
        self.snapshot = PersistedState::neutral();
        tracing::info!(pair = %self.pair_id, "State reset to neutral");
        self.checkpoint()
    }

    /// Evaluate one tick
    pub fn process_tick(&mut self, tick: &Tick) -> TradingSignal {
        let previous_state = self.snapshot.state;

        let Some(z) = tick.zscore.filter(|z| z.is_finite()) else {
            return self.signal(tick, SignalKind::NoAction, "Z-score undefined".to_string(), previous_state);
        };

        let (kind, reason) = self.evaluate(z);
        match kind {
            SignalKind::EnterLong | SignalKind::EnterShort => {
                self.snapshot.state = if kind == SignalKind::EnterLong {
                    PositionState::LongSpread
                } else {
                    PositionState::ShortSpread
                };
                self.snapshot.entry_zscore = Some(z);
                self.snapshot.entry_timestamp = Some(tick.timestamp);
                self.snapshot.entry_beta = tick.beta;
            }
            SignalKind::Exit | SignalKind::StopLoss => {
                self.snapshot.state = PositionState::Neutral;
                self.snapshot.entry_zscore = None;
                self.snapshot.entry_timestamp = None;
                self.snapshot.entry_beta = None;
            }
            SignalKind::NoAction => {}
        }
        self.snapshot.previous_zscore = Some(z);
        self.snapshot.last_updated = Some(tick.timestamp);

        let changed = previous_state != self.snapshot.state;
        if changed || self.policy == PersistPolicy::EveryTick {
            if let Err(e) = self.checkpoint() {
                tracing::error!(pair = %self.pair_id, error = %e, "Failed to persist state");
            }
        }

        let signal = self.signal(tick, kind, reason, previous_state);
        if kind.is_actionable() {
            tracing::info!(
                pair = %self.pair_id,
                signal = %kind,
                zscore = z,
                from = %previous_state,
                to = %signal.new_state,
                "{}",
                signal.reason
            );
        }
        signal
    }

    /// One signal per row, NoAction included
    pub fn process_series(&mut self, rows: &[SignalRow]) -> Vec<TradingSignal> {
        rows.iter().map(|row| self.process_tick(&row.to_tick())).collect()
    }

    fn evaluate(&self, z: f64) -> (SignalKind, String) {
        let ThresholdConfig {
            z_in, z_out, z_stop, ..
        } = self.config;

        match self.snapshot.state {
            PositionState::Neutral => match self.config.entry_mode {
                EntryMode::Crossing => match self.snapshot.previous_zscore {
                    None => (
                        SignalKind::NoAction,
                        "No previous z-score for crossing detection".to_string(),
                    ),
                    Some(prev) if prev >= -z_in && z < -z_in => (
                        SignalKind::EnterLong,
                        format!("Z-score crossed below -{:.2} ({:.2} -> {:.2})", z_in, prev, z),
                    ),
                    Some(prev) if prev <= z_in && z > z_in => (
                        SignalKind::EnterShort,
                        format!("Z-score crossed above {:.2} ({:.2} -> {:.2})", z_in, prev, z),
                    ),
                    Some(_) => (
                        SignalKind::NoAction,
                        format!("No entry crossing (z = {:.2})", z),
                    ),
                },
                EntryMode::Level => {
                    if z <= -z_in {
                        (
                            SignalKind::EnterLong,
                            format!("Z-score {:.2} at or below -{:.2}", z, z_in),
                        )
                    } else if z >= z_in {
                        (
                            SignalKind::EnterShort,
                            format!("Z-score {:.2} at or above {:.2}", z, z_in),
                        )
                    } else {
                        (SignalKind::NoAction, format!("Z-score {:.2} inside entry band", z))
                    }
                }
            },
            PositionState::LongSpread | PositionState::ShortSpread => {
                if z.abs() > z_stop {
                    (
                        SignalKind::StopLoss,
                        format!("Stop loss: |z| = {:.2} > {:.2}", z.abs(), z_stop),
                    )
                } else if z.abs() < z_out {
                    (
                        SignalKind::Exit,
                        format!("Mean reversion: |z| = {:.2} < {:.2}", z.abs(), z_out),
                    )
                } else {
                    (
                        SignalKind::NoAction,
                        format!("Holding {} (z = {:.2})", self.snapshot.state, z),
                    )
                }
            }
        }
    }

    fn signal(
        &self,
        tick: &Tick,
        kind: SignalKind,
        reason: String,
        previous_state: PositionState,
    ) -> TradingSignal {
        TradingSignal {
            timestamp: tick.timestamp,
            kind,
            zscore: tick.zscore,
            beta: tick.beta,
            spread: tick.spread,
            reason,
            price_y: tick.price_y,
            price_x: tick.price_x,
            previous_state,
            new_state: self.snapshot.state,
        }
    }
}

fn load_or_neutral<S: StateStore>(store: &S, pair_id: &str) -> PersistedState {
    match store.load(pair_id) {
        Ok(Some(snapshot)) => match snapshot.validate() {
            Ok(()) => {
                tracing::info!(
                    pair = %pair_id,
                    state = %snapshot.state,
                    previous_zscore = ?snapshot.previous_zscore,
                    "State loaded"
                );
                snapshot
            }
            Err(e) => {
                tracing::warn!(pair = %pair_id, error = %e, "Inconsistent state snapshot, starting neutral");
                PersistedState::neutral()
            }
        },
        Ok(None) => PersistedState::neutral(),
        Err(e) => {
            tracing::warn!(pair = %pair_id, error = %e, "Could not load state, starting neutral");
            PersistedState::neutral()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::state_store::{InMemoryStateStore, MockStateStore};
    use chrono::{Duration, TimeZone};

    fn tick(i: i64, z: Option<f64>) -> Tick {
        Tick {
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i),
            zscore: z,
            beta: Some(1.1),
            spread: z.map(|z| z * 0.01),
            price_y: 100.0,
            price_x: 50.0,
        }
    }

    fn machine(store: &InMemoryStateStore) -> SignalStateMachine<&InMemoryStateStore> {
        SignalStateMachine::new(ThresholdConfig::default(), "btc_eth", store).unwrap()
    }

    fn run(m: &mut SignalStateMachine<&InMemoryStateStore>, zs: &[Option<f64>]) -> Vec<SignalKind> {
        zs.iter()
            .enumerate()
            .map(|(i, z)| m.process_tick(&tick(i as i64, *z)).kind)
            .collect()
    }

    #[test]
    fn test_reference_path() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        let kinds = run(
            &mut m,
            &[Some(1.0), Some(1.9), Some(2.1), Some(1.4), Some(0.4), Some(-0.1)],
        );
        assert_eq!(
            kinds,
            vec![
                SignalKind::NoAction,
                SignalKind::NoAction,
                SignalKind::EnterShort,
                SignalKind::NoAction,
                SignalKind::Exit,
                SignalKind::NoAction,
            ]
        );
        assert_eq!(m.current_state(), PositionState::Neutral);
    }

    #[test]
    fn test_no_reentry_while_hovering() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        let zs: Vec<Option<f64>> = [0.0, 1.0, 2.2, 2.5, 2.6, 2.4, 2.3, 2.8, 1.0]
            .iter()
            .copied()
            .map(Some)
            .collect();
        let kinds = run(&mut m, &zs);
        let entries = kinds.iter().filter(|k| k.is_entry()).count();
        assert_eq!(entries, 1);
        assert_eq!(kinds[2], SignalKind::EnterShort);
    }

    #[test]
    fn test_level_above_threshold_without_crossing_does_not_enter() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        // first tick has no reference, second is already beyond the band
        let kinds = run(&mut m, &[Some(2.5), Some(2.6)]);
        assert_eq!(kinds, vec![SignalKind::NoAction, SignalKind::NoAction]);
    }

    #[test]
    fn test_enter_long_on_downward_crossing() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        let kinds = run(&mut m, &[Some(-1.5), Some(-2.3)]);
        assert_eq!(kinds[1], SignalKind::EnterLong);
        let info = m.position_info();
        assert_eq!(info.state, PositionState::LongSpread);
        assert_eq!(info.entry_zscore, Some(-2.3));
        assert_eq!(info.entry_beta, Some(1.1));
        assert_eq!(info.hours_in_position, Some(0.0));
    }

    #[test]
    fn test_stop_dominates_exit() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        let kinds = run(&mut m, &[Some(1.0), Some(2.1), Some(3.6)]);
        assert_eq!(kinds[2], SignalKind::StopLoss);
        assert_eq!(m.current_state(), PositionState::Neutral);
        assert!(m.snapshot().entry_zscore.is_none());
    }

    #[test]
    fn test_undefined_z_keeps_previous() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        run(&mut m, &[Some(1.5)]);
        let signal = m.process_tick(&tick(1, None));
        assert_eq!(signal.kind, SignalKind::NoAction);
        assert_eq!(m.previous_zscore(), Some(1.5));
        // crossing measured against 1.5, not the gap
        assert_eq!(m.process_tick(&tick(2, Some(2.2))).kind, SignalKind::EnterShort);
    }

    #[test]
    fn test_level_mode_enters_without_crossing() {
        let store = InMemoryStateStore::new();
        let config = ThresholdConfig::default().with_entry_mode(EntryMode::Level);
        let mut m = SignalStateMachine::new(config, "p", &store).unwrap();
        assert_eq!(m.process_tick(&tick(0, Some(-2.5))).kind, SignalKind::EnterLong);
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let store = InMemoryStateStore::new();
        let config = ThresholdConfig::new(2.0, 2.5, 3.5);
        assert!(SignalStateMachine::new(config, "p", &store).is_err());
    }

    #[test]
    fn test_state_survives_restart() {
        let store = InMemoryStateStore::new();
        {
            let mut m = machine(&store);
            run(&mut m, &[Some(1.0), Some(2.4)]);
        }
        let resumed = machine(&store);
        assert_eq!(resumed.current_state(), PositionState::ShortSpread);
        assert_eq!(resumed.snapshot().entry_zscore, Some(2.4));
        assert_eq!(resumed.previous_zscore(), Some(2.4));
    }

    #[test]
    fn test_corrupted_snapshot_fails_closed() {
        let store = InMemoryStateStore::new();
        let bad = PersistedState {
            state: PositionState::LongSpread,
            ..PersistedState::default()
        };
        store.save("btc_eth", &bad).unwrap();
        let m = machine(&store);
        assert_eq!(m.current_state(), PositionState::Neutral);
    }

    #[test]
    fn test_load_error_fails_closed() {
        let mut store = MockStateStore::new();
        store
            .expect_load()
            .returning(|_| Err(StateStoreError::Corrupted("truncated".into())));
        let m = SignalStateMachine::new(ThresholdConfig::default(), "p", store).unwrap();
        assert_eq!(m.current_state(), PositionState::Neutral);
        assert_eq!(m.previous_zscore(), None);
    }

    #[test]
    fn test_writes_only_on_transitions() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Ok(None));
        // EnterShort and Exit
        store.expect_save().times(2).returning(|_, _| Ok(()));
        let mut m = SignalStateMachine::new(ThresholdConfig::default(), "p", store).unwrap();
        for (i, z) in [1.0, 1.9, 2.1, 1.4, 0.4, -0.1].iter().enumerate() {
            m.process_tick(&tick(i as i64, Some(*z)));
        }
    }

    #[test]
    fn test_every_tick_policy_writes_each_defined_tick() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Ok(None));
        store.expect_save().times(3).returning(|_, _| Ok(()));
        let mut m = SignalStateMachine::new(ThresholdConfig::default(), "p", store)
            .unwrap()
            .with_policy(PersistPolicy::EveryTick);
        for (i, z) in [Some(0.5), None, Some(0.7), Some(0.9)].iter().enumerate() {
            m.process_tick(&tick(i as i64, *z));
        }
    }

    #[test]
    fn test_save_failure_does_not_abort_tick() {
        let mut store = MockStateStore::new();
        store.expect_load().returning(|_| Ok(None));
        store
            .expect_save()
            .returning(|_, _| Err(StateStoreError::Serialization("disk full".into())));
        let mut m = SignalStateMachine::new(ThresholdConfig::default(), "p", store).unwrap();
        m.process_tick(&tick(0, Some(1.0)));
        let signal = m.process_tick(&tick(1, Some(2.5)));
        assert_eq!(signal.kind, SignalKind::EnterShort);
        assert_eq!(m.current_state(), PositionState::ShortSpread);
    }

    #[test]
    fn test_seed_only_when_empty() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        assert!(m.seed_previous_zscore(Some(1.8)));
        assert!(!m.seed_previous_zscore(Some(0.0)));
        assert_eq!(m.process_tick(&tick(0, Some(2.1))).kind, SignalKind::EnterShort);
    }

    #[test]
    fn test_reset_clears_everything() {
        let store = InMemoryStateStore::new();
        let mut m = machine(&store);
        run(&mut m, &[Some(1.0), Some(2.4)]);
        m.reset().unwrap();
        assert_eq!(m.current_state(), PositionState::Neutral);
        assert_eq!(m.previous_zscore(), None);
        assert_eq!(store.load("btc_eth").unwrap(), Some(PersistedState::neutral()));
    }
}
