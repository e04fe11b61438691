//! Pairs Pipeline Integration Tests
//!
//! Exercises the components together the way the scanner and backtester
//! use them:
//! 1. Price series -> signal table -> state machine (live and batch paths)
//! 2. Cointegration gate on synthetic cointegrated / independent series
//! 3. Backtest execution timing and sizing edge cases
//! 4. Persisted state through the JSON file store
//!
//! All data is synthetic and seeded; nothing touches the network.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};

use pairs_engine::adapters::JsonFileStateStore;
use pairs_engine::application::PairScanner;
use pairs_engine::backtest::BacktestSimulator;
use pairs_engine::config::AppConfig;
use pairs_engine::domain::{PositionState, PriceHistory, PriceSeries, SignalKind, SignalRow, Tick};
use pairs_engine::ports::{InMemoryStateStore, StateStore};
use pairs_engine::strategy::{
    calculate_all_signals, BacktestConfig, CointegrationConfig, CointegrationValidator,
    CostConfig, PositionSizer, SignalStateMachine, SizingConfig, SizingRequest, ThresholdConfig,
    WindowConfig,
};

// ============================================================================
// Test Fixtures
// ============================================================================

fn ts(i: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(i)
}

fn series(values: Vec<f64>) -> PriceSeries {
    let stamps = (0..values.len() as i64).map(ts).collect();
    PriceSeries::from_parts(stamps, values).unwrap()
}

/// X is a random walk around 1000, Y = 10 + 1.5 X + AR(1) noise
fn cointegrated_prices(n: usize, seed: u64) -> (PriceSeries, PriceSeries) {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut level = 1_000.0;
    let mut noise = 0.0;
    let mut x = Vec::with_capacity(n);
    let mut y = Vec::with_capacity(n);
    for _ in 0..n {
        level += normal.sample(&mut rng);
        noise = 0.7 * noise + normal.sample(&mut rng);
        x.push(level);
        y.push(10.0 + 1.5 * level + noise);
    }
    (series(x), series(y))
}

fn random_walk(n: usize, seed: u64) -> PriceSeries {
    let mut rng = StdRng::seed_from_u64(seed);
    let normal = Normal::new(0.0, 1.0).unwrap();
    let mut level = 1_000.0;
    let values = (0..n)
        .map(|_| {
            level += normal.sample(&mut rng);
            level
        })
        .collect();
    series(values)
}

fn z_rows(zscores: &[Option<f64>]) -> Vec<SignalRow> {
    zscores
        .iter()
        .enumerate()
        .map(|(i, z)| SignalRow {
            timestamp: ts(i as i64),
            price_y: 100.0 + i as f64,
            price_x: 50.0,
            beta: Some(1.0),
            spread: *z,
            spread_mean: Some(0.0),
            spread_std: Some(0.01),
            zscore: *z,
        })
        .collect()
}

fn thresholds() -> ThresholdConfig {
    ThresholdConfig::new(2.0, 0.5, 3.5)
}

const REFERENCE_PATH: [f64; 6] = [1.0, 1.9, 2.1, 1.4, 0.4, -0.1];

// ============================================================================
// Signal path
// ============================================================================

#[test]
fn test_reference_path_signals() {
    let rows = z_rows(&REFERENCE_PATH.map(Some));
    let mut machine = SignalStateMachine::new(thresholds(), "ref", InMemoryStateStore::new()).unwrap();
    let kinds: Vec<SignalKind> = machine.process_series(&rows).iter().map(|s| s.kind).collect();

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
    assert_eq!(machine.current_state(), PositionState::Neutral);
}

#[test]
fn test_tick_by_tick_with_reload_matches_batch() {
    let path = [
        Some(0.3),
        Some(1.2),
        None,
        Some(2.4),
        Some(2.6),
        Some(3.0),
        Some(1.1),
        Some(0.2),
        Some(-1.5),
        Some(-2.2),
        None,
        Some(-2.9),
        Some(-3.8),
        Some(-1.0),
        Some(-2.5),
        Some(-0.3),
    ];
    let rows = z_rows(&path);

    let mut batch = SignalStateMachine::new(thresholds(), "eq", InMemoryStateStore::new()).unwrap();
    let expected: Vec<SignalKind> = batch.process_series(&rows).iter().map(|s| s.kind).collect();

    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStateStore::new(dir.path());
    let mut live = Vec::new();
    for row in &rows {
        // fresh machine each tick: everything it knows comes from disk
        let mut machine = SignalStateMachine::new(thresholds(), "eq", &store).unwrap();
        live.push(machine.process_tick(&row.to_tick()).kind);
        machine.checkpoint().unwrap();
    }

    assert_eq!(live, expected);
    assert!(expected.contains(&SignalKind::EnterShort));
    assert!(expected.contains(&SignalKind::StopLoss));
}

#[test]
fn test_hovering_above_entry_does_not_reenter() {
    let mut path = vec![Some(0.0), Some(1.0), Some(2.2)];
    path.extend([Some(2.5), Some(2.8), Some(2.3), Some(2.9), Some(2.4)]);
    path.push(Some(1.0));
    let rows = z_rows(&path);

    let mut machine = SignalStateMachine::new(thresholds(), "hover", InMemoryStateStore::new()).unwrap();
    let entries = machine
        .process_series(&rows)
        .iter()
        .filter(|s| s.kind.is_entry())
        .count();
    assert_eq!(entries, 1);
}

#[test]
fn test_persisted_state_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStateStore::new(dir.path());

    let mut first = SignalStateMachine::new(thresholds(), "ETH/BTC", &store).unwrap();
    for z in [1.5, -2.3] {
        first.process_tick(&Tick {
            timestamp: ts(0),
            zscore: Some(z),
            beta: Some(0.8),
            spread: Some(z * 0.01),
            price_y: 2_000.0,
            price_x: 40_000.0,
        });
    }
    assert_eq!(first.current_state(), PositionState::LongSpread);

    let second = SignalStateMachine::new(thresholds(), "ETH/BTC", &store).unwrap();
    let before = first.position_info();
    let after = second.position_info();
    assert_eq!(after.state, before.state);
    assert_eq!(after.entry_zscore, Some(-2.3));
    assert_eq!(after.entry_timestamp, before.entry_timestamp);
    assert_eq!(after.entry_beta, Some(0.8));
    assert_eq!(after.previous_zscore, Some(-2.3));
}

#[test]
fn test_corrupted_state_file_starts_neutral() {
    let dir = tempfile::tempdir().unwrap();
    let store = JsonFileStateStore::new(dir.path());
    std::fs::write(store.path_for("bad"), "{ not json").unwrap();

    let machine = SignalStateMachine::new(thresholds(), "bad", &store).unwrap();
    assert_eq!(machine.current_state(), PositionState::Neutral);
    assert!(machine.previous_zscore().is_none());
}

// ============================================================================
// Spread engine
// ============================================================================

#[test]
fn test_zscore_invariant_to_scaling_dependent_leg() {
    let (x, y) = cointegrated_prices(120, 3);
    let scaled_y = series(y.prices().iter().map(|p| p * 5.0).collect());
    let windows = WindowConfig {
        beta_window: 30,
        zscore_window: 20,
    };

    let base = calculate_all_signals(&y, &x, &windows);
    let scaled = calculate_all_signals(&scaled_y, &x, &windows);

    assert_eq!(base.defined_zscores(), scaled.defined_zscores());
    assert!(base.defined_zscores() > 0);
    for (a, b) in base.rows.iter().zip(&scaled.rows) {
        match (a.zscore, b.zscore) {
            (Some(za), Some(zb)) => assert_relative_eq!(za, zb, epsilon = 1e-6),
            (None, None) => {}
            other => panic!("definedness differs: {other:?}"),
        }
        if let (Some(ba), Some(bb)) = (a.beta, b.beta) {
            assert_relative_eq!(ba, bb, epsilon = 1e-9);
        }
    }
}

#[test]
fn test_signal_table_warmup_is_absent() {
    let (x, y) = cointegrated_prices(60, 4);
    let windows = WindowConfig {
        beta_window: 10,
        zscore_window: 5,
    };
    let table = calculate_all_signals(&y, &x, &windows);
    assert_eq!(table.len(), 60);
    assert!(table.rows[..9].iter().all(|r| r.beta.is_none()));
    assert!(table.rows[9].beta.is_some());
    // z needs zscore_window defined spreads
    assert!(table.rows[..13].iter().all(|r| r.zscore.is_none()));
    assert!(table.rows[13].zscore.is_some());
}

// ============================================================================
// Cointegration gate
// ============================================================================

#[test]
fn test_independent_random_walks_rejected() {
    let x = random_walk(500, 2024);
    let y = random_walk(500, 4048);
    let validator = CointegrationValidator::new(CointegrationConfig::default()).unwrap();

    let result = validator.test(&x, &y);
    assert!(!result.is_cointegrated);
    assert!(!result.rejection_reasons.is_empty());
}

#[test]
fn test_cointegrated_series_pass_and_are_deterministic() {
    let (x, y) = cointegrated_prices(500, 42);
    let validator = CointegrationValidator::new(CointegrationConfig::default()).unwrap();

    let first = validator.test(&x, &y);
    let second = validator.test(&x, &y);
    assert!(first.is_cointegrated, "reasons: {:?}", first.rejection_reasons);
    assert_eq!(first, second);
    assert_eq!(
        first.adf_statistic.map(f64::to_bits),
        second.adf_statistic.map(f64::to_bits)
    );
}

// ============================================================================
// Backtest & sizing
// ============================================================================

#[test]
fn test_backtest_has_no_lookahead() {
    // EnterShort fires at bar 2; Y rises every bar, X is flat
    let rows = z_rows(&[Some(1.0), Some(1.9), Some(2.1), Some(2.2), Some(2.4), Some(2.3)]);
    let simulator = BacktestSimulator::new(
        BacktestConfig::default(),
        SizingConfig::default(),
        CostConfig::zero(),
    )
    .unwrap();
    let report = simulator.run(&rows, &thresholds()).unwrap();

    assert_eq!(report.bars[2].position, PositionState::ShortSpread);
    assert_eq!(report.bars[2].gross_pnl, 0.0);
    assert!(report.bars[3].gross_pnl < 0.0, "short Y loses as Y rises");
    assert!(report.trades.is_empty());
    assert!(report.open_trade.is_some());
}

#[test]
fn test_zero_sigma_sizes_nothing() {
    let sizer = PositionSizer::new(SizingConfig::default(), CostConfig::default()).unwrap();
    for beta in [-2.0, 0.0, 0.7, 5.0] {
        let result = sizer.size(&SizingRequest {
            beta,
            spread_std: Some(0.0),
            price_y: 100.0,
            price_x: 20.0,
            ..Default::default()
        });
        assert!(result.is_zero());
        assert_eq!(result.leg_y_notional_usd, 0.0);
        assert_eq!(result.leg_x_notional_usd, 0.0);
    }
}

// ============================================================================
// Scanner over the file store
// ============================================================================

#[test]
fn test_scanner_writes_state_file() {
    let dir = tempfile::tempdir().unwrap();
    let (x, y) = cointegrated_prices(300, 42);

    let mut config = AppConfig::default();
    config.windows = WindowConfig {
        beta_window: 50,
        zscore_window: 30,
    };
    config.filters.bypass_adv = true;
    config.filters.require_cointegration = false;
    config.cointegration.lookback = 200;

    let store = JsonFileStateStore::new(dir.path().join("state"));
    let scanner = PairScanner::new(&config, store).unwrap();
    let outcome = scanner.scan_pair(
        "SYN",
        &PriceHistory::new(y, None).unwrap(),
        &PriceHistory::new(x, None).unwrap(),
    );

    assert!(outcome.signal.is_some());
    assert!(outcome.cointegration.is_some());
    let stored = scanner.store().load("SYN").unwrap().unwrap();
    assert_eq!(stored.state, outcome.state);
    assert!(stored.previous_zscore.is_some());
}
