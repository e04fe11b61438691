//! Pairs Engine - command-line entry point
//!
//! Scans configured pairs for signals, backtests them and manages the
//! persisted per-pair state.

use anyhow::{bail, Context, Result};
use std::fs::File;
use std::path::Path;
use tracing_subscriber::{fmt, EnvFilter};

use pairs_engine::adapters::cli::{
    self, BacktestCmd, CointCmd, Command, MultiBacktestCmd, ResetStateCmd, ScanCmd,
};
use pairs_engine::adapters::{load_price_history, JsonFileStateStore};
use pairs_engine::application::{
    backtest_pair, run_multi_backtest, write_summary_csv, BacktestWindow, PairScanner, ScanOutcome,
    ScanStatus,
};
use pairs_engine::backtest::PerformanceMetrics;
use pairs_engine::config::{load_config, AppConfig, PairSection};
use pairs_engine::strategy::{CointegrationValidator, EntryMode, SignalStateMachine};

const SUMMARY_FILE: &str = "multi_backtest_summary.csv";

fn main() -> Result<()> {
    let app = cli::init();

    let config_path = match &app.command {
        Command::Scan(cmd) => &cmd.config,
        Command::Backtest(cmd) => &cmd.config,
        Command::MultiBacktest(cmd) => &cmd.config,
        Command::Coint(cmd) => &cmd.config,
        Command::ResetState(cmd) => &cmd.config,
    };
    let config = load_config(config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path.display()))?;

    init_logging(app.verbose, app.debug, app.json_logs, &config)?;

    match app.command {
        Command::Scan(cmd) => scan_command(config, cmd),
        Command::Backtest(cmd) => backtest_command(config, cmd),
        Command::MultiBacktest(cmd) => multi_backtest_command(config, cmd),
        Command::Coint(cmd) => coint_command(config, cmd),
        Command::ResetState(cmd) => reset_state_command(config, cmd),
    }
}

/// Flags win over the config file; RUST_LOG wins over both
fn init_logging(verbose: bool, debug: bool, json_logs: bool, config: &AppConfig) -> Result<()> {
    let level = if debug {
        "debug"
    } else if verbose {
        "info"
    } else {
        config.logging.level.as_str()
    };
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level))
        .with_context(|| format!("Invalid log level: {level}"))?;

    if json_logs || config.logging.json {
        fmt().with_env_filter(filter).json().init();
    } else {
        fmt().with_env_filter(filter).with_target(false).init();
    }
    Ok(())
}

fn find_pair<'a>(config: &'a AppConfig, name: &str) -> Result<&'a PairSection> {
    config
        .pair(name)
        .with_context(|| format!("Unknown pair: {name}"))
}

fn selected_pairs<'a>(config: &'a AppConfig, name: Option<&str>) -> Result<Vec<&'a PairSection>> {
    match name {
        Some(name) => Ok(vec![find_pair(config, name)?]),
        None => Ok(config.enabled_pairs().collect()),
    }
}

fn scan_command(mut config: AppConfig, cmd: ScanCmd) -> Result<()> {
    if cmd.level_trigger {
        config.thresholds.entry_mode = EntryMode::Level;
    }
    if cmd.ignore_adv {
        config.filters.bypass_adv = true;
    }

    let store = JsonFileStateStore::new(&config.state.dir);
    let scanner = PairScanner::new(&config, store).context("Invalid strategy configuration")?;
    let pairs = selected_pairs(&config, cmd.pair.as_deref())?;
    let outcomes = scanner.scan_files(pairs);

    if cmd.json {
        println!("{}", serde_json::to_string_pretty(&outcomes)?);
        return Ok(());
    }

    println!(
        "{:<16} {:<18} {:<14} {:>8} {:<20} {:>6} {:>12}",
        "PAIR", "STATUS", "STATE", "Z", "SIGNAL", "CONF", "NOTIONAL"
    );
    for outcome in &outcomes {
        print_outcome(outcome);
    }
    let signals = outcomes.iter().filter(|o| o.is_actionable()).count();
    println!("\nSignals this run: {signals}");
    Ok(())
}

fn print_outcome(outcome: &ScanOutcome) {
    let status = match &outcome.status {
        ScanStatus::Signal => "signal".to_string(),
        ScanStatus::NoSignal => "no signal".to_string(),
        ScanStatus::AdvFiltered => "adv filtered".to_string(),
        ScanStatus::NotCointegrated => "not cointegrated".to_string(),
        ScanStatus::NoData => "no data".to_string(),
        ScanStatus::Failed(_) => "failed".to_string(),
    };
    let z = outcome
        .signal
        .as_ref()
        .and_then(|s| s.zscore)
        .map(|z| format!("{z:.3}"))
        .unwrap_or_else(|| "-".to_string());
    let kind = outcome
        .signal
        .as_ref()
        .map(|s| s.kind.to_string())
        .unwrap_or_else(|| "-".to_string());
    let confidence = outcome
        .confidence
        .map(|c| format!("{c:.0}"))
        .unwrap_or_else(|| "-".to_string());
    let notional = outcome
        .position
        .map(|p| format!("{:.2}", p.total_notional))
        .unwrap_or_else(|| "-".to_string());

    println!(
        "{:<16} {:<18} {:<14} {:>8} {:<20} {:>6} {:>12}",
        outcome.pair,
        status,
        outcome.state.to_string(),
        z,
        kind,
        confidence,
        notional
    );
    if let ScanStatus::Failed(reason) = &outcome.status {
        println!("    error: {reason}");
    }
    if let (ScanStatus::NotCointegrated, Some(coint)) = (&outcome.status, &outcome.cointegration) {
        for reason in &coint.rejection_reasons {
            println!("    {reason}");
        }
    }
}

fn backtest_command(mut config: AppConfig, cmd: BacktestCmd) -> Result<()> {
    if let Some(capital) = cmd.capital {
        config.backtest.initial_capital = capital;
    }
    if let Some(z) = cmd.z_in {
        config.thresholds.z_in = z;
    }
    if let Some(z) = cmd.z_out {
        config.thresholds.z_out = z;
    }
    if let Some(z) = cmd.z_stop {
        config.thresholds.z_stop = z;
    }
    config.validate().context("Invalid backtest overrides")?;

    let pair = find_pair(&config, &cmd.pair)?;
    let y = load_price_history(&pair.y_file)
        .with_context(|| format!("Failed to load {}", pair.y_file.display()))?
        .series
        .between(cmd.start, cmd.end);
    let x = load_price_history(&pair.x_file)
        .with_context(|| format!("Failed to load {}", pair.x_file.display()))?
        .series
        .between(cmd.start, cmd.end);

    let run = backtest_pair(&config, &pair.name, &y, &x)
        .with_context(|| format!("Backtest failed for {}", pair.name))?;

    println!("Backtest: {} ({} / {})", pair.name, pair.asset_y, pair.asset_x);
    println!("  Bars: {}", run.summary.bars);
    println!(
        "  Thresholds: z_in={} z_out={} z_stop={}",
        config.thresholds.z_in, config.thresholds.z_out, config.thresholds.z_stop
    );
    println!(
        "  Cointegrated: {} (ADF p={:.4})",
        run.summary.is_cointegrated, run.summary.adf_pvalue
    );
    print_metrics(&run.report.metrics);

    if cmd.trades {
        println!("\nTrades:");
        for trade in &run.report.trades {
            println!(
                "  {} -> {}  {:<13} {:?}  z {:.2} -> {}  pnl {:>10.2}  ({} bars)",
                trade.entry_timestamp.format("%Y-%m-%d %H:%M"),
                trade.exit_timestamp.format("%Y-%m-%d %H:%M"),
                trade.direction.to_string(),
                trade.exit_reason,
                trade.entry_zscore,
                trade
                    .exit_zscore
                    .map(|z| format!("{z:.2}"))
                    .unwrap_or_else(|| "-".to_string()),
                trade.realized_pnl,
                trade.duration_bars
            );
        }
    }
    if let Some(open) = &run.report.open_trade {
        println!(
            "\nOpen position: {} since {} ({} bars, unrealized {:.2})",
            open.direction, open.entry_timestamp, open.bars_held, open.unrealized_pnl
        );
    }

    if let Some(path) = &cmd.export_csv {
        let mut writer = csv::Writer::from_path(path)
            .with_context(|| format!("Failed to create {}", path.display()))?;
        for bar in &run.report.bars {
            writer.serialize(bar)?;
        }
        writer.flush()?;
        println!("\nPer-bar P&L: {}", path.display());
    }
    if let Some(path) = &cmd.export_json {
        let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
        serde_json::to_writer_pretty(file, &run.report)?;
        println!("Report JSON: {}", path.display());
    }
    Ok(())
}

fn print_metrics(m: &PerformanceMetrics) {
    println!("\nPerformance:");
    println!("  Total return:      {:>10.2}%", m.total_return_pct);
    println!("  Annual return:     {:>10.2}%", m.annual_return_pct);
    println!("  Annual volatility: {:>10.2}%", m.annual_volatility_pct);
    println!("  Sharpe:            {:>10.2}", m.sharpe_ratio);
    println!("  Max drawdown:      {:>10.2}%", m.max_drawdown_pct);
    println!("  Trades:            {:>10}", m.n_trades);
    println!("  Win rate:          {:>10.1}%", m.win_rate_pct);
    println!("  Profit factor:     {:>10.2}", m.profit_factor);
    println!("  Payoff ratio:      {:>10.2}", m.payoff_ratio);
    println!("  Avg trade:         {:>10.2}", m.avg_trade_pnl_usd);
    println!("  Avg duration:      {:>10.1}h", m.avg_duration_hours);
    println!("  Final equity:      {:>10.2}", m.final_equity);
}

fn multi_backtest_command(config: AppConfig, cmd: MultiBacktestCmd) -> Result<()> {
    let window = BacktestWindow {
        start: cmd.start,
        end: cmd.end,
        limit: cmd.limit,
    };
    let result = run_multi_backtest(&config, &window);

    for (name, reason) in &result.skipped {
        println!("Skipped {name}: {reason}");
    }
    if result.summaries.is_empty() {
        bail!("No pairs produced backtestable signals");
    }

    std::fs::create_dir_all(&cmd.out_dir)
        .with_context(|| format!("Failed to create {}", cmd.out_dir.display()))?;
    let summary_path = cmd.out_dir.join(SUMMARY_FILE);
    write_summary_csv(&summary_path, &result.summaries)
        .with_context(|| format!("Failed to write {}", summary_path.display()))?;

    println!(
        "{:<16} {:>7} {:>10} {:>8} {:>8} {:>8}",
        "PAIR", "TRADES", "RETURN%", "SHARPE", "MAXDD%", "WIN%"
    );
    for s in &result.summaries {
        println!(
            "{:<16} {:>7} {:>10.2} {:>8.2} {:>8.2} {:>8.1}",
            s.pair, s.n_trades, s.total_return_pct, s.sharpe_ratio, s.max_drawdown_pct, s.win_rate_pct
        );
    }
    println!("\nSummary CSV: {}", summary_path.display());
    Ok(())
}

fn coint_command(config: AppConfig, cmd: CointCmd) -> Result<()> {
    let validator = CointegrationValidator::new(config.cointegration)
        .context("Invalid cointegration settings")?;
    let pairs = selected_pairs(&config, cmd.pair.as_deref())?;

    let mut results = Vec::new();
    for pair in pairs {
        let y = load_series(&pair.y_file)?;
        let x = load_series(&pair.x_file)?;
        results.push((pair.name.clone(), validator.test(&x, &y)));
    }

    if cmd.json {
        let mut map = serde_json::Map::new();
        for (name, r) in results {
            map.insert(name, serde_json::to_value(r)?);
        }
        println!("{}", serde_json::to_string_pretty(&map)?);
        return Ok(());
    }

    for (name, r) in &results {
        let verdict = if r.is_cointegrated { "PASS" } else { "FAIL" };
        println!("{name}: {verdict} ({} obs)", r.observations);
        println!("  ADF p-value:           {:.4}", r.adf_pvalue);
        println!("  Engle-Granger p-value: {:.4}", r.engle_granger_pvalue);
        if let Some(hr) = r.hedge_ratio {
            println!("  Hedge ratio:           {hr:.4}");
        }
        match r.half_life {
            Some(hl) => println!("  Half-life:             {hl:.2} bars"),
            None => println!("  Half-life:             -"),
        }
        if let Some(h) = r.hurst_exponent {
            println!("  Hurst exponent:        {h:.3}");
        }
        for reason in &r.rejection_reasons {
            println!("  - {reason}");
        }
    }
    Ok(())
}

fn load_series(path: &Path) -> Result<pairs_engine::domain::PriceSeries> {
    Ok(load_price_history(path)
        .with_context(|| format!("Failed to load {}", path.display()))?
        .series)
}

fn reset_state_command(config: AppConfig, cmd: ResetStateCmd) -> Result<()> {
    let store = JsonFileStateStore::new(&config.state.dir);
    let names: Vec<String> = if cmd.all {
        config.pairs.iter().map(|p| p.name.clone()).collect()
    } else {
        match cmd.pair {
            Some(name) => vec![find_pair(&config, &name)?.name.clone()],
            None => bail!("Specify --pair or --all"),
        }
    };

    for name in names {
        let mut machine = SignalStateMachine::new(config.thresholds, name.as_str(), &store)
            .context("Invalid thresholds")?;
        let was = machine.current_state();
        machine
            .reset()
            .with_context(|| format!("Failed to reset state for {name}"))?;
        println!("{name}: {was} -> neutral ({})", store.path_for(&name).display());
    }
    Ok(())
}
