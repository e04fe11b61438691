//! Spread & Z-Score Engine
//!
//! Spread:  S_t = log(Y_t) - beta_t * log(X_t)
//! Z-score: z_t = (S_t - mean(S)) / std(S) over the trailing window
//!
//! Windows are positional over the aligned timeline. A window holding any
//! absent value produces an absent result, as does a zero standard
//! deviation. Nothing here ever yields NaN or infinity.

use serde::{Deserialize, Serialize};

use crate::domain::series::PriceSeries;
use crate::domain::signal::{SignalRow, SignalTable};
use crate::strategy::hedge_ratio::rolling_beta;
use crate::strategy::params::WindowConfig;
use crate::strategy::stats::{self, MIN_VARIANCE};

/// |z| above this counts toward `SignalQuality::outlier_pct`
const QUALITY_OUTLIER_Z: f64 = 3.0;
/// Rolling std at or below this is treated as zero
const MIN_STD: f64 = 1e-12;
/// Fewer defined z-scores than this leaves quality metrics absent
const MIN_QUALITY_SAMPLES: usize = 10;

/// Spread from log prices and a (possibly absent) hedge ratio
pub fn spread(log_y: &[f64], beta: &[Option<f64>], log_x: &[f64]) -> Vec<Option<f64>> {
    let n = log_y.len();
    if beta.len() != n || log_x.len() != n {
        return vec![None; n];
    }
    log_y
        .iter()
        .zip(beta)
        .zip(log_x)
        .map(|((ly, b), lx)| b.map(|b| ly - b * lx).filter(|s| s.is_finite()))
        .collect()
}

/// Rolling (mean, sample std) with minimum periods = `window`
pub fn rolling_mean_std(values: &[Option<f64>], window: usize) -> Vec<Option<(f64, f64)>> {
    let n = values.len();
    if window < 2 {
        return vec![None; n];
    }
    let mut out = vec![None; n];
    for end in window.saturating_sub(1)..n {
        let slice: Option<Vec<f64>> = values[end + 1 - window..=end].iter().copied().collect();
        if let Some(slice) = slice {
            out[end] = Some((stats::mean(&slice), stats::sample_std(&slice)));
        }
    }
    out
}

/// Rolling z-score of the spread
pub fn zscore(spread: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    rolling_mean_std(spread, window)
        .into_iter()
        .zip(spread)
        .map(|(moments, s)| {
            let (mean, std) = moments?;
            let s = (*s)?;
            if !(std > MIN_STD) {
                return None;
            }
            let z = (s - mean) / std;
            z.is_finite().then_some(z)
        })
        .collect()
}

/// Align the two legs and derive beta, spread, rolling moments and z-score
/// for every shared timestamp.
pub fn calculate_all_signals(y: &PriceSeries, x: &PriceSeries, windows: &WindowConfig) -> SignalTable {
    let aligned = y.align(x);
    let log_y: Vec<f64> = aligned.left.iter().map(|p| p.ln()).collect();
    let log_x: Vec<f64> = aligned.right.iter().map(|p| p.ln()).collect();

    let log_y_opt: Vec<Option<f64>> = log_y.iter().copied().map(Some).collect();
    let log_x_opt: Vec<Option<f64>> = log_x.iter().copied().map(Some).collect();

    let betas = rolling_beta(&log_x_opt, &log_y_opt, windows.beta_window);
    let spreads = spread(&log_y, &betas, &log_x);
    let moments = rolling_mean_std(&spreads, windows.zscore_window);
    let zscores = zscore(&spreads, windows.zscore_window);

    let rows = (0..aligned.len())
        .map(|i| SignalRow {
            timestamp: aligned.timestamps[i],
            price_y: aligned.left[i],
            price_x: aligned.right[i],
            beta: betas[i],
            spread: spreads[i],
            spread_mean: moments[i].map(|(m, _)| m),
            spread_std: moments[i].map(|(_, s)| s),
            zscore: zscores[i],
        })
        .collect();

    tracing::debug!(
        rows = aligned.len(),
        beta_window = windows.beta_window,
        zscore_window = windows.zscore_window,
        "Calculated pair signals"
    );

    SignalTable { rows }
}

/// Half-life from regressing dS on lagged S (with intercept).
/// Absent when the slope is non-negative.
pub fn spread_half_life(spread: &[Option<f64>]) -> Option<f64> {
    let mut lagged = Vec::new();
    let mut diffs = Vec::new();
    for w in spread.windows(2) {
        if let (Some(prev), Some(cur)) = (w[0], w[1]) {
            lagged.push(prev);
            diffs.push(cur - prev);
        }
    }
    if lagged.len() < 2 {
        return None;
    }
    let lambda = stats::ols_slope(&lagged, &diffs)?;
    (lambda < 0.0).then(|| -std::f64::consts::LN_2 / lambda)
}

/// Rolling Pearson correlation
pub fn rolling_correlation(a: &[Option<f64>], b: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = a.len();
    if window < 2 || b.len() != n {
        return vec![None; n.max(b.len())];
    }
    let mut out = vec![None; n];
    for end in window - 1..n {
        let wa: Option<Vec<f64>> = a[end + 1 - window..=end].iter().copied().collect();
        let wb: Option<Vec<f64>> = b[end + 1 - window..=end].iter().copied().collect();
        if let (Some(wa), Some(wb)) = (wa, wb) {
            let denom = (stats::variance(&wa, 1) * stats::variance(&wb, 1)).sqrt();
            if denom > MIN_VARIANCE {
                out[end] = Some(stats::covariance(&wa, &wb, 1) / denom);
            }
        }
    }
    out
}

/// Flags |z| > threshold; absent z-scores are never outliers
pub fn outliers(zscores: &[Option<f64>], threshold: f64) -> Vec<bool> {
    zscores
        .iter()
        .map(|z| z.map_or(false, |z| z.abs() > threshold))
        .collect()
}

fn sign(v: f64) -> i8 {
    if v > 0.0 {
        1
    } else if v < 0.0 {
        -1
    } else {
        0
    }
}

/// Diagnostics over the most recent rows of a signal table
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SignalQuality {
    pub mean_zscore: Option<f64>,
    pub std_zscore: Option<f64>,
    pub spread_half_life: Option<f64>,
    /// Sign changes of the z-score
    pub zero_crossings: usize,
    /// Percentage of |z| > 3
    pub outlier_pct: f64,
    /// Sample std of beta across the lookback
    pub beta_stability: Option<f64>,
}

pub fn signal_quality(table: &SignalTable, lookback: usize) -> SignalQuality {
    let start = table.rows.len().saturating_sub(lookback);
    let recent = &table.rows[start..];

    let zs: Vec<f64> = recent.iter().filter_map(|r| r.zscore).collect();
    if zs.len() < MIN_QUALITY_SAMPLES {
        return SignalQuality::default();
    }

    let spreads: Vec<Option<f64>> = recent.iter().filter_map(|r| r.spread).map(Some).collect();
    let betas: Vec<f64> = recent.iter().filter_map(|r| r.beta).collect();

    let zero_crossings = zs
        .windows(2)
        .filter(|w| sign(w[0]) != sign(w[1]))
        .count();
    let outlier_count = zs.iter().filter(|z| z.abs() > QUALITY_OUTLIER_Z).count();

    SignalQuality {
        mean_zscore: Some(stats::mean(&zs)),
        std_zscore: Some(stats::sample_std(&zs)),
        spread_half_life: spread_half_life(&spreads),
        zero_crossings,
        outlier_pct: outlier_count as f64 / zs.len() as f64 * 100.0,
        beta_stability: (betas.len() >= 2).then(|| stats::sample_std(&betas)),
    }
}
