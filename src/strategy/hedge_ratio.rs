//! Hedge Ratio Estimation
//!
//! Rolling simple regression of log(Y) on log(X):
//!   beta = Cov(x, y) / Var(x)    (sample moments, divisor window - 1)
//!
//! Every window is recomputed from scratch. No running sums are carried
//! between indices, so the value at index i depends only on the window
//! ending at i and is identical regardless of evaluation order.

use serde::{Deserialize, Serialize};

use crate::strategy::stats::{self, MIN_VARIANCE};

/// Per-window regression diagnostics
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BetaStats {
    pub beta: f64,
    pub intercept: f64,
    /// 0 when the window's y values have no variation
    pub r_squared: f64,
    /// Residual standard deviation (divisor window - 2)
    pub resid_std: f64,
}

/// Collect the window ending at `end` if every value in it is present
fn complete_window(values: &[Option<f64>], end: usize, window: usize) -> Option<Vec<f64>> {
    values[end + 1 - window..=end].iter().copied().collect()
}

/// Rolling hedge ratio. The first `window - 1` entries are always absent, as
/// is any window containing a missing value or with Var(x) < 1e-10.
pub fn rolling_beta(x: &[Option<f64>], y: &[Option<f64>], window: usize) -> Vec<Option<f64>> {
    let n = x.len();
    if window < 2 || y.len() != n {
        return vec![None; n.max(y.len())];
    }

    let mut betas = vec![None; n];
    for end in window - 1..n {
        let (Some(wx), Some(wy)) = (complete_window(x, end, window), complete_window(y, end, window))
        else {
            continue;
        };
        betas[end] = stats::ols_slope(&wx, &wy);
    }
    betas
}

/// Rolling regression with intercept, R-squared and residual dispersion.
/// Absent under the same conditions as `rolling_beta`; also absent when
/// `window < 3` since the residual std would be undefined.
pub fn rolling_beta_stats(
    x: &[Option<f64>],
    y: &[Option<f64>],
    window: usize,
) -> Vec<Option<BetaStats>> {
    let n = x.len();
    if window < 3 || y.len() != n {
        return vec![None; n.max(y.len())];
    }

    let mut out = vec![None; n];
    for end in window - 1..n {
        let (Some(wx), Some(wy)) = (complete_window(x, end, window), complete_window(y, end, window))
        else {
            continue;
        };
        out[end] = window_stats(&wx, &wy);
    }
    out
}

fn window_stats(x: &[f64], y: &[f64]) -> Option<BetaStats> {
    let beta = stats::ols_slope(x, y)?;
    let intercept = stats::mean(y) - beta * stats::mean(x);

    let ssr: f64 = x
        .iter()
        .zip(y)
        .map(|(xi, yi)| {
            let r = yi - (intercept + beta * xi);
            r * r
        })
        .sum();
    let y_mean = stats::mean(y);
    let tss: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - ssr / tss } else { 0.0 };
    let resid_std = (ssr / (x.len() - 2) as f64).sqrt();

    Some(BetaStats {
        beta,
        intercept,
        r_squared,
        resid_std,
    })
}

/// Single hedge ratio over the whole sample
pub fn static_hedge_ratio(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() {
        return None;
    }
    let var_x = stats::variance(x, 1);
    if !(var_x > MIN_VARIANCE) {
        return None;
    }
    stats::ols_slope(x, y)
}
