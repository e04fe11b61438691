//! Statistical Primitives
//!
//! Sample moments, ordinary least squares, the augmented Dickey-Fuller
//! unit-root test with AIC lag selection, and MacKinnon p-values.
//!
//! ADF regression (with constant):
//!   dy_t = a + g*y_{t-1} + sum_i c_i*dy_{t-i} + e_t
//! The test statistic is the t-value of g. Under H0 (unit root) its
//! distribution is non-standard; p-values use MacKinnon's (1994) response
//! surface, critical values MacKinnon's (2010) finite-sample table.

use nalgebra::{DMatrix, DVector};
use statrs::function::erf::erf;
use thiserror::Error;

/// Minimum variance treated as non-degenerate
pub const MIN_VARIANCE: f64 = 1e-10;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum StatsError {
    #[error("Insufficient observations: need {needed}, got {got}")]
    InsufficientData { needed: usize, got: usize },

    #[error("Singular regression matrix")]
    SingularMatrix,

    #[error("Non-finite value in {0}")]
    NonFinite(&'static str),
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Variance with divisor `n - ddof`
pub fn variance(values: &[f64], ddof: usize) -> f64 {
    if values.len() <= ddof {
        return f64::NAN;
    }
    let m = mean(values);
    values.iter().map(|v| (v - m) * (v - m)).sum::<f64>() / (values.len() - ddof) as f64
}

/// Sample standard deviation (divisor n - 1)
pub fn sample_std(values: &[f64]) -> f64 {
    variance(values, 1).sqrt()
}

/// Covariance with divisor `n - ddof`
pub fn covariance(x: &[f64], y: &[f64], ddof: usize) -> f64 {
    let n = x.len().min(y.len());
    if n <= ddof {
        return f64::NAN;
    }
    let mx = mean(&x[..n]);
    let my = mean(&y[..n]);
    x[..n]
        .iter()
        .zip(&y[..n])
        .map(|(a, b)| (a - mx) * (b - my))
        .sum::<f64>()
        / (n - ddof) as f64
}

/// Closed-form simple-regression slope Cov(x,y)/Var(x).
/// Absent when Var(x) is below `MIN_VARIANCE`.
pub fn ols_slope(x: &[f64], y: &[f64]) -> Option<f64> {
    if x.len() != y.len() || x.len() < 2 {
        return None;
    }
    let var_x = variance(x, 1);
    if !(var_x > MIN_VARIANCE) {
        return None;
    }
    let slope = covariance(x, y, 1) / var_x;
    slope.is_finite().then_some(slope)
}

/// Standard normal CDF
pub fn normal_cdf(z: f64) -> f64 {
    0.5 * (1.0 + erf(z / std::f64::consts::SQRT_2))
}

/// Fitted ordinary least squares model
#[derive(Debug, Clone, PartialEq)]
pub struct OlsFit {
    pub params: Vec<f64>,
    pub std_errors: Vec<f64>,
    /// Sum of squared residuals
    pub ssr: f64,
    pub nobs: usize,
    /// Centered R-squared
    pub r_squared: f64,
    pub residuals: Vec<f64>,
}

impl OlsFit {
    pub fn t_value(&self, index: usize) -> f64 {
        self.params[index] / self.std_errors[index]
    }

    /// Akaike information criterion under Gaussian errors
    pub fn aic(&self) -> f64 {
        let n = self.nobs as f64;
        let k = self.params.len() as f64;
        let llf = -n / 2.0 * ((2.0 * std::f64::consts::PI).ln() + (self.ssr / n).ln() + 1.0);
        -2.0 * llf + 2.0 * k
    }
}

/// OLS of `y` on the given regressor columns (add a column of ones for an
/// intercept).
pub fn ols(y: &[f64], columns: &[Vec<f64>]) -> Result<OlsFit, StatsError> {
    let n = y.len();
    let k = columns.len();
    if k == 0 || n <= k {
        return Err(StatsError::InsufficientData {
            needed: k + 1,
            got: n,
        });
    }
    if columns.iter().any(|c| c.len() != n) {
        return Err(StatsError::InsufficientData {
            needed: n,
            got: columns.iter().map(Vec::len).min().unwrap_or(0),
        });
    }
    if y.iter().chain(columns.iter().flatten()).any(|v| !v.is_finite()) {
        return Err(StatsError::NonFinite("regression input"));
    }

    let x = DMatrix::from_fn(n, k, |r, c| columns[c][r]);
    let y_vec = DVector::from_column_slice(y);

    let xtx = x.transpose() * &x;
    let xtx_inv = xtx.try_inverse().ok_or(StatsError::SingularMatrix)?;
    let beta = &xtx_inv * (x.transpose() * &y_vec);

    let fitted = &x * &beta;
    let residuals = &y_vec - fitted;
    let ssr: f64 = residuals.iter().map(|r| r * r).sum();
    let sigma2 = ssr / (n - k) as f64;

    let mut std_errors = Vec::with_capacity(k);
    for j in 0..k {
        let v = sigma2 * xtx_inv[(j, j)];
        if !(v.is_finite() && v >= 0.0) {
            return Err(StatsError::SingularMatrix);
        }
        std_errors.push(v.sqrt());
    }

    let y_mean = mean(y);
    let tss: f64 = y.iter().map(|v| (v - y_mean) * (v - y_mean)).sum();
    let r_squared = if tss > 0.0 { 1.0 - ssr / tss } else { 0.0 };

    let params: Vec<f64> = beta.iter().copied().collect();
    if params.iter().any(|p| !p.is_finite()) {
        return Err(StatsError::NonFinite("regression coefficients"));
    }

    Ok(OlsFit {
        params,
        std_errors,
        ssr,
        nobs: n,
        r_squared,
        residuals: residuals.iter().copied().collect(),
    })
}

/// Deterministic terms in the ADF regression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdfTrend {
    /// Intercept only
    Constant,
    /// No deterministic terms (used on Engle-Granger residuals)
    NoConstant,
}

impl AdfTrend {
    fn terms(&self) -> usize {
        match self {
            AdfTrend::Constant => 1,
            AdfTrend::NoConstant => 0,
        }
    }
}

/// ADF test statistic with the lag order it was computed at
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdfOutcome {
    pub statistic: f64,
    pub used_lag: usize,
    pub nobs: usize,
}

/// Default maximum lag: ceil(12 * (n/100)^(1/4))
pub fn default_max_lag(n: usize) -> usize {
    (12.0 * (n as f64 / 100.0).powf(0.25)).ceil() as usize
}

/// Augmented Dickey-Fuller statistic with AIC lag selection.
///
/// All candidate lags `0..=max_lag` are fitted on the common sample that
/// the largest lag allows; the winner is refitted on its own full sample.
pub fn adf(series: &[f64], trend: AdfTrend, max_lag: Option<usize>) -> Result<AdfOutcome, StatsError> {
    let n = series.len();
    let terms = trend.terms();
    let ceiling = (n / 2).checked_sub(terms + 1).ok_or(StatsError::InsufficientData {
        needed: 2 * (terms + 2),
        got: n,
    })?;
    let max_lag = max_lag.unwrap_or_else(|| default_max_lag(n)).min(ceiling);

    let diffs: Vec<f64> = series.windows(2).map(|w| w[1] - w[0]).collect();

    let mut best: Option<(f64, usize)> = None;
    for lag in 0..=max_lag {
        let (y, columns) = adf_design(series, &diffs, lag, max_lag, trend);
        let fit = ols(&y, &columns)?;
        let aic = fit.aic();
        if best.map_or(true, |(best_aic, _)| aic < best_aic) {
            best = Some((aic, lag));
        }
    }
    let used_lag = best.map(|(_, lag)| lag).unwrap_or(0);

    let (y, columns) = adf_design(series, &diffs, used_lag, used_lag, trend);
    let fit = ols(&y, &columns)?;
    // level regressor sits right after the deterministic terms
    let statistic = fit.t_value(terms);
    if !statistic.is_finite() {
        return Err(StatsError::NonFinite("ADF statistic"));
    }

    Ok(AdfOutcome {
        statistic,
        used_lag,
        nobs: fit.nobs,
    })
}

/// Rows start at `sample_lag` so fits with different `lag` share a sample
fn adf_design(
    series: &[f64],
    diffs: &[f64],
    lag: usize,
    sample_lag: usize,
    trend: AdfTrend,
) -> (Vec<f64>, Vec<Vec<f64>>) {
    let rows = diffs.len() - sample_lag;
    let mut y = Vec::with_capacity(rows);
    let mut columns: Vec<Vec<f64>> = vec![Vec::with_capacity(rows); trend.terms() + 1 + lag];

    for t in sample_lag..diffs.len() {
        y.push(diffs[t]);
        let mut c = 0;
        if trend == AdfTrend::Constant {
            columns[c].push(1.0);
            c += 1;
        }
        columns[c].push(series[t]);
        for j in 1..=lag {
            columns[c + j].push(diffs[t - j]);
        }
    }

    (y, columns)
}

// MacKinnon (1994) response surface, constant term, N = 1 and N = 2
const TAU_MAX_C: [f64; 2] = [2.74, 0.92];
const TAU_MIN_C: [f64; 2] = [-18.83, -18.86];
const TAU_STAR_C: [f64; 2] = [-1.61, -2.62];
const TAU_C_SMALLP: [[f64; 3]; 2] = [[2.1659, 1.4412, 0.038269], [2.92, 1.5012, 0.039796]];
const TAU_C_LARGEP: [[f64; 4]; 2] = [
    [1.7339, 0.93202, -0.12745, -0.010368],
    [2.1945, 0.64695, -0.29198, -0.042377],
];

/// MacKinnon approximate p-value for a unit-root statistic with a constant.
///
/// `n_vars` is 1 for a plain ADF test and 2 for a two-asset Engle-Granger
/// test. A statistic of -inf (perfect fit) maps to 0.
pub fn mackinnon_pvalue(statistic: f64, n_vars: usize) -> f64 {
    if statistic.is_nan() {
        return 1.0;
    }
    let idx = n_vars.clamp(1, 2) - 1;
    if statistic > TAU_MAX_C[idx] {
        return 1.0;
    }
    if statistic < TAU_MIN_C[idx] {
        return 0.0;
    }
    let poly = if statistic <= TAU_STAR_C[idx] {
        polyval(&TAU_C_SMALLP[idx], statistic)
    } else {
        polyval(&TAU_C_LARGEP[idx], statistic)
    };
    normal_cdf(poly)
}

// MacKinnon (2010) finite-sample critical values, constant term
const CRIT_C: [[[f64; 4]; 3]; 2] = [
    [
        [-3.43035, -6.5393, -16.786, -79.433],
        [-2.86154, -2.8903, -4.234, -40.040],
        [-2.56677, -1.5384, -2.809, 0.0],
    ],
    [
        [-3.89644, -10.9519, -22.527, 0.0],
        [-3.33613, -6.1101, -6.823, 0.0],
        [-3.04445, -4.2412, -2.720, 0.0],
    ],
];

/// 1%, 5% and 10% critical values for `nobs` observations
pub fn mackinnon_critical_values(n_vars: usize, nobs: usize) -> CriticalValues {
    let idx = n_vars.clamp(1, 2) - 1;
    let t = nobs.max(1) as f64;
    let at = |b: &[f64; 4]| b[0] + b[1] / t + b[2] / (t * t) + b[3] / (t * t * t);
    CriticalValues {
        one_pct: at(&CRIT_C[idx][0]),
        five_pct: at(&CRIT_C[idx][1]),
        ten_pct: at(&CRIT_C[idx][2]),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct CriticalValues {
    pub one_pct: f64,
    pub five_pct: f64,
    pub ten_pct: f64,
}

/// Evaluate c0 + c1*x + c2*x^2 + ...
fn polyval(coefs: &[f64], x: f64) -> f64 {
    coefs.iter().rev().fold(0.0, |acc, c| acc * x + c)
}

/// Mean-reversion half-life from the discretized OU regression
///   ds_t = -theta * (s_{t-1} - mean(s)) + e_t
/// half_life = ln(2) / theta. Absent when theta <= 0 or the fit degenerates.
pub fn ou_half_life(series: &[f64]) -> Option<f64> {
    if series.len() < 3 {
        return None;
    }
    let m = mean(series);
    let mut sxx = 0.0;
    let mut sxy = 0.0;
    for w in series.windows(2) {
        let lagged = w[0] - m;
        let diff = w[1] - w[0];
        sxx += lagged * lagged;
        sxy += lagged * diff;
    }
    if !(sxx > MIN_VARIANCE) {
        return None;
    }
    let theta = -(sxy / sxx);
    if !(theta > 0.0) || !theta.is_finite() {
        return None;
    }
    Some(std::f64::consts::LN_2 / theta)
}

/// Simplified rescaled-range Hurst exponent: slope of log(std of lagged
/// differences) on log(lag) for lags 2..min(100, n/2).
pub fn hurst_exponent(series: &[f64]) -> Option<f64> {
    let upper = 100.min(series.len() / 2);
    if upper <= 3 {
        return None;
    }
    let mut log_lags = Vec::with_capacity(upper - 2);
    let mut log_tau = Vec::with_capacity(upper - 2);
    for lag in 2..upper {
        let diffs: Vec<f64> = series[lag..]
            .iter()
            .zip(&series[..series.len() - lag])
            .map(|(a, b)| a - b)
            .collect();
        let tau = variance(&diffs, 0).sqrt();
        if !(tau > 0.0) || !tau.is_finite() {
            return None;
        }
        log_lags.push((lag as f64).ln());
        log_tau.push(tau.ln());
    }
    let var_x = variance(&log_lags, 0);
    if !(var_x > 0.0) {
        return None;
    }
    Some(covariance(&log_lags, &log_tau, 0) / var_x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rand_distr::{Distribution, Normal};

    fn ar1(n: usize, phi: f64, seed: u64) -> Vec<f64> {
        let mut rng = StdRng::seed_from_u64(seed);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut x = 0.0;
        (0..n)
            .map(|_| {
                x = phi * x + normal.sample(&mut rng);
                x
            })
            .collect()
    }

    #[test]
    fn test_moments() {
        let values = [2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        assert_relative_eq!(mean(&values), 5.0);
        assert_relative_eq!(variance(&values, 0), 4.0);
        assert_relative_eq!(variance(&values, 1), 32.0 / 7.0);
    }

    #[test]
    fn test_ols_slope_matches_exact_line() {
        let x: Vec<f64> = (0..20).map(|i| i as f64).collect();
        let y: Vec<f64> = x.iter().map(|v| 3.0 + 1.5 * v).collect();
        assert_relative_eq!(ols_slope(&x, &y).unwrap(), 1.5, epsilon = 1e-12);
    }

    #[test]
    fn test_ols_slope_flat_x_is_absent() {
        let x = vec![1.0; 10];
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert!(ols_slope(&x, &y).is_none());
    }

    #[test]
    fn test_ols_with_intercept() {
        let x: Vec<f64> = (0..50).map(|i| i as f64 * 0.5).collect();
        let y: Vec<f64> = x.iter().enumerate().map(|(i, v)| 2.0 + 0.75 * v + if i % 2 == 0 { 0.1 } else { -0.1 }).collect();
        let fit = ols(&y, &[vec![1.0; 50], x.clone()]).unwrap();
        assert_relative_eq!(fit.params[1], 0.75, epsilon = 1e-2);
        assert!(fit.r_squared > 0.99);
        assert_eq!(fit.residuals.len(), 50);
    }

    #[test]
    fn test_ols_singular() {
        let x = vec![1.0; 10];
        let y: Vec<f64> = (0..10).map(|i| i as f64).collect();
        let result = ols(&y, &[vec![1.0; 10], x]);
        assert!(result.is_err());
    }

    #[test]
    fn test_ols_rejects_non_finite() {
        let y = vec![1.0, f64::NAN, 3.0, 4.0];
        let result = ols(&y, &[vec![1.0; 4]]);
        assert_eq!(result, Err(StatsError::NonFinite("regression input")));
    }

    #[test]
    fn test_mackinnon_reference_points() {
        // 5% asymptotic critical values map to ~0.05
        assert_relative_eq!(mackinnon_pvalue(-2.86, 1), 0.05, epsilon = 0.005);
        assert_relative_eq!(mackinnon_pvalue(-3.34, 2), 0.05, epsilon = 0.005);
        // continuity at the switch point
        let below = mackinnon_pvalue(-1.6101, 1);
        let above = mackinnon_pvalue(-1.6099, 1);
        assert_relative_eq!(below, above, epsilon = 0.01);
        assert_eq!(mackinnon_pvalue(5.0, 1), 1.0);
        assert_eq!(mackinnon_pvalue(f64::NEG_INFINITY, 2), 0.0);
        assert_eq!(mackinnon_pvalue(f64::NAN, 1), 1.0);
    }

    #[test]
    fn test_critical_values_ordering() {
        let cv = mackinnon_critical_values(1, 500);
        assert!(cv.one_pct < cv.five_pct && cv.five_pct < cv.ten_pct);
        assert_relative_eq!(cv.five_pct, -2.867, epsilon = 0.01);
    }

    #[test]
    fn test_adf_rejects_unit_root_for_stationary_series() {
        let series = ar1(500, 0.5, 7);
        let outcome = adf(&series, AdfTrend::Constant, None).unwrap();
        assert!(outcome.statistic < -5.0);
        assert!(mackinnon_pvalue(outcome.statistic, 1) < 0.01);
    }

    #[test]
    fn test_adf_keeps_unit_root_for_random_walk() {
        let mut rng = StdRng::seed_from_u64(11);
        let normal = Normal::new(0.0, 1.0).unwrap();
        let mut level = 0.0;
        let walk: Vec<f64> = (0..500)
            .map(|_| {
                level += normal.sample(&mut rng);
                level
            })
            .collect();
        let outcome = adf(&walk, AdfTrend::Constant, None).unwrap();
        assert!(outcome.statistic > -4.0);
    }

    #[test]
    fn test_adf_too_short() {
        assert!(adf(&[1.0, 2.0], AdfTrend::Constant, None).is_err());
    }

    #[test]
    fn test_half_life_of_ar1() {
        // phi = 0.8 -> theta = 0.2 -> half-life ~ 3.47
        let series = ar1(2_000, 0.8, 3);
        let half_life = ou_half_life(&series).unwrap();
        assert!(half_life > 2.5 && half_life < 4.5, "half-life {half_life}");
    }

    #[test]
    fn test_half_life_undefined_for_trend() {
        let series: Vec<f64> = (0..100).map(|i| (i as f64).powi(2)).collect();
        assert!(ou_half_life(&series).is_none());
    }

    #[test]
    fn test_hurst_mean_reverting_below_half() {
        let series = ar1(1_000, 0.2, 5);
        let hurst = hurst_exponent(&series).unwrap();
        assert!(hurst < 0.3, "hurst {hurst}");
    }

    #[test]
    fn test_hurst_constant_series_is_absent() {
        assert!(hurst_exponent(&[1.0; 300]).is_none());
    }

    #[test]
    fn test_normal_cdf() {
        assert_relative_eq!(normal_cdf(0.0), 0.5, epsilon = 1e-12);
        assert_relative_eq!(normal_cdf(1.96), 0.975, epsilon = 1e-3);
    }
}
