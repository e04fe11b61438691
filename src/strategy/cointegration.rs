//! Cointegration Validator
//!
//! Statistical gate run before a pair's signals are trusted:
//! 1. Two-step test: OLS of Y on X (with intercept) gives the hedge ratio;
//!    the spread Y - hr*X is tested for a unit root (ADF, constant, AIC lags)
//! 2. Engle-Granger: ADF without constant on the OLS residuals, p-value from
//!    the two-variable MacKinnon surface
//! 3. Half-life of mean reversion of the spread (OU discretization)
//! 4. Hurst exponent (informational only)
//!
//! A pair passes iff both p-values are below `adf_threshold` and the
//! half-life is defined and within `[min_half_life, max_half_life]`.
//! Numerical failures never escape: they become rejection reasons.

use serde::{Deserialize, Serialize};

use crate::domain::series::PriceSeries;
use crate::strategy::params::{CointegrationConfig, ConfigError};
use crate::strategy::stats::{
    self, adf, hurst_exponent, mackinnon_critical_values, mackinnon_pvalue, ou_half_life, AdfTrend,
    CriticalValues, StatsError,
};

/// Fewest non-missing observations a test will run on, after cleaning
pub const MIN_OBSERVATIONS: usize = 100;

/// Snapshot of one cointegration evaluation. Recomputed from scratch each
/// time, never updated in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CointegrationResult {
    pub is_cointegrated: bool,
    /// ADF p-value on the two-step spread (1.0 when the test did not run)
    pub adf_pvalue: f64,
    /// Engle-Granger p-value (1.0 when the test did not run)
    pub engle_granger_pvalue: f64,
    pub half_life: Option<f64>,
    pub hurst_exponent: Option<f64>,
    pub hedge_ratio: Option<f64>,
    /// Every failing condition, in evaluation order. Empty on a pass.
    pub rejection_reasons: Vec<String>,
    pub adf_statistic: Option<f64>,
    /// -inf for a perfect linear fit
    pub engle_granger_statistic: Option<f64>,
    pub adf_lag: Option<usize>,
    pub intercept: Option<f64>,
    pub spread_mean: Option<f64>,
    pub spread_std: Option<f64>,
    pub current_spread: Option<f64>,
    pub observations: usize,
    pub critical_values: Option<CriticalValues>,
}

impl CointegrationResult {
    /// Failed result carrying a single reason and no statistics
    pub fn rejected(observations: usize, reason: impl Into<String>) -> Self {
        Self {
            is_cointegrated: false,
            adf_pvalue: 1.0,
            engle_granger_pvalue: 1.0,
            half_life: None,
            hurst_exponent: None,
            hedge_ratio: None,
            rejection_reasons: vec![reason.into()],
            adf_statistic: None,
            engle_granger_statistic: None,
            adf_lag: None,
            intercept: None,
            spread_mean: None,
            spread_std: None,
            current_spread: None,
            observations,
            critical_values: None,
        }
    }
}

/// Statistics gathered before the pass/fail decision
struct TestStatistics {
    hedge_ratio: f64,
    intercept: f64,
    spread: Vec<f64>,
    adf_statistic: f64,
    adf_lag: usize,
    adf_nobs: usize,
    eg_statistic: f64,
}

#[derive(Debug, Clone)]
pub struct CointegrationValidator {
    config: CointegrationConfig,
}

impl CointegrationValidator {
    pub fn new(config: CointegrationConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &CointegrationConfig {
        &self.config
    }

    /// Align both series and test the most recent `lookback` shared bars
    pub fn test(&self, x: &PriceSeries, y: &PriceSeries) -> CointegrationResult {
        let aligned = x.align(y);
        let start = aligned.len().saturating_sub(self.config.lookback);
        self.test_prices(&aligned.left[start..], &aligned.right[start..])
    }

    /// Test raw price slices. At least `lookback` inputs are required; the
    /// last `lookback` are taken and pairs where either value is non-finite
    /// are then dropped.
    pub fn test_prices(&self, x: &[f64], y: &[f64]) -> CointegrationResult {
        if x.len() != y.len() {
            return CointegrationResult::rejected(
                0,
                format!("Test failed: input lengths differ ({} != {})", x.len(), y.len()),
            );
        }

        let lookback = self.config.lookback;
        if x.len() < lookback {
            tracing::info!(
                observations = x.len(),
                lookback,
                "Cointegration rejected: shorter than lookback"
            );
            return CointegrationResult::rejected(
                x.len(),
                format!("Insufficient data ({} < {} observations)", x.len(), lookback),
            );
        }

        let start = x.len() - lookback;
        let (clean_x, clean_y): (Vec<f64>, Vec<f64>) = x[start..]
            .iter()
            .zip(&y[start..])
            .filter(|(a, b)| a.is_finite() && b.is_finite())
            .map(|(a, b)| (*a, *b))
            .unzip();

        let n = clean_x.len();
        if n < MIN_OBSERVATIONS {
            let result = CointegrationResult::rejected(
                n,
                format!("Insufficient data ({} < {} observations)", n, MIN_OBSERVATIONS),
            );
            tracing::info!(observations = n, "Cointegration rejected: insufficient data");
            return result;
        }

        match compute_statistics(&clean_x, &clean_y) {
            Ok(stats) => self.decide(stats, n),
            Err(e) => {
                tracing::warn!(error = %e, observations = n, "Cointegration test failed numerically");
                CointegrationResult::rejected(n, format!("Test failed: {}", e))
            }
        }
    }

    fn decide(&self, s: TestStatistics, observations: usize) -> CointegrationResult {
        let cfg = &self.config;
        let adf_pvalue = mackinnon_pvalue(s.adf_statistic, 1);
        let engle_granger_pvalue = if s.eg_statistic == f64::NEG_INFINITY {
            0.0
        } else {
            mackinnon_pvalue(s.eg_statistic, 2)
        };
        let half_life = ou_half_life(&s.spread);
        let hurst = hurst_exponent(&s.spread);

        let mut reasons = Vec::new();
        if adf_pvalue >= cfg.adf_threshold {
            reasons.push(format!(
                "ADF p-value too high ({:.3} >= {})",
                adf_pvalue, cfg.adf_threshold
            ));
        }
        if engle_granger_pvalue >= cfg.adf_threshold {
            reasons.push(format!(
                "Engle-Granger p-value too high ({:.3} >= {})",
                engle_granger_pvalue, cfg.adf_threshold
            ));
        }
        match half_life {
            None => reasons.push("Could not calculate half-life".to_string()),
            Some(hl) if hl < cfg.min_half_life => reasons.push(format!(
                "Half-life too short ({:.1} < {})",
                hl, cfg.min_half_life
            )),
            Some(hl) if hl > cfg.max_half_life => reasons.push(format!(
                "Half-life too long ({:.1} > {})",
                hl, cfg.max_half_life
            )),
            Some(_) => {}
        }

        let is_cointegrated = reasons.is_empty();
        if is_cointegrated {
            tracing::debug!(
                adf_pvalue,
                engle_granger_pvalue,
                half_life = ?half_life,
                hedge_ratio = s.hedge_ratio,
                "Cointegration accepted"
            );
        } else {
            tracing::info!(reasons = ?reasons, "Cointegration rejected");
        }

        CointegrationResult {
            is_cointegrated,
            adf_pvalue,
            engle_granger_pvalue,
            half_life,
            hurst_exponent: hurst,
            hedge_ratio: Some(s.hedge_ratio),
            rejection_reasons: reasons,
            adf_statistic: Some(s.adf_statistic),
            engle_granger_statistic: Some(s.eg_statistic),
            adf_lag: Some(s.adf_lag),
            intercept: Some(s.intercept),
            spread_mean: Some(stats::mean(&s.spread)),
            spread_std: Some(stats::sample_std(&s.spread)),
            current_spread: s.spread.last().copied(),
            observations,
            critical_values: Some(mackinnon_critical_values(1, s.adf_nobs)),
        }
    }
}

fn compute_statistics(x: &[f64], y: &[f64]) -> Result<TestStatistics, StatsError> {
    let n = x.len();
    let fit = stats::ols(y, &[vec![1.0; n], x.to_vec()])?;
    let intercept = fit.params[0];
    let hedge_ratio = fit.params[1];

    let spread: Vec<f64> = y.iter().zip(x).map(|(yi, xi)| yi - hedge_ratio * xi).collect();
    let adf_outcome = adf(&spread, AdfTrend::Constant, None)?;

    // Engle-Granger residual test; a perfect fit has no residual dynamics
    let eg_statistic = if fit.r_squared >= 1.0 - 100.0 * f64::EPSILON.sqrt() {
        f64::NEG_INFINITY
    } else {
        adf(&fit.residuals, AdfTrend::NoConstant, None)?.statistic
    };

    Ok(TestStatistics {
        hedge_ratio,
        intercept,
        spread,
        adf_statistic: adf_outcome.statistic,
        adf_lag: adf_outcome.used_lag,
        adf_nobs: adf_outcome.nobs,
        eg_statistic,
    })
}
