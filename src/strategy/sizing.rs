//! Position Sizing - volatility targeting with risk caps
//!
//! A one-sigma move in the spread should produce `target_sigma_usd` of P&L:
//!   N_y = target_sigma_usd / sigma
//!   N_x = N_y * |beta|
//!
//! Caps are applied in order, each rescaling both legs together so the
//! hedge ratio survives: per-leg notional cap, ADV participation cap, then
//! a minimum-size floor that zeroes both legs. A one-legged position is
//! never produced.

use serde::{Deserialize, Serialize};

use crate::strategy::params::{ConfigError, CostConfig, SizingConfig};

/// Ceiling on the scaled Kelly fraction
const MAX_KELLY_FRACTION: f64 = 0.25;
/// Bounds for the volatility-regime scalar
const MIN_VOL_SCALAR: f64 = 0.5;
const MAX_VOL_SCALAR: f64 = 2.0;

/// Inputs for one sizing decision
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct SizingRequest {
    pub beta: f64,
    /// Spread standard deviation; absent or <= 0 sizes to zero
    pub spread_std: Option<f64>,
    pub price_y: f64,
    pub price_x: f64,
    /// Average daily dollar volume per leg
    pub adv_y_usd: Option<f64>,
    pub adv_x_usd: Option<f64>,
    /// Account capital for the leverage figure
    pub capital: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PositionSizeResult {
    pub leg_y_notional_usd: f64,
    pub leg_x_notional_usd: f64,
    pub leg_y_units: f64,
    pub leg_x_units: f64,
    pub total_notional: f64,
    pub leverage: f64,
    pub expected_fees: f64,
    pub expected_slippage: f64,
    /// Dependent-leg notional times sigma
    pub risk_per_sigma: f64,
}

impl PositionSizeResult {
    pub fn is_zero(&self) -> bool {
        self.total_notional == 0.0
    }

    /// Scale every notional-derived field
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            leg_y_notional_usd: self.leg_y_notional_usd * factor,
            leg_x_notional_usd: self.leg_x_notional_usd * factor,
            leg_y_units: self.leg_y_units * factor,
            leg_x_units: self.leg_x_units * factor,
            total_notional: self.total_notional * factor,
            leverage: self.leverage * factor,
            expected_fees: self.expected_fees * factor,
            expected_slippage: self.expected_slippage * factor,
            risk_per_sigma: self.risk_per_sigma * factor,
        }
    }
}

/// Aggregate exposure across several sized pairs
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PortfolioRisk {
    pub total_notional: f64,
    /// Root-sum-square of per-pair risk (pairs treated as uncorrelated)
    pub total_risk: f64,
    /// Largest position's share of total notional
    pub concentration_ratio: f64,
    pub max_position_pct: f64,
    pub positions: usize,
}

#[derive(Debug, Clone)]
pub struct PositionSizer {
    sizing: SizingConfig,
    costs: CostConfig,
}

impl PositionSizer {
    pub fn new(sizing: SizingConfig, costs: CostConfig) -> Result<Self, ConfigError> {
        sizing.validate()?;
        costs.validate()?;
        Ok(Self { sizing, costs })
    }

    pub fn sizing_config(&self) -> &SizingConfig {
        &self.sizing
    }

    pub fn cost_config(&self) -> &CostConfig {
        &self.costs
    }

    /// Volatility-targeted notionals after the per-leg cap only.
    /// Returns (dependent, independent); both zero for an unusable sigma.
    pub fn capped_notionals(&self, beta: f64, spread_std: Option<f64>) -> (f64, f64) {
        let sigma = match spread_std {
            Some(s) if s.is_finite() && s > 0.0 && beta.is_finite() => s,
            _ => return (0.0, 0.0),
        };
        let y_base = self.sizing.target_sigma_usd / sigma;
        let x_base = y_base * beta.abs();

        let cap = self.sizing.max_notional_per_leg;
        if y_base <= cap && x_base <= cap {
            return (y_base, x_base);
        }
        let mut scale = cap / y_base;
        if x_base > 0.0 {
            scale = scale.min(cap / x_base);
        }
        (y_base * scale, x_base * scale)
    }

    pub fn size(&self, request: &SizingRequest) -> PositionSizeResult {
        let (mut y_notional, mut x_notional) =
            self.capped_notionals(request.beta, request.spread_std);

        // Liquidity caps, independent leg first
        if let Some(adv) = request.adv_x_usd.filter(|a| *a > 0.0) {
            let limit = adv * self.sizing.max_adv_fraction;
            if x_notional > limit {
                let scale = limit / x_notional;
                x_notional *= scale;
                y_notional *= scale;
            }
        }
        if let Some(adv) = request.adv_y_usd.filter(|a| *a > 0.0) {
            let limit = adv * self.sizing.max_adv_fraction;
            if y_notional > limit {
                let scale = limit / y_notional;
                y_notional *= scale;
                x_notional *= scale;
            }
        }

        if y_notional < self.sizing.min_notional_per_leg
            || x_notional < self.sizing.min_notional_per_leg
        {
            y_notional = 0.0;
            x_notional = 0.0;
        }

        let units = |notional: f64, price: f64| if price > 0.0 { notional / price } else { 0.0 };
        let total_notional = y_notional + x_notional;
        let leverage = match request.capital {
            Some(c) if c > 0.0 => total_notional / c,
            _ => 0.0,
        };
        let sigma = request.spread_std.filter(|s| *s > 0.0).unwrap_or(0.0);

        PositionSizeResult {
            leg_y_notional_usd: y_notional,
            leg_x_notional_usd: x_notional,
            leg_y_units: units(y_notional, request.price_y),
            leg_x_units: units(x_notional, request.price_x),
            total_notional,
            leverage,
            expected_fees: total_notional * self.costs.fee_bps / 10_000.0,
            expected_slippage: total_notional * self.costs.slippage_bps / 10_000.0,
            risk_per_sigma: y_notional * sigma,
        }
    }

    /// Scaled Kelly fraction f = (p*b - q)/b * scale, clamped to [0, 0.25]
    pub fn kelly_fraction(win_rate: f64, avg_win: f64, avg_loss: f64, scale: f64) -> f64 {
        if !(avg_win > 0.0 && avg_loss > 0.0) {
            return 0.0;
        }
        let b = avg_win / avg_loss;
        let full = (win_rate * b - (1.0 - win_rate)) / b;
        (full * scale).clamp(0.0, MAX_KELLY_FRACTION)
    }

    /// Shrink in high-volatility regimes, grow in calm ones
    pub fn adjust_for_volatility_regime(
        size: &PositionSizeResult,
        current_vol: f64,
        target_vol: f64,
    ) -> PositionSizeResult {
        if !(current_vol > 0.0 && target_vol > 0.0) {
            return *size;
        }
        let scalar = (target_vol / current_vol).clamp(MIN_VOL_SCALAR, MAX_VOL_SCALAR);
        size.scaled(scalar)
    }

    pub fn portfolio_risk(positions: &[PositionSizeResult]) -> PortfolioRisk {
        if positions.is_empty() {
            return PortfolioRisk::default();
        }
        let total_notional: f64 = positions.iter().map(|p| p.total_notional).sum();
        let total_risk = positions
            .iter()
            .map(|p| p.risk_per_sigma * p.risk_per_sigma)
            .sum::<f64>()
            .sqrt();
        let max_notional = positions
            .iter()
            .map(|p| p.total_notional)
            .fold(0.0_f64, f64::max);
        let concentration_ratio = if total_notional > 0.0 {
            max_notional / total_notional
        } else {
            0.0
        };
        PortfolioRisk {
            total_notional,
            total_risk,
            concentration_ratio,
            max_position_pct: concentration_ratio * 100.0,
            positions: positions.len(),
        }
    }
}
