//! Price Series
//!
//! Ordered (timestamp, price) observations for a single asset, plus the
//! inner-join alignment used by every pair computation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SeriesError {
    #[error("Timestamps must be strictly increasing (index {index}: {current} <= {previous})")]
    NonIncreasingTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("Price must be positive and finite (index {index}: {price})")]
    InvalidPrice { index: usize, price: f64 },

    #[error("Volume column length {volumes} does not match price length {prices}")]
    VolumeLengthMismatch { prices: usize, volumes: usize },
}

/// A single observation
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PricePoint {
    pub timestamp: DateTime<Utc>,
    pub price: f64,
}

/// Strictly increasing, positive-price time series. Deserializes through
/// `PriceSeries::new`, so stored data gets the same checks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Vec<PricePoint>", into = "Vec<PricePoint>")]
pub struct PriceSeries {
    points: Vec<PricePoint>,
}

impl TryFrom<Vec<PricePoint>> for PriceSeries {
    type Error = SeriesError;

    fn try_from(points: Vec<PricePoint>) -> Result<Self, Self::Error> {
        Self::new(points)
    }
}

impl From<PriceSeries> for Vec<PricePoint> {
    fn from(series: PriceSeries) -> Self {
        series.points
    }
}

impl PriceSeries {
    /// Build a series, rejecting duplicate/out-of-order timestamps and
    /// non-positive prices.
    pub fn new(points: Vec<PricePoint>) -> Result<Self, SeriesError> {
        for (index, point) in points.iter().enumerate() {
            if !(point.price.is_finite() && point.price > 0.0) {
                return Err(SeriesError::InvalidPrice {
                    index,
                    price: point.price,
                });
            }
            if index > 0 {
                let previous = points[index - 1].timestamp;
                if point.timestamp <= previous {
                    return Err(SeriesError::NonIncreasingTimestamp {
                        index,
                        previous,
                        current: point.timestamp,
                    });
                }
            }
        }
        Ok(Self { points })
    }

    /// Convenience constructor from parallel vectors
    pub fn from_parts(
        timestamps: Vec<DateTime<Utc>>,
        prices: Vec<f64>,
    ) -> Result<Self, SeriesError> {
        let points = timestamps
            .into_iter()
            .zip(prices)
            .map(|(timestamp, price)| PricePoint { timestamp, price })
            .collect();
        Self::new(points)
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> &[PricePoint] {
        &self.points
    }

    pub fn prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price).collect()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.timestamp).collect()
    }

    /// Natural log of every price (always defined for a valid series)
    pub fn log_prices(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.price.ln()).collect()
    }

    pub fn last(&self) -> Option<&PricePoint> {
        self.points.last()
    }

    /// Keep only the last `n` observations
    pub fn tail(&self, n: usize) -> PriceSeries {
        let start = self.points.len().saturating_sub(n);
        PriceSeries {
            points: self.points[start..].to_vec(),
        }
    }

    /// Restrict to `[start, end]` (either bound optional)
    pub fn between(
        &self,
        start: Option<DateTime<Utc>>,
        end: Option<DateTime<Utc>>,
    ) -> PriceSeries {
        let points = self
            .points
            .iter()
            .filter(|p| start.map_or(true, |s| p.timestamp >= s))
            .filter(|p| end.map_or(true, |e| p.timestamp <= e))
            .copied()
            .collect();
        PriceSeries { points }
    }

    /// Inner-join two series on timestamp. Timestamps present in only one
    /// series are dropped; a gap reduces overlap and is never an error.
    pub fn align(&self, other: &PriceSeries) -> AlignedPair {
        let mut timestamps = Vec::new();
        let mut left = Vec::new();
        let mut right = Vec::new();

        let (mut i, mut j) = (0, 0);
        while i < self.points.len() && j < other.points.len() {
            let a = &self.points[i];
            let b = &other.points[j];
            match a.timestamp.cmp(&b.timestamp) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    timestamps.push(a.timestamp);
                    left.push(a.price);
                    right.push(b.price);
                    i += 1;
                    j += 1;
                }
            }
        }

        AlignedPair {
            timestamps,
            left,
            right,
        }
    }
}

/// Two price vectors sharing one timeline
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AlignedPair {
    pub timestamps: Vec<DateTime<Utc>>,
    pub left: Vec<f64>,
    pub right: Vec<f64>,
}

impl AlignedPair {
    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }
}

/// Price series with optional per-bar traded volume (base units)
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceHistory {
    pub series: PriceSeries,
    pub volumes: Option<Vec<f64>>,
}

impl PriceHistory {
    pub fn new(series: PriceSeries, volumes: Option<Vec<f64>>) -> Result<Self, SeriesError> {
        if let Some(v) = &volumes {
            if v.len() != series.len() {
                return Err(SeriesError::VolumeLengthMismatch {
                    prices: series.len(),
                    volumes: v.len(),
                });
            }
        }
        Ok(Self { series, volumes })
    }

    /// Average daily dollar volume over the most recent complete days, at
    /// most `max_days`, counting back from the latest bar in blocks of
    /// `bars_per_day`. Absent without a volume column or a full day of bars.
    pub fn adv_usd(&self, bars_per_day: usize, max_days: usize) -> Option<f64> {
        let volumes = self.volumes.as_ref()?;
        if bars_per_day == 0 {
            return None;
        }
        let days = (volumes.len() / bars_per_day).min(max_days);
        if days == 0 {
            return None;
        }
        let start = volumes.len() - days * bars_per_day;
        let dollar_volume: f64 = self.series.points()[start..]
            .iter()
            .zip(&volumes[start..])
            .map(|(p, v)| p.price * v)
            .sum();
        Some(dollar_volume / days as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn ts(hour: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::hours(hour)
    }

    #[test]
    fn test_rejects_non_increasing_timestamps() {
        let result = PriceSeries::from_parts(vec![ts(0), ts(0)], vec![1.0, 2.0]);
        assert!(matches!(
            result,
            Err(SeriesError::NonIncreasingTimestamp { index: 1, .. })
        ));
    }

    #[test]
    fn test_rejects_non_positive_price() {
        let result = PriceSeries::from_parts(vec![ts(0), ts(1)], vec![1.0, 0.0]);
        assert!(matches!(result, Err(SeriesError::InvalidPrice { index: 1, .. })));
    }

    #[test]
    fn test_deserialize_validates() {
        let good = r#"[{"timestamp":"2024-01-01T00:00:00Z","price":1.5},{"timestamp":"2024-01-01T01:00:00Z","price":1.6}]"#;
        let series: PriceSeries = serde_json::from_str(good).unwrap();
        assert_eq!(series.prices(), vec![1.5, 1.6]);
        assert_eq!(serde_json::to_string(&series).unwrap(), good);

        let backwards = r#"[{"timestamp":"2024-01-01T01:00:00Z","price":1.5},{"timestamp":"2024-01-01T00:00:00Z","price":1.6}]"#;
        let err = serde_json::from_str::<PriceSeries>(backwards).unwrap_err();
        assert!(err.to_string().contains("strictly increasing"));

        let negative = r#"[{"timestamp":"2024-01-01T00:00:00Z","price":-2.0}]"#;
        assert!(serde_json::from_str::<PriceSeries>(negative).is_err());
    }

    #[test]
    fn test_align_drops_unmatched_timestamps() {
        let a = PriceSeries::from_parts(vec![ts(0), ts(1), ts(2), ts(4)], vec![1.0, 2.0, 3.0, 4.0])
            .unwrap();
        let b = PriceSeries::from_parts(vec![ts(1), ts(2), ts(3), ts(4)], vec![10.0, 20.0, 30.0, 40.0])
            .unwrap();

        let aligned = a.align(&b);
        assert_eq!(aligned.timestamps, vec![ts(1), ts(2), ts(4)]);
        assert_eq!(aligned.left, vec![2.0, 3.0, 4.0]);
        assert_eq!(aligned.right, vec![10.0, 20.0, 40.0]);
    }

    #[test]
    fn test_tail_and_between() {
        let s = PriceSeries::from_parts((0..5).map(ts).collect(), vec![1.0, 2.0, 3.0, 4.0, 5.0])
            .unwrap();
        assert_eq!(s.tail(2).prices(), vec![4.0, 5.0]);
        assert_eq!(s.tail(10).len(), 5);
        assert_eq!(s.between(Some(ts(1)), Some(ts(3))).prices(), vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_adv_usd_averages_complete_days() {
        let s = PriceSeries::from_parts((0..5).map(ts).collect(), vec![10.0, 10.0, 10.0, 20.0, 20.0])
            .unwrap();
        let history = PriceHistory::new(s, Some(vec![7.0, 1.0, 1.0, 2.0, 3.0])).unwrap();
        // days are [1, 2] -> 20 and [3, 4] -> 100; the partial oldest bar is ignored
        assert_eq!(history.adv_usd(2, 30), Some(60.0));
        assert_eq!(history.adv_usd(2, 1), Some(100.0));
        assert_eq!(history.adv_usd(6, 30), None);
        assert_eq!(history.adv_usd(2, 0), None);
    }

    #[test]
    fn test_adv_usd_needs_volume() {
        let s = PriceSeries::from_parts((0..4).map(ts).collect(), vec![1.0; 4]).unwrap();
        assert_eq!(PriceHistory::new(s, None).unwrap().adv_usd(2, 30), None);
    }
}
