//! CSV Price History
//!
//! Loads one asset's bars from CSV. Required columns: `timestamp` and
//! `close`; `volume` is optional, other columns are ignored. Timestamps may
//! be RFC 3339, `YYYY-MM-DD HH:MM:SS` (UTC) or unix epoch seconds or
//! milliseconds.

use std::fs::File;
use std::path::Path;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::series::{PriceHistory, PricePoint, PriceSeries, SeriesError};

/// Epoch values above this are taken as milliseconds
const EPOCH_MILLIS_THRESHOLD: i64 = 100_000_000_000;

#[derive(Error, Debug)]
pub enum PriceLoadError {
    #[error("Failed to open {path}: {source}")]
    Open {
        path: String,
        source: std::io::Error,
    },

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Unparseable timestamp on row {row}: {value}")]
    Timestamp { row: usize, value: String },

    #[error("Invalid price series: {0}")]
    Series(#[from] SeriesError),

    #[error("No rows in {0}")]
    Empty(String),
}

#[derive(Debug, Deserialize)]
struct PriceRecord {
    timestamp: String,
    close: f64,
    #[serde(default)]
    volume: Option<f64>,
}

#[derive(Debug, Serialize)]
struct PriceRow {
    timestamp: String,
    close: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    volume: Option<f64>,
}

pub fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    let value = value.trim();
    if let Ok(epoch) = value.parse::<i64>() {
        return if epoch.abs() > EPOCH_MILLIS_THRESHOLD {
            Utc.timestamp_millis_opt(epoch).single()
        } else {
            Utc.timestamp_opt(epoch, 0).single()
        };
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// Load a price history, sorted by timestamp. Volume is kept only when
/// every row carries it.
pub fn load_price_history(path: impl AsRef<Path>) -> Result<PriceHistory, PriceLoadError> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|source| PriceLoadError::Open {
        path: path.display().to_string(),
        source,
    })?;
    let mut reader = csv::Reader::from_reader(file);

    let mut rows: Vec<(DateTime<Utc>, f64, Option<f64>)> = Vec::new();
    for (index, record) in reader.deserialize::<PriceRecord>().enumerate() {
        let record = record?;
        let timestamp = parse_timestamp(&record.timestamp).ok_or(PriceLoadError::Timestamp {
            row: index + 1,
            value: record.timestamp.clone(),
        })?;
        rows.push((timestamp, record.close, record.volume));
    }
    if rows.is_empty() {
        return Err(PriceLoadError::Empty(path.display().to_string()));
    }
    rows.sort_by_key(|(ts, _, _)| *ts);

    let volumes: Option<Vec<f64>> = rows.iter().map(|(_, _, v)| *v).collect();
    let points = rows
        .into_iter()
        .map(|(timestamp, price, _)| PricePoint { timestamp, price })
        .collect();
    let series = PriceSeries::new(points)?;

    tracing::debug!(
        path = %path.display(),
        bars = series.len(),
        has_volume = volumes.is_some(),
        "Loaded price history"
    );
    Ok(PriceHistory::new(series, volumes)?)
}

/// Write a price history in the format `load_price_history` reads
pub fn write_price_history(path: impl AsRef<Path>, history: &PriceHistory) -> Result<(), PriceLoadError> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for (i, point) in history.series.points().iter().enumerate() {
        writer.serialize(PriceRow {
            timestamp: point.timestamp.to_rfc3339(),
            close: point.price,
            volume: history.volumes.as_ref().map(|v| v[i]),
        })?;
    }
    writer.flush().map_err(csv::Error::from)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_parse_timestamp_formats() {
        let expected = Utc.with_ymd_and_hms(2024, 1, 2, 3, 0, 0).unwrap();
        assert_eq!(parse_timestamp("2024-01-02T03:00:00Z"), Some(expected));
        assert_eq!(parse_timestamp("2024-01-02 03:00:00"), Some(expected));
        assert_eq!(parse_timestamp(&expected.timestamp().to_string()), Some(expected));
        assert_eq!(parse_timestamp(&expected.timestamp_millis().to_string()), Some(expected));
        assert_eq!(parse_timestamp("yesterday"), None);
    }

    #[test]
    fn test_load_sorts_and_reads_volume() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("eth.csv");
        fs::write(
            &path,
            "timestamp,open,close,volume\n\
             2024-01-01T01:00:00Z,1,101.5,10\n\
             2024-01-01T00:00:00Z,1,100.0,12\n",
        )
        .unwrap();

        let history = load_price_history(&path).unwrap();
        assert_eq!(history.series.prices(), vec![100.0, 101.5]);
        assert_eq!(history.volumes, Some(vec![12.0, 10.0]));
    }

    #[test]
    fn test_missing_volume_column() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("btc.csv");
        fs::write(&path, "timestamp,close\n1704067200,42000\n1704070800,42100\n").unwrap();
        let history = load_price_history(&path).unwrap();
        assert!(history.volumes.is_none());
        assert_eq!(history.series.len(), 2);
    }

    #[test]
    fn test_duplicate_timestamp_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("dup.csv");
        fs::write(&path, "timestamp,close\n1704067200,1\n1704067200,2\n").unwrap();
        assert!(matches!(load_price_history(&path), Err(PriceLoadError::Series(_))));
    }

    #[test]
    fn test_bad_timestamp() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("bad.csv");
        fs::write(&path, "timestamp,close\nnot-a-date,1\n").unwrap();
        assert!(matches!(
            load_price_history(&path),
            Err(PriceLoadError::Timestamp { row: 1, .. })
        ));
    }

    #[test]
    fn test_write_then_load() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let series = PriceSeries::from_parts(
            vec![
                Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
                Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap(),
            ],
            vec![10.0, 11.0],
        )
        .unwrap();
        let history = PriceHistory::new(series.clone(), Some(vec![5.0, 6.0])).unwrap();
        write_price_history(&path, &history).unwrap();
        let loaded = load_price_history(&path).unwrap();
        assert_eq!(loaded.series, series);
        assert_eq!(loaded.volumes, Some(vec![5.0, 6.0]));
    }
}
