use crate::enums::{AnomalyType, DetectionMethod};
use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

/// One instrument's OHLCV observation at a timestamp.
///
/// Prices keep the database's `NUMERIC` precision. Conversion to `f64` happens
/// once, when a `SeriesWindow` is built from a slice of bars.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: i64,
}

impl Bar {
    /// Checks `low <= open, close <= high` and `volume >= 0`.
    pub fn validate(&self) -> Result<(), CoreError> {
        let in_range = |p: Decimal| self.low <= p && p <= self.high;
        if !in_range(self.open) || !in_range(self.close) {
            return Err(CoreError::InvalidInput(
                format!("bar {} @ {}", self.symbol, self.timestamp),
                format!(
                    "open {} / close {} outside [{}, {}]",
                    self.open, self.close, self.low, self.high
                ),
            ));
        }
        if self.volume < 0 {
            return Err(CoreError::InvalidInput(
                format!("bar {} @ {}", self.symbol, self.timestamp),
                format!("negative volume {}", self.volume),
            ));
        }
        Ok(())
    }
}

/// The natural key of a finding: `(symbol, timestamp, method)`.
///
/// Each method emits exactly one anomaly type, so the key is also unique per type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FindingKey {
    pub symbol: String,
    pub timestamp: DateTime<Utc>,
    pub method: DetectionMethod,
}

/// A single scored anomaly produced by one detector invocation.
///
/// Fields are private so a `Finding` cannot be altered after a detector has
/// built it. The constructor refuses non-finite or negative scores, and
/// deserialization goes through the same checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FindingRecord")]
pub struct Finding {
    symbol: String,
    timestamp: DateTime<Utc>,
    anomaly_type: AnomalyType,
    method: DetectionMethod,
    score: f64,
    details: JsonValue,
}

impl Finding {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        method: DetectionMethod,
        score: f64,
        details: JsonValue,
    ) -> Result<Self, CoreError> {
        if !score.is_finite() || score < 0.0 {
            return Err(CoreError::InvalidInput(
                format!("{} score", method),
                format!("{} is not a finite, non-negative number", score),
            ));
        }
        if !details.is_object() {
            return Err(CoreError::InvalidInput(
                format!("{} details", method),
                "details must be a JSON object".to_string(),
            ));
        }
        Ok(Self {
            symbol: symbol.into(),
            timestamp,
            anomaly_type: method.anomaly_type(),
            method,
            score,
            details,
        })
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }

    pub fn anomaly_type(&self) -> AnomalyType {
        self.anomaly_type
    }

    pub fn method(&self) -> DetectionMethod {
        self.method
    }

    pub fn score(&self) -> f64 {
        self.score
    }

    pub fn details(&self) -> &JsonValue {
        &self.details
    }

    pub fn key(&self) -> FindingKey {
        FindingKey {
            symbol: self.symbol.clone(),
            timestamp: self.timestamp,
            method: self.method,
        }
    }
}

/// The serialized shape of a `Finding`, before validation.
#[derive(Deserialize)]
struct FindingRecord {
    symbol: String,
    timestamp: DateTime<Utc>,
    anomaly_type: AnomalyType,
    method: DetectionMethod,
    score: f64,
    details: JsonValue,
}

impl TryFrom<FindingRecord> for Finding {
    type Error = CoreError;

    fn try_from(record: FindingRecord) -> Result<Self, Self::Error> {
        if record.anomaly_type != record.method.anomaly_type() {
            return Err(CoreError::InvalidInput(
                format!("{} anomaly_type", record.method),
                format!("{} does not belong to this method", record.anomaly_type),
            ));
        }
        Finding::new(record.symbol, record.timestamp, record.method, record.score, record.details)
    }
}
