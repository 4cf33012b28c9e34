use crate::error::CoreError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// The semantic category of a detected anomaly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyType {
    PriceMovement,
    VolumeSpike,
    TrendBreak,
    IndicatorBreach,
    MultivariateOutlier,
}

impl AnomalyType {
    /// The string stored in the `anomaly_type` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            AnomalyType::PriceMovement => "price_movement",
            AnomalyType::VolumeSpike => "volume_spike",
            AnomalyType::TrendBreak => "trend_break",
            AnomalyType::IndicatorBreach => "indicator_breach",
            AnomalyType::MultivariateOutlier => "multivariate_outlier",
        }
    }
}

impl fmt::Display for AnomalyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AnomalyType {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "price_movement" => Ok(AnomalyType::PriceMovement),
            "volume_spike" => Ok(AnomalyType::VolumeSpike),
            "trend_break" => Ok(AnomalyType::TrendBreak),
            "indicator_breach" => Ok(AnomalyType::IndicatorBreach),
            "multivariate_outlier" => Ok(AnomalyType::MultivariateOutlier),
            other => Err(CoreError::UnknownVariant("anomaly type", other.to_string())),
        }
    }
}

/// Identifies which detector produced a finding.
///
/// This is a closed set: adding a detection method means adding a variant here,
/// a module in the `detectors` crate, and an arm in its factory. The compiler
/// then points at every match that needs updating.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    Zscore,
    Iqr,
    IsolationForest,
    MovingAverage,
    VolumeAnomaly,
    TechnicalIndicators,
}

impl DetectionMethod {
    /// Every method, in the order the orchestrator reports them.
    pub const ALL: [DetectionMethod; 6] = [
        DetectionMethod::Zscore,
        DetectionMethod::Iqr,
        DetectionMethod::IsolationForest,
        DetectionMethod::MovingAverage,
        DetectionMethod::VolumeAnomaly,
        DetectionMethod::TechnicalIndicators,
    ];

    /// The string stored in the `method` column.
    pub fn as_str(&self) -> &'static str {
        match self {
            DetectionMethod::Zscore => "zscore",
            DetectionMethod::Iqr => "iqr",
            DetectionMethod::IsolationForest => "isolation_forest",
            DetectionMethod::MovingAverage => "moving_average",
            DetectionMethod::VolumeAnomaly => "volume_anomaly",
            DetectionMethod::TechnicalIndicators => "technical_indicators",
        }
    }

    /// The anomaly category a method emits. Each method emits exactly one.
    pub fn anomaly_type(&self) -> AnomalyType {
        match self {
            DetectionMethod::Zscore | DetectionMethod::Iqr => AnomalyType::PriceMovement,
            DetectionMethod::IsolationForest => AnomalyType::MultivariateOutlier,
            DetectionMethod::MovingAverage => AnomalyType::TrendBreak,
            DetectionMethod::VolumeAnomaly => AnomalyType::VolumeSpike,
            DetectionMethod::TechnicalIndicators => AnomalyType::IndicatorBreach,
        }
    }
}

impl fmt::Display for DetectionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DetectionMethod {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DetectionMethod::ALL
            .into_iter()
            .find(|m| m.as_str() == s)
            .ok_or_else(|| CoreError::UnknownVariant("detection method", s.to_string()))
    }
}

/// The direction recorded in a finding's `details.direction`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Spike,
    Drop,
    Above,
    Below,
}

impl Direction {
    /// `Spike` for a positive change, `Drop` otherwise.
    pub fn from_change(change: f64) -> Self {
        if change > 0.0 { Direction::Spike } else { Direction::Drop }
    }

    /// `Above` for a positive deviation, `Below` otherwise.
    pub fn from_deviation(deviation: f64) -> Self {
        if deviation > 0.0 { Direction::Above } else { Direction::Below }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Spike => "spike",
            Direction::Drop => "drop",
            Direction::Above => "above",
            Direction::Below => "below",
        }
    }
}
