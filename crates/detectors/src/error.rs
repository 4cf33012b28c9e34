use chrono::{DateTime, Utc};
use core_types::CoreError;
use thiserror::Error;

/// Reasons a slice of bars cannot become a `SeriesWindow`.
#[derive(Error, Debug)]
pub enum WindowError {
    #[error("Bars are not sorted ascending by timestamp (position {index})")]
    Unsorted { index: usize },

    #[error("Duplicate timestamp {0} in window")]
    DuplicateTimestamp(DateTime<Utc>),

    #[error("Window for '{expected}' contains a bar for '{found}'")]
    MixedSymbol { expected: String, found: String },

    #[error("Bar violates the OHLCV invariant: {0}")]
    InvalidBar(#[from] CoreError),

    #[error("Field '{field}' at position {index} cannot be represented as f64")]
    NotRepresentable { field: &'static str, index: usize },
}

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error("Detector received invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("An error occurred during indicator calculation: {0}")]
    IndicatorError(String),

    #[error("Failed to build finding: {0}")]
    Finding(#[from] CoreError),
}
