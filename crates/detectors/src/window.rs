use crate::error::WindowError;
use chrono::{DateTime, Utc};
use configuration::ScanMode;
use core_types::Bar;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::ops::Range;
use std::sync::OnceLock;

/// An immutable, time-ordered view of one instrument's recent bars.
///
/// Prices and volumes are converted from `Decimal`/`i64` to `f64` here, once.
/// Derived series are computed on first use and cached, so a window shared
/// between detectors through an `Arc` computes each of them at most once.
#[derive(Debug)]
pub struct SeriesWindow {
    symbol: String,
    timestamps: Vec<DateTime<Utc>>,
    high: Vec<f64>,
    low: Vec<f64>,
    close: Vec<f64>,
    volume: Vec<f64>,
    returns: OnceLock<Vec<Option<f64>>>,
}

impl SeriesWindow {
    /// Builds a window from bars sorted ascending by timestamp.
    ///
    /// Rejects unsorted input, duplicate timestamps, bars for another symbol and
    /// bars that fail `Bar::validate`. An empty slice yields an empty window.
    pub fn new(symbol: impl Into<String>, bars: &[Bar]) -> Result<Self, WindowError> {
        let symbol = symbol.into();
        let n = bars.len();
        let mut window = Self {
            symbol,
            timestamps: Vec::with_capacity(n),
            high: Vec::with_capacity(n),
            low: Vec::with_capacity(n),
            close: Vec::with_capacity(n),
            volume: Vec::with_capacity(n),
            returns: OnceLock::new(),
        };

        for (index, bar) in bars.iter().enumerate() {
            if bar.symbol != window.symbol {
                return Err(WindowError::MixedSymbol {
                    expected: window.symbol.clone(),
                    found: bar.symbol.clone(),
                });
            }
            if let Some(previous) = window.timestamps.last() {
                if bar.timestamp == *previous {
                    return Err(WindowError::DuplicateTimestamp(bar.timestamp));
                }
                if bar.timestamp < *previous {
                    return Err(WindowError::Unsorted { index });
                }
            }
            bar.validate()?;

            window.timestamps.push(bar.timestamp);
            window.high.push(to_f64(bar.high, "high", index)?);
            window.low.push(to_f64(bar.low, "low", index)?);
            window.close.push(to_f64(bar.close, "close", index)?);
            window.volume.push(bar.volume as f64);
        }

        Ok(window)
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.close.len()
    }

    pub fn is_empty(&self) -> bool {
        self.close.is_empty()
    }

    pub fn timestamps(&self) -> &[DateTime<Utc>] {
        &self.timestamps
    }

    pub fn closes(&self) -> &[f64] {
        &self.close
    }

    pub fn volumes(&self) -> &[f64] {
        &self.volume
    }

    /// Close-to-close percentage change. Undefined for the first bar and after a zero close.
    pub fn returns(&self) -> &[Option<f64>] {
        self.returns.get_or_init(|| pct_change(&self.close))
    }

    /// Percentage change of volume. Undefined for the first bar and after a zero volume.
    pub fn volume_change(&self) -> Vec<Option<f64>> {
        pct_change(&self.volume)
    }

    /// `(high - low) / close * 100`, undefined when the close is zero.
    pub fn price_range(&self) -> Vec<Option<f64>> {
        self.high
            .iter()
            .zip(&self.low)
            .zip(&self.close)
            .map(|((h, l), c)| (*c != 0.0).then(|| (h - l) / c * 100.0))
            .collect()
    }

    /// Indices of the bars a detector needing `required_history` bars evaluates.
    ///
    /// Bar `i` has `i + 1` bars of history up to and including itself.
    pub fn evaluation_range(&self, scan: ScanMode, required_history: usize) -> Range<usize> {
        let n = self.len();
        let required = required_history.max(1);
        if n < required {
            return 0..0;
        }
        match scan {
            ScanMode::Latest => n - 1..n,
            ScanMode::FullWindow => required - 1..n,
        }
    }
}

fn to_f64(value: Decimal, field: &'static str, index: usize) -> Result<f64, WindowError> {
    value
        .to_f64()
        .filter(|v| v.is_finite())
        .ok_or(WindowError::NotRepresentable { field, index })
}

fn pct_change(values: &[f64]) -> Vec<Option<f64>> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(None);
    out.extend(values.windows(2).map(|pair| {
        let (previous, current) = (pair[0], pair[1]);
        (previous != 0.0).then(|| (current - previous) / previous * 100.0)
    }));
    out
}

#[cfg(test)]
pub(crate) mod test_support {
    use chrono::{Duration, TimeZone, Utc};
    use core_types::Bar;
    use rust_decimal::Decimal;
    use rust_decimal::prelude::FromPrimitive;

    /// Daily bars for `symbol` from the given closes and volumes. High/low straddle
    /// the close by 1% so every bar is valid.
    pub fn bars(symbol: &str, closes: &[f64], volumes: &[i64]) -> Vec<Bar> {
        assert_eq!(closes.len(), volumes.len());
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        closes
            .iter()
            .zip(volumes)
            .enumerate()
            .map(|(i, (close, volume))| {
                let close = Decimal::from_f64(*close).unwrap();
                let spread = close / Decimal::from(100);
                Bar {
                    symbol: symbol.to_string(),
                    timestamp: start + Duration::days(i as i64),
                    open: close,
                    high: close + spread,
                    low: close - spread,
                    close,
                    volume: *volume,
                }
            })
            .collect()
    }

    pub fn closes_from_returns(start: f64, returns_pct: &[f64]) -> Vec<f64> {
        let mut closes = vec![start];
        for r in returns_pct {
            let last = *closes.last().unwrap();
            closes.push(last * (1.0 + r / 100.0));
        }
        closes
    }
}
