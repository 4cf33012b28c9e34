use crate::error::DetectorError;
use crate::stats::{self, EPSILON, MIN_RETURN_SPREAD};
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Direction, Finding};
use serde_json::json;
use tracing::debug;

/// Tukey fences around the interquartile range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IqrBounds {
    pub q1: f64,
    pub q3: f64,
    pub k: f64,
}

impl IqrBounds {
    /// Quartiles of an unsorted sample. `None` for an empty sample.
    pub fn from_sample(sample: &[f64], k: f64) -> Option<Self> {
        let mut sorted = sample.to_vec();
        sorted.sort_by(f64::total_cmp);
        Some(Self {
            q1: stats::quantile(&sorted, 0.25)?,
            q3: stats::quantile(&sorted, 0.75)?,
            k,
        })
    }

    pub fn iqr(&self) -> f64 {
        self.q3 - self.q1
    }

    pub fn lower(&self) -> f64 {
        self.q1 - self.k * self.iqr()
    }

    pub fn upper(&self) -> f64 {
        self.q3 + self.k * self.iqr()
    }

    /// Distance beyond the nearest fence in units of IQR. Fences are exclusive,
    /// and a zero IQR never breaches. The IQR divisor is floored at
    /// `MIN_RETURN_SPREAD`.
    pub fn breach(&self, value: f64) -> Option<f64> {
        let iqr = self.iqr();
        if iqr <= EPSILON {
            return None;
        }
        let scale = iqr.max(MIN_RETURN_SPREAD);
        if value > self.upper() {
            Some((value - self.upper()) / scale)
        } else if value < self.lower() {
            Some((self.lower() - value) / scale)
        } else {
            None
        }
    }
}

/// Flags daily returns outside the Tukey fences of their trailing window.
#[derive(Debug, Default, Clone, Copy)]
pub struct IqrDetector;

impl Detector for IqrDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Iqr
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        config.iqr_window + 1
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        if config.iqr_window < 2 || !(config.iqr_multiplier > 0.0) {
            return Err(DetectorError::InvalidParameters(format!(
                "iqr_window {} / iqr_multiplier {} out of range",
                config.iqr_window, config.iqr_multiplier
            )));
        }
        let required = self.required_history(config);
        if window.len() < required {
            debug!(symbol = window.symbol(), bars = window.len(), required, "Not enough history for IQR");
            return Ok(Vec::new());
        }

        let returns = window.returns();
        let mut findings = Vec::new();

        for i in window.evaluation_range(config.scan, required) {
            let Some(sample) = stats::trailing(returns, i, config.iqr_window) else {
                continue;
            };
            let Some(bounds) = IqrBounds::from_sample(&sample, config.iqr_multiplier) else {
                continue;
            };
            let daily_return = sample[sample.len() - 1];
            let Some(score) = bounds.breach(daily_return) else {
                continue;
            };

            let details = json!({
                "daily_return": daily_return,
                "q1": bounds.q1,
                "q3": bounds.q3,
                "iqr": bounds.iqr(),
                "lower_bound": bounds.lower(),
                "upper_bound": bounds.upper(),
                "close_price": window.closes()[i],
                "direction": Direction::from_change(daily_return).as_str(),
            });
            findings.push(Finding::new(
                window.symbol(),
                window.timestamps()[i],
                self.method(),
                score,
                details,
            )?);
        }

        Ok(findings)
    }
}
