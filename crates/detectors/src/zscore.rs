use crate::error::DetectorError;
use crate::stats::{self, EPSILON};
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Direction, Finding};
use serde_json::json;
use tracing::debug;

/// Flags daily returns far from their trailing mean, measured in sample standard deviations.
#[derive(Debug, Default, Clone, Copy)]
pub struct ZScoreDetector;

impl Detector for ZScoreDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Zscore
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        config.rolling_window + 1
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        if config.rolling_window < 2 {
            return Err(DetectorError::InvalidParameters(
                "rolling_window must be at least 2".to_string(),
            ));
        }
        let required = self.required_history(config);
        if window.len() < required {
            debug!(symbol = window.symbol(), bars = window.len(), required, "Not enough history for z-score");
            return Ok(Vec::new());
        }

        let returns = window.returns();
        let mut findings = Vec::new();

        for i in window.evaluation_range(config.scan, required) {
            let Some(sample) = stats::trailing(returns, i, config.rolling_window) else {
                continue;
            };
            let (Some(mu), Some(sigma)) = (stats::mean(&sample), stats::sample_std(&sample)) else {
                continue;
            };
            if sigma <= EPSILON {
                continue;
            }

            let daily_return = sample[sample.len() - 1];
            let z = (daily_return - mu) / sigma;
            if z.abs() > config.zscore_threshold {
                let details = json!({
                    "daily_return": daily_return,
                    "zscore": z,
                    "rolling_mean": mu,
                    "rolling_std": sigma,
                    "threshold": config.zscore_threshold,
                    "close_price": window.closes()[i],
                    "direction": Direction::from_change(daily_return).as_str(),
                });
                findings.push(Finding::new(
                    window.symbol(),
                    window.timestamps()[i],
                    self.method(),
                    z.abs(),
                    details,
                )?);
            }
        }

        Ok(findings)
    }
}
