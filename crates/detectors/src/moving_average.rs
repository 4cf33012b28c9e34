use crate::error::DetectorError;
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Direction, Finding};
use serde_json::json;
use ta::Next as _;
use ta::indicators::SimpleMovingAverage as Sma;
use tracing::debug;

/// Flags closes that stray more than a percentage from their simple moving average.
#[derive(Debug, Default, Clone, Copy)]
pub struct MovingAverageDetector;

impl Detector for MovingAverageDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::MovingAverage
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        config.ma_window
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        let required = self.required_history(config);
        if window.len() < required {
            debug!(symbol = window.symbol(), bars = window.len(), required, "Not enough history for moving average");
            return Ok(Vec::new());
        }

        let mut sma = Sma::new(config.ma_window)
            .map_err(|e| DetectorError::InvalidParameters(format!("Failed to initialize SMA: {:?}", e)))?;
        let averages: Vec<f64> = window.closes().iter().map(|c| sma.next(*c)).collect();

        let mut findings = Vec::new();
        for i in window.evaluation_range(config.scan, required) {
            let close = window.closes()[i];
            let ma = averages[i];
            if ma == 0.0 {
                continue;
            }
            let deviation_pct = (close - ma) / ma * 100.0;
            if deviation_pct.abs() > config.ma_threshold_pct {
                let details = json!({
                    "close_price": close,
                    "moving_average": ma,
                    "deviation_pct": deviation_pct,
                    "threshold_pct": config.ma_threshold_pct,
                    "direction": Direction::from_deviation(deviation_pct).as_str(),
                });
                findings.push(Finding::new(
                    window.symbol(),
                    window.timestamps()[i],
                    self.method(),
                    deviation_pct.abs(),
                    details,
                )?);
            }
        }

        Ok(findings)
    }
}
