use crate::error::DetectorError;
use crate::stats::{self, EPSILON};
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Direction, Finding};
use serde_json::json;
use tracing::debug;

/// Flags traded volume far from its trailing mean.
#[derive(Debug, Default, Clone, Copy)]
pub struct VolumeDetector;

impl Detector for VolumeDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::VolumeAnomaly
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        config.volume_window
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        if config.volume_window < 2 {
            return Err(DetectorError::InvalidParameters(
                "volume_window must be at least 2".to_string(),
            ));
        }
        let required = self.required_history(config);
        if window.len() < required {
            debug!(symbol = window.symbol(), bars = window.len(), required, "Not enough history for volume");
            return Ok(Vec::new());
        }

        let volumes = window.volumes();
        let returns = window.returns();
        let mut findings = Vec::new();

        for i in window.evaluation_range(config.scan, required) {
            let sample = &volumes[i + 1 - config.volume_window..=i];
            let (Some(mean), Some(std)) = (stats::mean(sample), stats::sample_std(sample)) else {
                continue;
            };
            if std <= EPSILON {
                continue;
            }

            let volume = volumes[i];
            let z = (volume - mean) / std;
            if z.abs() > config.volume_zscore_threshold {
                let details = json!({
                    "volume": volume,
                    "volume_mean": mean,
                    "volume_std": std,
                    "volume_zscore": z,
                    "price_change_pct": returns[i],
                    "close_price": window.closes()[i],
                    "direction": Direction::from_change(z).as_str(),
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
