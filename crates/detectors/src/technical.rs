use crate::error::DetectorError;
use crate::stats::{self, EPSILON};
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Finding};
use serde_json::json;
use ta::Next as _;
use ta::indicators::SimpleMovingAverage as Sma;
use tracing::debug;

/// One indicator condition met by a bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Breach {
    signal: &'static str,
    score: f64,
}

/// Bollinger bands at one bar.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Bands {
    lower: f64,
    middle: f64,
    upper: f64,
}

/// RSI at `end` from the plain averages of gains and losses over the last
/// `period` close-to-close changes. `None` before enough history, or when
/// nothing moved.
fn rsi(closes: &[f64], end: usize, period: usize) -> Option<f64> {
    if period == 0 || end < period || end >= closes.len() {
        return None;
    }
    let (gains, losses) = closes[end - period..=end]
        .windows(2)
        .map(|pair| pair[1] - pair[0])
        .fold((0.0, 0.0), |(g, l), delta| {
            if delta > 0.0 { (g + delta, l) } else { (g, l - delta) }
        });
    let (gain, loss) = (gains / period as f64, losses / period as f64);
    if gain + loss <= 0.0 {
        return None;
    }
    Some(100.0 * gain / (gain + loss))
}

/// Flags RSI extremes and closes outside the Bollinger bands.
///
/// A bar that breaches several conditions yields one finding scored by the
/// strongest breach, with every breach listed in `details.signals`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TechnicalDetector;

impl Detector for TechnicalDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::TechnicalIndicators
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        (config.rsi_period + 1).max(config.bollinger_period)
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        if config.rsi_period == 0 || config.bollinger_period < 2 {
            return Err(DetectorError::InvalidParameters(format!(
                "rsi_period {} / bollinger_period {} out of range",
                config.rsi_period, config.bollinger_period
            )));
        }
        let required = self.required_history(config);
        if window.len() < required {
            debug!(symbol = window.symbol(), bars = window.len(), required, "Not enough history for indicators");
            return Ok(Vec::new());
        }

        let closes = window.closes();
        let mut sma = Sma::new(config.bollinger_period)
            .map_err(|e| DetectorError::InvalidParameters(format!("Failed to initialize SMA: {:?}", e)))?;
        let middles: Vec<f64> = closes.iter().map(|c| sma.next(*c)).collect();

        let mut findings = Vec::new();
        for i in window.evaluation_range(config.scan, required) {
            let close = closes[i];
            let rsi_value = rsi(closes, i, config.rsi_period);
            let bands = (i + 1 >= config.bollinger_period)
                .then(|| stats::sample_std(&closes[i + 1 - config.bollinger_period..=i]))
                .flatten()
                .map(|std| Bands {
                    lower: middles[i] - config.bollinger_k * std,
                    middle: middles[i],
                    upper: middles[i] + config.bollinger_k * std,
                });
            if rsi_value.is_some_and(|v| !v.is_finite())
                || bands.is_some_and(|b| !b.lower.is_finite() || !b.upper.is_finite())
            {
                return Err(DetectorError::IndicatorError(format!(
                    "non-finite indicator value at {}",
                    window.timestamps()[i]
                )));
            }

            let mut breaches = Vec::new();
            if let Some(value) = rsi_value {
                let score = (value - 50.0).abs() / 20.0;
                if value > config.rsi_overbought {
                    breaches.push(Breach { signal: "rsi_overbought", score });
                } else if value < config.rsi_oversold {
                    breaches.push(Breach { signal: "rsi_oversold", score });
                }
            }

            if let Some(bands) = bands {
                let width = bands.upper - bands.lower;
                if width > EPSILON {
                    if close > bands.upper {
                        breaches.push(Breach {
                            signal: "above_upper_band",
                            score: (close - bands.upper) / width,
                        });
                    } else if close < bands.lower {
                        breaches.push(Breach {
                            signal: "below_lower_band",
                            score: (bands.lower - close) / width,
                        });
                    }
                }
            }

            // First breach wins a tie.
            let Some(strongest) = breaches
                .iter()
                .copied()
                .reduce(|best, b| if b.score > best.score { b } else { best })
            else {
                continue;
            };

            let signals: Vec<&str> = breaches.iter().map(|b| b.signal).collect();
            let details = json!({
                "rsi": rsi_value,
                "bb_upper": bands.map(|b| b.upper),
                "bb_middle": bands.map(|b| b.middle),
                "bb_lower": bands.map(|b| b.lower),
                "close_price": close,
                "signals": signals,
                "condition": strongest.signal,
            });
            findings.push(Finding::new(
                window.symbol(),
                window.timestamps()[i],
                self.method(),
                strongest.score,
                details,
            )?);
        }

        Ok(findings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::window::test_support::{bars, closes_from_returns};
    use approx::assert_relative_eq;
    use configuration::ScanMode;
    use std::collections::HashSet;

    fn window(closes: &[f64]) -> SeriesWindow {
        SeriesWindow::new("TEST", &bars("TEST", closes, &vec![100; closes.len()])).unwrap()
    }

    #[test]
    fn rsi_is_the_share_of_average_gain() {
        let closes = [100.0, 102.0, 101.0, 104.0, 103.0];
        // gains 2 + 3, losses 1 + 1 over four changes
        assert_relative_eq!(rsi(&closes, 4, 4).unwrap(), 500.0 / 7.0, epsilon = 1e-12);
        assert_relative_eq!(rsi(&closes, 4, 2).unwrap(), 75.0, epsilon = 1e-12);
        assert!(rsi(&closes, 3, 4).is_none());
        assert!(rsi(&[100.0; 6], 5, 4).is_none());
        assert_relative_eq!(rsi(&[1.0, 2.0, 3.0], 2, 2).unwrap(), 100.0);
    }

    #[test]
    fn flat_prices_breach_nothing() {
        let findings = TechnicalDetector.detect(&window(&[100.0; 40]), &DetectionConfig::default()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn steady_rally_is_overbought() {
        let closes = closes_from_returns(100.0, &[1.0; 39]);
        let findings = TechnicalDetector.detect(&window(&closes), &DetectionConfig::default()).unwrap();

        assert_eq!(findings.len(), 1);
        let details = findings[0].details();
        assert_eq!(details["condition"], "rsi_overbought");
        assert!(details["rsi"].as_f64().unwrap() > 70.0);
        assert_relative_eq!(
            findings[0].score(),
            (details["rsi"].as_f64().unwrap() - 50.0) / 20.0,
            epsilon = 1e-12
        );
    }

    #[test]
    fn simultaneous_breaches_merge_into_one_finding() {
        let mut closes = vec![100.0; 25];
        closes.push(110.0);
        let findings = TechnicalDetector.detect(&window(&closes), &DetectionConfig::default()).unwrap();

        assert_eq!(findings.len(), 1);
        let signals = findings[0].details()["signals"].as_array().unwrap().clone();
        assert_eq!(signals.len(), 2);
        assert!(signals.contains(&json!("rsi_overbought")));
        assert!(signals.contains(&json!("above_upper_band")));
        assert_eq!(findings[0].details()["condition"], "rsi_overbought");
    }

    #[test]
    fn short_window_is_silent() {
        let findings = TechnicalDetector.detect(&window(&[100.0; 10]), &DetectionConfig::default()).unwrap();
        assert!(findings.is_empty());
    }

    #[test]
    fn steady_decline_is_oversold() {
        let closes = closes_from_returns(100.0, &[-1.0; 39]);
        let findings = TechnicalDetector.detect(&window(&closes), &DetectionConfig::default()).unwrap();

        assert_eq!(findings.len(), 1);
        let details = findings[0].details();
        assert_eq!(details["condition"], "rsi_oversold");
        assert_eq!(details["signals"], json!(["rsi_oversold"]));
        assert_relative_eq!(details["rsi"].as_f64().unwrap(), 0.0);
        assert_relative_eq!(findings[0].score(), 2.5);
    }

    #[test]
    fn close_above_upper_band_is_scored_by_band_width() {
        // Alternating 100/101, then a jump to 103. RSI over the last 14 changes is 56.25.
        let mut closes: Vec<f64> = (0..29).map(|i| 100.0 + (i % 2) as f64).collect();
        closes.push(103.0);

        let findings = TechnicalDetector.detect(&window(&closes), &DetectionConfig::default()).unwrap();

        assert_eq!(findings.len(), 1);
        let details = findings[0].details();
        assert_eq!(details["condition"], "above_upper_band");
        assert_eq!(details["signals"], json!(["above_upper_band"]));
        assert_relative_eq!(details["rsi"].as_f64().unwrap(), 56.25, epsilon = 1e-9);

        let middle = 100.6;
        let std = (10.8_f64 / 19.0).sqrt();
        let (upper, lower) = (middle + 2.0 * std, middle - 2.0 * std);
        assert_relative_eq!(details["bb_upper"].as_f64().unwrap(), upper, epsilon = 1e-9);
        assert_relative_eq!(findings[0].score(), (103.0 - upper) / (upper - lower), epsilon = 1e-9);
    }

    #[test]
    fn zero_width_band_adds_no_band_signal() {
        let mut closes = closes_from_returns(100.0, &[1.0; 29]);
        let last = *closes.last().unwrap();
        closes.extend([last; 10]);
        let config = DetectionConfig { bollinger_period: 5, ..DetectionConfig::default() };

        let findings = TechnicalDetector.detect(&window(&closes), &config).unwrap();

        assert_eq!(findings.len(), 1);
        let details = findings[0].details();
        assert_eq!(details["signals"], json!(["rsi_overbought"]));
        assert_relative_eq!(
            details["bb_upper"].as_f64().unwrap(),
            details["bb_lower"].as_f64().unwrap(),
            epsilon = 1e-9
        );
    }

    fn choppy_closes() -> Vec<f64> {
        let mut returns: Vec<f64> = (0..55).map(|i| ((i * 7) % 11) as f64 * 0.4 - 2.0).collect();
        returns[30] = 6.0;
        returns[44] = -7.0;
        closes_from_returns(100.0, &returns)
    }

    #[test]
    fn stricter_levels_never_add_findings() {
        let window = window(&choppy_closes());
        let flagged = |oversold: f64, overbought: f64, k: f64| -> HashSet<_> {
            let config = DetectionConfig {
                scan: ScanMode::FullWindow,
                rsi_oversold: oversold,
                rsi_overbought: overbought,
                bollinger_k: k,
                ..DetectionConfig::default()
            };
            TechnicalDetector.detect(&window, &config).unwrap().iter().map(|f| f.timestamp()).collect()
        };

        let loose = flagged(40.0, 60.0, 1.5);
        let default = flagged(30.0, 70.0, 2.0);
        let strict = flagged(20.0, 80.0, 3.0);
        assert!(!loose.is_empty());
        assert!(default.is_subset(&loose));
        assert!(strict.is_subset(&default));
    }

    #[test]
    fn window_longer_than_the_series_is_silent() {
        let config = DetectionConfig { bollinger_period: 80, scan: ScanMode::FullWindow, ..DetectionConfig::default() };
        assert!(TechnicalDetector.detect(&window(&choppy_closes()), &config).unwrap().is_empty());
    }

    #[test]
    fn repeated_runs_are_identical() {
        let window = window(&choppy_closes());
        let config = DetectionConfig { scan: ScanMode::FullWindow, ..DetectionConfig::default() };
        assert_eq!(
            TechnicalDetector.detect(&window, &config).unwrap(),
            TechnicalDetector.detect(&window, &config).unwrap()
        );
    }
}
