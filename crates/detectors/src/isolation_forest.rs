//! Multivariate outlier detection with an isolation forest.
//!
//! Outliers are isolated by fewer random axis-aligned splits than inliers, so
//! their average path length over many random trees is short.

use crate::error::DetectorError;
use crate::stats::{self, EPSILON};
use crate::window::SeriesWindow;
use crate::Detector;
use configuration::{DetectionConfig, ScanMode};
use core_types::{DetectionMethod, Direction, Finding};
use ndarray::{Array2, ArrayView1};
use rand::prelude::*;
use rand::seq::index;
use serde_json::json;
use tracing::debug;

/// Euler-Mascheroni constant.
const EULER_GAMMA: f64 = 0.577_215_664_9;
const MAX_SAMPLES: usize = 256;
const FEATURES: [&str; 4] = ["daily_return", "volume_change", "price_range", "rolling_volatility"];

#[derive(Debug)]
enum Node {
    Internal {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
    Leaf {
        size: usize,
    },
}

impl Node {
    fn build(data: &Array2<f64>, rows: Vec<usize>, depth: usize, max_depth: usize, rng: &mut StdRng) -> Self {
        if depth >= max_depth || rows.len() <= 1 {
            return Node::Leaf { size: rows.len() };
        }

        let feature = rng.gen_range(0..data.ncols());
        let (min, max) = rows.iter().fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &r| {
            let v = data[[r, feature]];
            (lo.min(v), hi.max(v))
        });
        if max - min < 1e-10 {
            return Node::Leaf { size: rows.len() };
        }

        let threshold = rng.gen_range(min..max);
        let (left, right): (Vec<usize>, Vec<usize>) =
            rows.iter().partition(|&&r| data[[r, feature]] < threshold);
        if left.is_empty() || right.is_empty() {
            return Node::Leaf { size: rows.len() };
        }

        Node::Internal {
            feature,
            threshold,
            left: Box::new(Node::build(data, left, depth + 1, max_depth, rng)),
            right: Box::new(Node::build(data, right, depth + 1, max_depth, rng)),
        }
    }

    fn path_length(&self, sample: ArrayView1<f64>, depth: usize) -> f64 {
        match self {
            Node::Leaf { size } => depth as f64 + average_path_length(*size),
            Node::Internal { feature, threshold, left, right } => {
                if sample[*feature] < *threshold {
                    left.path_length(sample, depth + 1)
                } else {
                    right.path_length(sample, depth + 1)
                }
            }
        }
    }
}

/// Average path length of an unsuccessful binary-search-tree lookup among `n` items.
fn average_path_length(n: usize) -> f64 {
    match n {
        0 | 1 => 0.0,
        2 => 1.0,
        _ => {
            let n = n as f64;
            2.0 * (n.ln() + EULER_GAMMA) - 2.0 * (n - 1.0) / n
        }
    }
}

/// A fitted forest of isolation trees.
#[derive(Debug)]
pub struct IsolationForest {
    trees: Vec<Node>,
    sample_size: usize,
}

impl IsolationForest {
    /// Fits `n_estimators` trees, each on a sub-sample of `min(256, rows)` rows
    /// drawn without replacement. The same seed always yields the same forest.
    pub fn fit(data: &Array2<f64>, n_estimators: usize, seed: u64) -> Self {
        let n = data.nrows();
        let sample_size = MAX_SAMPLES.min(n);
        let max_depth = (sample_size.max(1) as f64).log2().ceil() as usize;
        let mut rng = StdRng::seed_from_u64(seed);

        let trees = (0..n_estimators)
            .map(|_| {
                let rows = index::sample(&mut rng, n, sample_size).into_vec();
                Node::build(data, rows, 0, max_depth, &mut rng)
            })
            .collect();

        Self { trees, sample_size }
    }

    /// `2^(-E[h(x)] / c(psi))` per row. Values near 1 are outliers.
    pub fn score_samples(&self, data: &Array2<f64>) -> Vec<f64> {
        let c = average_path_length(self.sample_size);
        data.rows()
            .into_iter()
            .map(|row| {
                if self.trees.is_empty() || c <= 0.0 {
                    return 0.5;
                }
                let mean_path = self.trees.iter().map(|t| t.path_length(row, 0)).sum::<f64>()
                    / self.trees.len() as f64;
                2.0_f64.powf(-mean_path / c)
            })
            .collect()
    }
}

/// The `ceil(n * contamination)`-th highest score.
fn cutoff(scores: &[f64], contamination: f64) -> Option<f64> {
    if scores.is_empty() {
        return None;
    }
    let mut sorted = scores.to_vec();
    sorted.sort_by(|a, b| b.total_cmp(a));
    let k = ((scores.len() as f64 * contamination).ceil() as usize).clamp(1, scores.len());
    Some(sorted[k - 1])
}

/// Feature rows for every bar where all four features are defined, with the
/// bar index each row came from.
fn feature_matrix(window: &SeriesWindow, volatility_window: usize) -> (Array2<f64>, Vec<usize>) {
    let returns = window.returns();
    let volume_change = window.volume_change();
    let price_range = window.price_range();

    let mut values = Vec::new();
    let mut bars = Vec::new();
    for i in 0..window.len() {
        let volatility = stats::trailing(returns, i, volatility_window)
            .and_then(|sample| stats::sample_std(&sample));
        if let (Some(r), Some(v), Some(p), Some(s)) = (returns[i], volume_change[i], price_range[i], volatility) {
            values.extend([r, v, p, s]);
            bars.push(i);
        }
    }

    let matrix = Array2::from_shape_vec((bars.len(), FEATURES.len()), values)
        .unwrap_or_else(|_| Array2::zeros((0, FEATURES.len())));
    (matrix, bars)
}

/// Flags bars whose joint return, volume, range and volatility profile is easy to isolate.
#[derive(Debug, Default, Clone, Copy)]
pub struct IsolationForestDetector;

impl Detector for IsolationForestDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::IsolationForest
    }

    fn required_history(&self, config: &DetectionConfig) -> usize {
        // Rolling volatility is first defined at bar `volatility_window`.
        config.isolation_min_rows + config.volatility_window
    }

    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError> {
        if !(config.isolation_contamination > 0.0 && config.isolation_contamination <= 0.5) {
            return Err(DetectorError::InvalidParameters(format!(
                "isolation_contamination must be in (0, 0.5], got {}",
                config.isolation_contamination
            )));
        }
        if config.isolation_estimators == 0 || config.volatility_window < 2 {
            return Err(DetectorError::InvalidParameters(
                "isolation_estimators must be positive and volatility_window at least 2".to_string(),
            ));
        }

        let (matrix, bars) = feature_matrix(window, config.volatility_window);
        if bars.len() < config.isolation_min_rows.max(2) {
            debug!(symbol = window.symbol(), rows = bars.len(), "Not enough feature rows for isolation forest");
            return Ok(Vec::new());
        }

        let forest = IsolationForest::fit(&matrix, config.isolation_estimators, config.isolation_seed);
        let scores = forest.score_samples(&matrix);
        let Some(cutoff) = cutoff(&scores, config.isolation_contamination) else {
            return Ok(Vec::new());
        };

        let min = scores.iter().copied().fold(f64::INFINITY, f64::min);
        let max = scores.iter().copied().fold(f64::NEG_INFINITY, f64::max);
        if max - min <= EPSILON {
            return Ok(Vec::new());
        }

        let last_bar = window.len() - 1;
        let mut findings = Vec::new();
        for (row, &bar) in bars.iter().enumerate() {
            if config.scan == ScanMode::Latest && bar != last_bar {
                continue;
            }
            let raw = scores[row];
            if raw < cutoff {
                continue;
            }

            let features = matrix.row(row);
            let mut details = json!({
                "raw_score": raw,
                "cutoff": cutoff,
                "close_price": window.closes()[bar],
                "direction": Direction::from_change(features[0]).as_str(),
            });
            for (name, value) in FEATURES.iter().zip(features.iter()) {
                details[*name] = json!(value);
            }

            findings.push(Finding::new(
                window.symbol(),
                window.timestamps()[bar],
                self.method(),
                (raw - min) / (max - min) * 10.0,
                details,
            )?);
        }

        Ok(findings)
    }
}
