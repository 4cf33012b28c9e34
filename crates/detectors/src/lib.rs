//! # MarketPulse Detector Library
//!
//! This crate contains the anomaly detection algorithms. It defines a universal
//! `Detector` trait and six concrete implementations.
//!
//! ## Architectural Principles
//!
//! - **Layer 1 Logic:** A pure logic crate with no knowledge of databases or
//!   scheduling. It depends only on `core-types` and `configuration`.
//! - **Stateless Detectors:** A detector holds no state between calls. Everything it
//!   needs arrives as a `SeriesWindow` and a `DetectionConfig`, so identical inputs
//!   always produce identical findings and one window can be shared across threads.
//! - **Extensibility:** Adding a detector means adding a `DetectionMethod` variant, a
//!   module implementing `Detector`, and a match arm in `factory`.
//!
//! ## Public API
//!
//! - `Detector`: The trait all detectors implement.
//! - `create_detector`: The factory mapping a `DetectionMethod` to its detector.
//! - `SeriesWindow`: The validated, `f64` view of an instrument's recent bars.
//! - The concrete detectors (e.g. `ZScoreDetector`) and `stats` helpers.

// Declare all the modules that constitute this crate.
pub mod error;
pub mod factory;
pub mod iqr;
pub mod isolation_forest;
pub mod moving_average;
pub mod stats;
pub mod technical;
pub mod volume;
pub mod window;
pub mod zscore;

// Re-export the key components to create a clean, public-facing API.
pub use error::{DetectorError, WindowError};
pub use factory::create_detector;
pub use iqr::IqrDetector;
pub use isolation_forest::IsolationForestDetector;
pub use moving_average::MovingAverageDetector;
pub use technical::TechnicalDetector;
pub use volume::VolumeDetector;
pub use window::SeriesWindow;
pub use zscore::ZScoreDetector;

use configuration::DetectionConfig;
use core_types::{DetectionMethod, Finding};

/// The contract every anomaly detector implements.
///
/// The `Send + Sync` bounds let the engine run detectors on blocking worker
/// threads against a shared window.
pub trait Detector: Send + Sync {
    /// The method this detector implements. Also fixes the anomaly type it emits.
    fn method(&self) -> DetectionMethod;

    /// Minimum number of bars before the detector can evaluate anything.
    fn required_history(&self, config: &DetectionConfig) -> usize;

    /// Evaluates the bars selected by `config.scan`.
    ///
    /// # Returns
    ///
    /// * `Ok(vec![])` - if the window is too short or nothing is anomalous.
    /// * `Ok(findings)` - one finding per anomalous bar, in timestamp order.
    /// * `Err(DetectorError)` - for invalid parameters or a numeric fault.
    fn detect(
        &self,
        window: &SeriesWindow,
        config: &DetectionConfig,
    ) -> Result<Vec<Finding>, DetectorError>;
}
