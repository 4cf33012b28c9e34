use crate::Detector;
use crate::iqr::IqrDetector;
use crate::isolation_forest::IsolationForestDetector;
use crate::moving_average::MovingAverageDetector;
use crate::technical::TechnicalDetector;
use crate::volume::VolumeDetector;
use crate::zscore::ZScoreDetector;
use core_types::DetectionMethod;

/// Creates the detector for a method.
///
/// Detectors are stateless, so construction cannot fail; parameters are checked
/// when `detect` is called with a concrete `DetectionConfig`.
pub fn create_detector(method: DetectionMethod) -> Box<dyn Detector> {
    // The compiler errors here if a new DetectionMethod is added but not handled.
    match method {
        DetectionMethod::Zscore => Box::new(ZScoreDetector),
        DetectionMethod::Iqr => Box::new(IqrDetector),
        DetectionMethod::IsolationForest => Box::new(IsolationForestDetector),
        DetectionMethod::MovingAverage => Box::new(MovingAverageDetector),
        DetectionMethod::VolumeAnomaly => Box::new(VolumeDetector),
        DetectionMethod::TechnicalIndicators => Box::new(TechnicalDetector),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn every_method_maps_to_its_own_detector() {
        for method in DetectionMethod::ALL {
            assert_eq!(create_detector(method).method(), method);
        }
    }
}
