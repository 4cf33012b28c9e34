use chrono::{DateTime, Utc};
use core_types::{AnomalyType, DetectionMethod};
use std::collections::BTreeMap;
use std::time::Duration;

/// What happened to one instrument during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstrumentOutcome {
    /// Detectors ran; `findings` survived reconciliation and `rows_written` were persisted.
    Processed { findings: usize, rows_written: u64 },
    /// The source returned no bars.
    NoData,
    /// The source has never seen the symbol.
    UnknownSymbol,
    /// The bars could not be read.
    ReadFailed(String),
    /// The bars were rejected when building the window.
    InvalidData(String),
    /// Writing the batch failed; the run stopped here.
    PersistenceFailed(String),
}

impl InstrumentOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            InstrumentOutcome::Processed { .. } => "processed",
            InstrumentOutcome::NoData => "no data",
            InstrumentOutcome::UnknownSymbol => "unknown symbol",
            InstrumentOutcome::ReadFailed(_) => "read failed",
            InstrumentOutcome::InvalidData(_) => "invalid data",
            InstrumentOutcome::PersistenceFailed(_) => "persistence failed",
        }
    }
}

/// Cumulative cost of one detector across all instruments in a run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DetectorStats {
    pub invocations: u64,
    pub failures: u64,
    pub total_elapsed: Duration,
}

/// A detector that returned an error or panicked for one instrument.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectorFailure {
    pub symbol: String,
    pub method: DetectionMethod,
    pub message: String,
}

/// The observable result of a run, returned to the caller.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    pub findings_by_kind: BTreeMap<(DetectionMethod, AnomalyType), usize>,
    pub detectors: BTreeMap<DetectionMethod, DetectorStats>,
    pub instruments: BTreeMap<String, InstrumentOutcome>,
    pub failures: Vec<DetectorFailure>,
}

impl RunReport {
    pub fn new(started_at: DateTime<Utc>) -> Self {
        Self {
            started_at,
            elapsed: Duration::ZERO,
            findings_by_kind: BTreeMap::new(),
            detectors: BTreeMap::new(),
            instruments: BTreeMap::new(),
            failures: Vec::new(),
        }
    }

    pub fn total_findings(&self) -> usize {
        self.findings_by_kind.values().sum()
    }

    pub fn rows_written(&self) -> u64 {
        self.instruments
            .values()
            .map(|outcome| match outcome {
                InstrumentOutcome::Processed { rows_written, .. } => *rows_written,
                _ => 0,
            })
            .sum()
    }

    pub fn findings_for(&self, method: DetectionMethod) -> usize {
        self.findings_by_kind
            .get(&(method, method.anomaly_type()))
            .copied()
            .unwrap_or(0)
    }

    pub(crate) fn record_invocation(&mut self, method: DetectionMethod, elapsed: Duration, failed: bool) {
        let stats = self.detectors.entry(method).or_default();
        stats.invocations += 1;
        stats.total_elapsed += elapsed;
        if failed {
            stats.failures += 1;
        }
    }

    pub(crate) fn record_finding(&mut self, method: DetectionMethod, anomaly_type: AnomalyType) {
        *self.findings_by_kind.entry((method, anomaly_type)).or_default() += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn totals_aggregate_across_instruments() {
        let mut report = RunReport::new(Utc::now());
        report.record_finding(DetectionMethod::Zscore, AnomalyType::PriceMovement);
        report.record_finding(DetectionMethod::Zscore, AnomalyType::PriceMovement);
        report.record_finding(DetectionMethod::VolumeAnomaly, AnomalyType::VolumeSpike);
        report.instruments.insert("A".into(), InstrumentOutcome::Processed { findings: 2, rows_written: 2 });
        report.instruments.insert("B".into(), InstrumentOutcome::Processed { findings: 1, rows_written: 1 });
        report.instruments.insert("C".into(), InstrumentOutcome::UnknownSymbol);

        assert_eq!(report.total_findings(), 3);
        assert_eq!(report.findings_for(DetectionMethod::Zscore), 2);
        assert_eq!(report.findings_for(DetectionMethod::Iqr), 0);
        assert_eq!(report.rows_written(), 3);
    }

    #[test]
    fn invocation_stats_accumulate() {
        let mut report = RunReport::new(Utc::now());
        report.record_invocation(DetectionMethod::Iqr, Duration::from_millis(3), false);
        report.record_invocation(DetectionMethod::Iqr, Duration::from_millis(4), true);

        let stats = report.detectors[&DetectionMethod::Iqr];
        assert_eq!(stats.invocations, 2);
        assert_eq!(stats.failures, 1);
        assert_eq!(stats.total_elapsed, Duration::from_millis(7));
    }
}
