use crate::error::EngineError;
use crate::reconciler::reconcile;
use crate::report::{DetectorFailure, InstrumentOutcome, RunReport};
use chrono::Utc;
use configuration::DetectionConfig;
use core_types::{DetectionMethod, Finding};
use database::{BarSource, DbError, FindingSink};
use detectors::{Detector, SeriesWindow, create_detector};
use futures::StreamExt;
use futures::future::join_all;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Everything one instrument contributed to a run.
struct SymbolRun {
    symbol: String,
    outcome: InstrumentOutcome,
    findings: Vec<Finding>,
    invocations: Vec<(DetectionMethod, Duration, bool)>,
    failures: Vec<DetectorFailure>,
    persistence_error: Option<DbError>,
}

impl SymbolRun {
    fn without_detection(symbol: String, outcome: InstrumentOutcome) -> Self {
        Self {
            symbol,
            outcome,
            findings: Vec::new(),
            invocations: Vec::new(),
            failures: Vec::new(),
            persistence_error: None,
        }
    }
}

/// Runs the enabled detectors over each instrument's recent bars and persists
/// the reconciled findings.
///
/// The orchestrator holds no state between runs; it can be re-run over the
/// same data and the sink ends up with the same rows.
pub struct Orchestrator {
    source: Arc<dyn BarSource>,
    sink: Arc<dyn FindingSink>,
    detectors: Vec<Arc<dyn Detector>>,
    config: Arc<DetectionConfig>,
    max_concurrent_symbols: usize,
}

impl Orchestrator {
    /// Validates `config` and instantiates one detector per enabled method.
    pub fn new(
        source: Arc<dyn BarSource>,
        sink: Arc<dyn FindingSink>,
        config: DetectionConfig,
        max_concurrent_symbols: usize,
    ) -> Result<Self, EngineError> {
        let mut seen = HashSet::new();
        let detectors: Vec<Arc<dyn Detector>> = config
            .enabled
            .iter()
            .filter(|method| seen.insert(**method))
            .map(|method| Arc::from(create_detector(*method)))
            .collect();

        Self::with_detectors(source, sink, config, detectors, max_concurrent_symbols)
    }

    /// Like `new`, but runs the given detectors instead of the enabled set.
    pub fn with_detectors(
        source: Arc<dyn BarSource>,
        sink: Arc<dyn FindingSink>,
        config: DetectionConfig,
        detectors: Vec<Arc<dyn Detector>>,
        max_concurrent_symbols: usize,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        Ok(Self {
            source,
            sink,
            detectors,
            config: Arc::new(config),
            max_concurrent_symbols: max_concurrent_symbols.max(1),
        })
    }

    pub fn config(&self) -> &DetectionConfig {
        &self.config
    }

    /// Runs every symbol, up to `max_concurrent_symbols` at a time.
    ///
    /// Per-instrument problems (unknown symbol, bad data, detector failures) are
    /// recorded in the report. A persistence failure stops the run and is returned
    /// as `EngineError::Persistence`.
    pub async fn run(&self, symbols: &[String]) -> Result<RunReport, EngineError> {
        let started = Instant::now();
        let mut report = RunReport::new(Utc::now());

        let mut unique = HashSet::new();
        let symbols: Vec<String> = symbols.iter().filter(|s| unique.insert(s.as_str())).cloned().collect();
        info!(count = symbols.len(), detectors = self.detectors.len(), "Starting detection run");

        let mut runs = futures::stream::iter(symbols)
            .map(|symbol| self.process_symbol(symbol))
            .buffer_unordered(self.max_concurrent_symbols);

        while let Some(run) = runs.next().await {
            let symbol = run.symbol.clone();
            if let Some(source) = absorb(&mut report, run) {
                report.elapsed = started.elapsed();
                error!(symbol = %symbol, error = %source, "Aborting run after persistence failure");
                return Err(EngineError::Persistence {
                    symbol,
                    source,
                    report: Box::new(report),
                });
            }
        }

        report.elapsed = started.elapsed();
        info!(
            findings = report.total_findings(),
            rows_written = report.rows_written(),
            failures = report.failures.len(),
            elapsed_ms = report.elapsed.as_millis() as u64,
            "Detection run complete"
        );
        Ok(report)
    }

    /// Runs a single symbol.
    pub async fn run_symbol(&self, symbol: &str) -> Result<RunReport, EngineError> {
        self.run(&[symbol.to_string()]).await
    }

    async fn process_symbol(&self, symbol: String) -> SymbolRun {
        let bars = match self.source.get_recent_bars(&symbol, self.config.lookback).await {
            Ok(bars) => bars,
            Err(DbError::UnknownSymbol(_)) => {
                warn!(symbol = %symbol, "Unknown symbol, skipping");
                return SymbolRun::without_detection(symbol, InstrumentOutcome::UnknownSymbol);
            }
            Err(e) => {
                error!(symbol = %symbol, error = %e, "Failed to read bars");
                let outcome = InstrumentOutcome::ReadFailed(e.to_string());
                return SymbolRun::without_detection(symbol, outcome);
            }
        };
        if bars.is_empty() {
            debug!(symbol = %symbol, "No bars returned");
            return SymbolRun::without_detection(symbol, InstrumentOutcome::NoData);
        }

        let window = match SeriesWindow::new(symbol.as_str(), &bars) {
            Ok(window) => Arc::new(window),
            Err(e) => {
                warn!(symbol = %symbol, error = %e, "Rejected window");
                let outcome = InstrumentOutcome::InvalidData(e.to_string());
                return SymbolRun::without_detection(symbol, outcome);
            }
        };

        let mut run = self.detect_all(&symbol, window).await;

        let findings = reconcile(std::mem::take(&mut run.findings));
        match self.sink.upsert_findings(&findings).await {
            Ok(rows_written) => {
                debug!(symbol = %symbol, count = findings.len(), rows_written, "Persisted findings");
                run.outcome = InstrumentOutcome::Processed { findings: findings.len(), rows_written };
            }
            Err(e) => {
                run.outcome = InstrumentOutcome::PersistenceFailed(e.to_string());
                run.persistence_error = Some(e);
            }
        }
        run.findings = findings;
        run
    }

    /// Runs every detector concurrently on the blocking pool against one shared window.
    async fn detect_all(&self, symbol: &str, window: Arc<SeriesWindow>) -> SymbolRun {
        let invocations = self.detectors.iter().map(|detector| {
            let detector = Arc::clone(detector);
            let window = Arc::clone(&window);
            let config = Arc::clone(&self.config);
            async move {
                let method = detector.method();
                let started = Instant::now();
                let result = tokio::task::spawn_blocking(move || detector.detect(&window, &config)).await;
                (method, started.elapsed(), result)
            }
        });

        let mut run = SymbolRun::without_detection(symbol.to_string(), InstrumentOutcome::NoData);
        for (method, elapsed, result) in join_all(invocations).await {
            let failure = match result {
                Ok(Ok(findings)) => {
                    debug!(symbol, %method, count = findings.len(), elapsed_ms = elapsed.as_millis() as u64, "Detector finished");
                    run.findings.extend(findings);
                    None
                }
                Ok(Err(e)) => Some(e.to_string()),
                Err(join_error) if join_error.is_panic() => Some("detector panicked".to_string()),
                Err(join_error) => Some(join_error.to_string()),
            };
            if let Some(message) = &failure {
                error!(symbol, %method, error = %message, "Detector failed");
                run.failures.push(DetectorFailure {
                    symbol: symbol.to_string(),
                    method,
                    message: message.clone(),
                });
            }
            run.invocations.push((method, elapsed, failure.is_some()));
        }
        run
    }
}

/// Folds one instrument into the report. Returns the persistence error, if any.
fn absorb(report: &mut RunReport, run: SymbolRun) -> Option<DbError> {
    for (method, elapsed, failed) in run.invocations {
        report.record_invocation(method, elapsed, failed);
    }
    if matches!(run.outcome, InstrumentOutcome::Processed { .. }) {
        for finding in &run.findings {
            report.record_finding(finding.method(), finding.anomaly_type());
        }
    }
    report.failures.extend(run.failures);
    report.instruments.insert(run.symbol, run.outcome);
    run.persistence_error
}
