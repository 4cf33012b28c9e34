use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use configuration::DetectionConfig;
use core_types::{AnomalyType, Bar, DetectionMethod, Finding};
use database::{BarSource, DbError, FindingSink, MemoryStore};
use detectors::{Detector, DetectorError, SeriesWindow, ZScoreDetector};
use engine::{EngineError, InstrumentOutcome, Orchestrator};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use std::sync::Arc;

fn bars(symbol: &str, closes: &[f64], volumes: &[i64]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    closes
        .iter()
        .zip(volumes)
        .enumerate()
        .map(|(i, (close, volume))| {
            let close = Decimal::from_f64(*close).unwrap().round_dp(4);
            Bar {
                symbol: symbol.to_string(),
                timestamp: start + Duration::days(i as i64),
                open: close,
                high: close * rust_decimal_macros::dec!(1.01),
                low: close * rust_decimal_macros::dec!(0.99),
                close,
                volume: *volume,
            }
        })
        .collect()
}

/// 30 daily returns of +0.1% followed by a -8.5% day.
fn sharp_drop(symbol: &str) -> Vec<Bar> {
    let mut closes = vec![100.0];
    for _ in 0..30 {
        closes.push(closes.last().unwrap() * 1.001);
    }
    closes.push(closes.last().unwrap() * (1.0 - 0.085));
    bars(symbol, &closes, &vec![1_000_000; closes.len()])
}

fn volume_spike(symbol: &str) -> Vec<Bar> {
    let mut volumes = vec![1_000_000; 29];
    volumes.push(9_000_000);
    bars(symbol, &[50.0; 30], &volumes)
}

fn symbols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

async fn seeded_store(series: Vec<Vec<Bar>>) -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    for bars in series {
        store.insert_bars(bars).await;
    }
    store
}

fn orchestrator(store: &Arc<MemoryStore>, config: DetectionConfig) -> Orchestrator {
    Orchestrator::new(store.clone(), store.clone(), config, 4).unwrap()
}

#[tokio::test]
async fn sharp_drop_yields_one_zscore_finding_on_the_last_bar() {
    let store = seeded_store(vec![sharp_drop("TEST")]).await;
    let config = DetectionConfig { zscore_threshold: 2.5, ..DetectionConfig::default() };

    let report = orchestrator(&store, config).run_symbol("TEST").await.unwrap();

    assert_eq!(report.findings_for(DetectionMethod::Zscore), 1);
    let stored: Vec<Finding> = store
        .findings()
        .await
        .into_iter()
        .filter(|f| f.method() == DetectionMethod::Zscore)
        .collect();
    assert_eq!(stored.len(), 1);
    let finding = &stored[0];
    assert_eq!(finding.anomaly_type(), AnomalyType::PriceMovement);
    assert_eq!(finding.timestamp(), sharp_drop("TEST").last().unwrap().timestamp);
    assert_eq!(finding.details()["direction"], "drop");
    assert!(finding.score() > 2.5);
}

#[tokio::test]
async fn ninefold_volume_yields_a_volume_spike() {
    let store = seeded_store(vec![volume_spike("VOL")]).await;

    let report = orchestrator(&store, DetectionConfig::default()).run_symbol("VOL").await.unwrap();

    assert_eq!(report.findings_for(DetectionMethod::VolumeAnomaly), 1);
    let spikes = store
        .findings()
        .await
        .into_iter()
        .filter(|f| f.anomaly_type() == AnomalyType::VolumeSpike)
        .count();
    assert_eq!(spikes, 1);
}

#[tokio::test]
async fn rerunning_over_the_same_data_is_idempotent() {
    let store = seeded_store(vec![sharp_drop("AAA"), volume_spike("BBB")]).await;
    let config = DetectionConfig { scan: configuration::ScanMode::FullWindow, ..DetectionConfig::default() };
    let engine = orchestrator(&store, config);
    let names = symbols(&["AAA", "BBB"]);

    let first = engine.run(&names).await.unwrap();
    let after_first = store.findings().await;
    let second = engine.run(&names).await.unwrap();
    let after_second = store.findings().await;

    assert!(!after_first.is_empty());
    assert_eq!(after_first, after_second);
    assert_eq!(first.findings_by_kind, second.findings_by_kind);
}

#[tokio::test]
async fn unknown_and_invalid_symbols_do_not_stop_the_run() {
    let mut broken = volume_spike("BAD");
    broken[10].high = broken[10].low - Decimal::ONE;
    let store = seeded_store(vec![volume_spike("GOOD"), broken]).await;

    let report = orchestrator(&store, DetectionConfig::default())
        .run(&symbols(&["GOOD", "MISSING", "BAD"]))
        .await
        .unwrap();

    assert!(matches!(report.instruments["GOOD"], InstrumentOutcome::Processed { .. }));
    assert_eq!(report.instruments["MISSING"], InstrumentOutcome::UnknownSymbol);
    assert!(matches!(report.instruments["BAD"], InstrumentOutcome::InvalidData(_)));
    assert_eq!(report.findings_for(DetectionMethod::VolumeAnomaly), 1);
}

#[tokio::test]
async fn many_symbols_run_under_bounded_concurrency() {
    let names = ["S1", "S2", "S3", "S4", "S5"];
    let store = seeded_store(names.iter().map(|n| volume_spike(n)).collect()).await;
    let engine = Orchestrator::new(store.clone(), store.clone(), DetectionConfig::default(), 2).unwrap();

    let report = engine.run(&symbols(&names)).await.unwrap();

    assert_eq!(report.instruments.len(), 5);
    assert_eq!(report.findings_for(DetectionMethod::VolumeAnomaly), 5);
    let stats = report.detectors[&DetectionMethod::VolumeAnomaly];
    assert_eq!(stats.invocations, 5);
    assert_eq!(stats.failures, 0);
}

struct PanickingDetector;

impl Detector for PanickingDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::Iqr
    }

    fn required_history(&self, _config: &DetectionConfig) -> usize {
        1
    }

    fn detect(&self, _window: &SeriesWindow, _config: &DetectionConfig) -> Result<Vec<Finding>, DetectorError> {
        panic!("boom");
    }
}

struct ErroringDetector;

impl Detector for ErroringDetector {
    fn method(&self) -> DetectionMethod {
        DetectionMethod::MovingAverage
    }

    fn required_history(&self, _config: &DetectionConfig) -> usize {
        1
    }

    fn detect(&self, _window: &SeriesWindow, _config: &DetectionConfig) -> Result<Vec<Finding>, DetectorError> {
        Err(DetectorError::IndicatorError("no data".to_string()))
    }
}

#[tokio::test]
async fn failing_detectors_are_recorded_and_isolated() {
    let store = seeded_store(vec![sharp_drop("TEST")]).await;
    let config = DetectionConfig { zscore_threshold: 2.5, ..DetectionConfig::default() };
    let detectors: Vec<Arc<dyn Detector>> =
        vec![Arc::new(PanickingDetector), Arc::new(ZScoreDetector), Arc::new(ErroringDetector)];
    let engine = Orchestrator::with_detectors(store.clone(), store.clone(), config, detectors, 1).unwrap();

    let report = engine.run_symbol("TEST").await.unwrap();

    assert_eq!(report.failures.len(), 2);
    assert!(report.failures.iter().any(|f| f.method == DetectionMethod::Iqr));
    assert!(report.failures.iter().any(|f| f.method == DetectionMethod::MovingAverage));
    assert_eq!(report.detectors[&DetectionMethod::Iqr].failures, 1);
    assert_eq!(report.findings_for(DetectionMethod::Zscore), 1);
    assert_eq!(store.findings().await.len(), 1);
}

#[tokio::test]
async fn all_detectors_failing_yields_no_findings_without_error() {
    let store = seeded_store(vec![sharp_drop("TEST")]).await;
    let detectors: Vec<Arc<dyn Detector>> = vec![Arc::new(PanickingDetector), Arc::new(ErroringDetector)];
    let engine =
        Orchestrator::with_detectors(store.clone(), store.clone(), DetectionConfig::default(), detectors, 1).unwrap();

    let report = engine.run_symbol("TEST").await.unwrap();

    assert_eq!(
        report.instruments["TEST"],
        InstrumentOutcome::Processed { findings: 0, rows_written: 0 }
    );
    assert_eq!(report.failures.len(), 2);
    assert!(store.findings().await.is_empty());
}

struct FailingSink;

#[async_trait]
impl FindingSink for FailingSink {
    async fn upsert_findings(&self, _findings: &[Finding]) -> Result<u64, DbError> {
        Err(DbError::InvalidFinding("disk full".to_string()))
    }
}

#[tokio::test]
async fn persistence_failure_aborts_the_run() {
    let store = seeded_store(vec![volume_spike("VOL")]).await;
    let source: Arc<dyn BarSource> = store.clone();
    let engine = Orchestrator::new(source, Arc::new(FailingSink), DetectionConfig::default(), 1).unwrap();

    let err = engine.run_symbol("VOL").await.unwrap_err();

    match err {
        EngineError::Persistence { symbol, report, .. } => {
            assert_eq!(symbol, "VOL");
            assert!(matches!(report.instruments["VOL"], InstrumentOutcome::PersistenceFailed(_)));
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[tokio::test]
async fn invalid_configuration_is_rejected_up_front() {
    let store = Arc::new(MemoryStore::new());
    let config = DetectionConfig { isolation_contamination: 0.0, ..DetectionConfig::default() };
    let result = Orchestrator::new(store.clone(), store.clone(), config, 1);
    assert!(matches!(result, Err(EngineError::Configuration(_))));
}
