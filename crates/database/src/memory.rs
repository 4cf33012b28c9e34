use crate::DbError;
use crate::store::{BarSource, FindingSink};
use async_trait::async_trait;
use core_types::{Bar, Finding, FindingKey};
use std::collections::{BTreeMap, HashMap};
use tokio::sync::RwLock;

/// An in-process store implementing both collaborator traits.
///
/// Upserts follow the same natural-key semantics as the `anomalies` table, so
/// it stands in for PostgreSQL in tests and `--dry-run` runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    bars: RwLock<HashMap<String, Vec<Bar>>>,
    findings: RwLock<BTreeMap<FindingKey, Finding>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds bars, keeping each symbol's series sorted. A bar at an existing
    /// timestamp is ignored, like `ON CONFLICT DO NOTHING`.
    pub async fn insert_bars(&self, bars: impl IntoIterator<Item = Bar>) {
        let mut guard = self.bars.write().await;
        for bar in bars {
            let series = guard.entry(bar.symbol.clone()).or_default();
            if let Err(position) = series.binary_search_by_key(&bar.timestamp, |b| b.timestamp) {
                series.insert(position, bar);
            }
        }
    }

    /// A snapshot of every stored finding, ordered by natural key.
    pub async fn findings(&self) -> Vec<Finding> {
        self.findings.read().await.values().cloned().collect()
    }
}

#[async_trait]
impl BarSource for MemoryStore {
    async fn get_recent_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, DbError> {
        let guard = self.bars.read().await;
        let series = guard
            .get(symbol)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| DbError::UnknownSymbol(symbol.to_string()))?;
        let start = series.len().saturating_sub(lookback);
        Ok(series[start..].to_vec())
    }
}

#[async_trait]
impl FindingSink for MemoryStore {
    async fn upsert_findings(&self, findings: &[Finding]) -> Result<u64, DbError> {
        // The write lock is held for the whole batch.
        let mut guard = self.findings.write().await;
        for finding in findings {
            guard.insert(finding.key(), finding.clone());
        }
        Ok(findings.len() as u64)
    }
}
