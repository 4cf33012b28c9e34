use crate::error::DbError;
use async_trait::async_trait;
use core_types::{Bar, Finding};

/// Read side: where the engine gets price history from.
#[async_trait]
pub trait BarSource: Send + Sync {
    /// The most recent `lookback` bars for `symbol`, ascending by timestamp.
    ///
    /// Returns fewer bars when history is short, and `DbError::UnknownSymbol`
    /// when the symbol has no bars at all.
    async fn get_recent_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, DbError>;
}

/// Write side: where findings are persisted.
#[async_trait]
pub trait FindingSink: Send + Sync {
    /// Inserts or updates findings by their natural key as one atomic batch.
    /// Returns the number of rows written. Re-issuing a batch is safe.
    async fn upsert_findings(&self, findings: &[Finding]) -> Result<u64, DbError>;
}
