use crate::DbError;
use crate::store::{BarSource, FindingSink};
use async_trait::async_trait;
use core_types::{Bar, Finding};
use rust_decimal::Decimal;
use rust_decimal::prelude::FromPrimitive;
use sqlx::Row;
use sqlx::postgres::PgPool;
use tracing::{debug, warn};

/// Decimal places kept for scores; matches the `NUMERIC(20, 6)` column.
const SCORE_SCALE: u32 = 6;

/// Scores must stay below this to fit the fourteen integer digits of the column.
const SCORE_LIMIT: i64 = 100_000_000_000_000;

/// The `DbRepository` provides a high-level, application-specific interface
/// to the database. It encapsulates all SQL queries and data access logic.
#[derive(Debug, Clone)]
pub struct DbRepository {
    pool: PgPool,
}

impl DbRepository {
    /// Creates a new `DbRepository` with a shared database connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl BarSource for DbRepository {
    async fn get_recent_bars(&self, symbol: &str, lookback: usize) -> Result<Vec<Bar>, DbError> {
        if lookback == 0 {
            return Ok(Vec::new());
        }

        // Newest `lookback` rows, flipped back to ascending order.
        let rows = sqlx::query(
            r#"
            SELECT symbol, timestamp, open, high, low, close, volume
            FROM (
                SELECT symbol, timestamp, open, high, low, close, volume
                FROM stock_prices
                WHERE symbol = $1
                ORDER BY timestamp DESC
                LIMIT $2
            ) recent
            ORDER BY timestamp ASC
            "#,
        )
        .bind(symbol)
        .bind(i64::try_from(lookback).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        if rows.is_empty() {
            return Err(DbError::UnknownSymbol(symbol.to_string()));
        }

        let bars: Vec<Bar> = rows
            .into_iter()
            .map(|row| Bar {
                symbol: row.get("symbol"),
                timestamp: row.get("timestamp"),
                open: row.get("open"),
                high: row.get("high"),
                low: row.get("low"),
                close: row.get("close"),
                volume: row.get("volume"),
            })
            .collect();

        debug!(symbol, count = bars.len(), "Loaded recent bars");
        Ok(bars)
    }
}

#[async_trait]
impl FindingSink for DbRepository {
    async fn upsert_findings(&self, findings: &[Finding]) -> Result<u64, DbError> {
        if findings.is_empty() {
            return Ok(0);
        }

        // A score the column cannot hold would fail the whole batch; drop just that row.
        let mut rows = Vec::with_capacity(findings.len());
        for finding in findings {
            match score_to_decimal(finding.score()) {
                Ok(score) => rows.push((finding, score)),
                Err(e) => warn!(
                    symbol = finding.symbol(),
                    method = %finding.method(),
                    error = %e,
                    "Skipping finding that cannot be stored"
                ),
            }
        }
        if rows.is_empty() {
            return Ok(0);
        }

        let mut tx = self.pool.begin().await?;
        let mut written = 0;

        for (finding, score) in rows {
            let result = sqlx::query(
                r#"
                INSERT INTO anomalies (symbol, timestamp, anomaly_type, method, score, details)
                VALUES ($1, $2, $3, $4, $5, $6)
                ON CONFLICT (symbol, timestamp, method, anomaly_type)
                DO UPDATE SET score = EXCLUDED.score,
                              details = EXCLUDED.details,
                              updated_at = NOW()
                "#,
            )
            .bind(finding.symbol())
            .bind(finding.timestamp())
            .bind(finding.anomaly_type().as_str())
            .bind(finding.method().as_str())
            .bind(score)
            .bind(finding.details())
            .execute(&mut *tx)
            .await?;
            written += result.rows_affected();
        }

        // Nothing is visible until the whole batch is in.
        tx.commit().await?;
        Ok(written)
    }
}

fn score_to_decimal(score: f64) -> Result<Decimal, DbError> {
    let decimal = Decimal::from_f64(score)
        .map(|d| d.round_dp(SCORE_SCALE))
        .ok_or_else(|| DbError::InvalidFinding(format!("score {} is not a finite decimal", score)))?;
    if decimal >= Decimal::from(SCORE_LIMIT) {
        return Err(DbError::InvalidFinding(format!("score {} does not fit NUMERIC(20, 6)", score)));
    }
    Ok(decimal)
}
