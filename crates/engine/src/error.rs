use crate::report::RunReport;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] configuration::ConfigError),

    /// A batch could not be written. The run stops; `report` covers the work done
    /// up to that point. Re-running is safe because writes are idempotent.
    #[error("Failed to persist findings for '{symbol}': {source}")]
    Persistence {
        symbol: String,
        #[source]
        source: database::DbError,
        report: Box<RunReport>,
    },
}
