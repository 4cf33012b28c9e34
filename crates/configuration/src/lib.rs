//! # MarketPulse Configuration Crate
//!
//! Typed settings for every part of the anomaly engine, loaded in layers and
//! validated before use.
//!
//! ## Architectural Principles
//!
//! - **Layer 0 Foundation:** Depends only on `core-types`. Every other crate receives
//!   its settings from here as plain values; nothing reads configuration globally.
//! - **Layered Sources:** Built-in defaults, then an optional TOML file, then
//!   environment variables prefixed with `MARKETPULSE__` (`__` separates sections,
//!   e.g. `MARKETPULSE__DETECTION__ZSCORE_THRESHOLD=2.5`).
//! - **Fail Fast:** `Config::validate` runs inside the loaders, so an invalid threshold
//!   is reported at startup and never reaches a detector.
//!
//! ## Public API
//!
//! - `load_config_from`: Build and validate a `Config`.
//! - `Config` and its sections: `DatabaseSettings`, `DetectionConfig`, `ServiceSettings`,
//!   `LoggingSettings`, plus the `ScanMode` enum.
//! - `logging::init_tracing`: Installs the global `tracing` subscriber.
//! - `ConfigError`: The error type for this crate.

use std::path::Path;

// Declare the modules that make up this crate.
pub mod error;
pub mod logging;
pub mod settings;

// Re-export the core types to provide a clean public API.
pub use error::ConfigError;
pub use settings::{
    Config, DatabaseSettings, DetectionConfig, LoggingSettings, ScanMode, ServiceSettings,
};

/// The configuration file used when no `--config` path is given.
pub const DEFAULT_CONFIG_FILE: &str = "config.toml";

/// Loads the application configuration from the given TOML file and the environment.
///
/// A missing file is not an error; every setting has a default. Environment
/// variables override file values.
pub fn load_config_from(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let builder = config::Config::builder()
        .add_source(config::File::from(path.as_ref()).required(false))
        .add_source(
            config::Environment::with_prefix("MARKETPULSE")
                .separator("__")
                .try_parsing(true)
                .list_separator(",")
                .with_list_parse_key("service.symbols")
                .with_list_parse_key("detection.enabled"),
        )
        .build()?;

    let config = builder.try_deserialize::<Config>()?;
    config.validate()?;

    Ok(config)
}
