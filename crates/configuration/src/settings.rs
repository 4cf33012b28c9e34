use crate::error::ConfigError;
use chrono::NaiveTime;
use core_types::DetectionMethod;
use serde::Deserialize;
use std::path::PathBuf;

/// The root configuration structure for the entire application.
///
/// Every section has defaults, so an absent `config.toml` still yields a
/// usable configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseSettings,
    pub detection: DetectionConfig,
    pub service: ServiceSettings,
    pub logging: LoggingSettings,
}

impl Config {
    /// Validates every section. Called by the loaders before a `Config` is handed out.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.detection.validate()?;
        self.service.validate()?;
        if self.database.max_connections == 0 {
            return Err(ConfigError::ValidationError(
                "database.max_connections must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Connection pool parameters for the PostgreSQL store.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseSettings {
    /// Falls back to the `DATABASE_URL` environment variable when absent.
    pub url: Option<String>,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        Self {
            url: None,
            max_connections: 10,
            acquire_timeout_secs: 5,
        }
    }
}

/// Which bars of a window a detector evaluates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
#[cfg_attr(feature = "clap", derive(clap::ValueEnum))]
pub enum ScanMode {
    /// Only the most recent bar. This is the daily-run behaviour.
    #[default]
    Latest,
    /// Every bar that has enough trailing history. Used for backfills.
    FullWindow,
}

/// Parameters consumed by the detection engine.
///
/// This value is passed explicitly into every run; there is no process-wide copy.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Number of most recent bars loaded per instrument.
    pub lookback: usize,
    pub scan: ScanMode,
    pub enabled: Vec<DetectionMethod>,

    // --- Z-Score ---
    pub rolling_window: usize,
    pub zscore_threshold: f64,

    // --- IQR ---
    pub iqr_window: usize,
    pub iqr_multiplier: f64,

    // --- Isolation Forest ---
    /// Expected share of outliers in a window, in (0, 0.5].
    pub isolation_contamination: f64,
    pub isolation_estimators: usize,
    pub isolation_seed: u64,
    /// Minimum number of complete feature rows before the forest is fitted.
    pub isolation_min_rows: usize,
    /// Trailing window for the rolling-volatility feature.
    pub volatility_window: usize,

    // --- Moving Average ---
    pub ma_window: usize,
    pub ma_threshold_pct: f64,

    // --- Volume ---
    pub volume_window: usize,
    pub volume_zscore_threshold: f64,

    // --- Technical Indicators ---
    pub rsi_period: usize,
    pub rsi_oversold: f64,
    pub rsi_overbought: f64,
    pub bollinger_period: usize,
    pub bollinger_k: f64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            lookback: 60,
            scan: ScanMode::Latest,
            enabled: DetectionMethod::ALL.to_vec(),
            rolling_window: 30,
            zscore_threshold: 3.0,
            iqr_window: 30,
            iqr_multiplier: 1.5,
            isolation_contamination: 0.1,
            isolation_estimators: 100,
            isolation_seed: 42,
            isolation_min_rows: 30,
            volatility_window: 5,
            ma_window: 20,
            ma_threshold_pct: 5.0,
            volume_window: 20,
            volume_zscore_threshold: 3.0,
            rsi_period: 14,
            rsi_oversold: 30.0,
            rsi_overbought: 70.0,
            bollinger_period: 20,
            bollinger_k: 2.0,
        }
    }
}

impl DetectionConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive = [
            ("zscore_threshold", self.zscore_threshold),
            ("iqr_multiplier", self.iqr_multiplier),
            ("ma_threshold_pct", self.ma_threshold_pct),
            ("volume_zscore_threshold", self.volume_zscore_threshold),
            ("bollinger_k", self.bollinger_k),
        ];
        for (name, value) in positive {
            if !(value.is_finite() && value > 0.0) {
                return Err(invalid(format!("detection.{name} must be a positive number, got {value}")));
            }
        }

        // Sample statistics need at least two observations.
        let windows = [
            ("lookback", self.lookback),
            ("rolling_window", self.rolling_window),
            ("iqr_window", self.iqr_window),
            ("ma_window", self.ma_window),
            ("volume_window", self.volume_window),
            ("volatility_window", self.volatility_window),
            ("bollinger_period", self.bollinger_period),
            ("rsi_period", self.rsi_period),
            ("isolation_min_rows", self.isolation_min_rows),
        ];
        for (name, value) in windows {
            if value < 2 {
                return Err(invalid(format!("detection.{name} must be at least 2, got {value}")));
            }
        }

        if !(self.isolation_contamination > 0.0 && self.isolation_contamination <= 0.5) {
            return Err(invalid(format!(
                "detection.isolation_contamination must be in (0, 0.5], got {}",
                self.isolation_contamination
            )));
        }
        if self.isolation_estimators == 0 {
            return Err(invalid("detection.isolation_estimators must be at least 1".to_string()));
        }
        if !(0.0 < self.rsi_oversold
            && self.rsi_oversold < self.rsi_overbought
            && self.rsi_overbought < 100.0)
        {
            return Err(invalid(format!(
                "detection RSI levels must satisfy 0 < oversold < overbought < 100, got {} / {}",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        if self.enabled.is_empty() {
            return Err(invalid("detection.enabled must name at least one detector".to_string()));
        }
        Ok(())
    }
}

/// Settings for the long-running detection service.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceSettings {
    /// The monitored instrument set.
    pub symbols: Vec<String>,
    /// How many instruments are processed concurrently.
    pub max_concurrent_symbols: usize,
    /// Daily run time, "HH:MM" in UTC.
    pub schedule_time: String,
    /// Run once immediately when the service starts.
    pub run_on_startup: bool,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            symbols: ["AAPL", "GOOGL", "MSFT", "AMZN", "TSLA", "NVDA", "META", "SPY", "QQQ", "^VIX"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            max_concurrent_symbols: 4,
            schedule_time: "18:00".to_string(),
            run_on_startup: true,
        }
    }
}

impl ServiceSettings {
    /// Parses `schedule_time` into a wall-clock time.
    pub fn schedule_time(&self) -> Result<NaiveTime, ConfigError> {
        NaiveTime::parse_from_str(&self.schedule_time, "%H:%M").map_err(|e| {
            invalid(format!("service.schedule_time '{}' is not HH:MM: {}", self.schedule_time, e))
        })
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_symbols == 0 {
            return Err(invalid("service.max_concurrent_symbols must be at least 1".to_string()));
        }
        if self.symbols.iter().any(|s| s.trim().is_empty()) {
            return Err(invalid("service.symbols must not contain empty entries".to_string()));
        }
        self.schedule_time()?;
        Ok(())
    }
}

/// Where and how log output is written.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// An `EnvFilter` directive; `RUST_LOG` takes precedence when set.
    pub level: String,
    pub json: bool,
    /// When set, logs go to a daily-rolling file in this directory instead of stderr.
    pub directory: Option<PathBuf>,
    pub file_prefix: String,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            directory: None,
            file_prefix: "marketpulse.log".to_string(),
        }
    }
}

fn invalid(message: String) -> ConfigError {
    ConfigError::ValidationError(message)
}
