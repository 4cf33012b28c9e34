use anyhow::{Context, Result};
use chrono::{DateTime, NaiveTime, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table, presets::UTF8_FULL};
use configuration::{Config, ScanMode};
use core_types::{DetectionMethod, Finding};
use database::{BarSource, DbRepository, FindingSink, MemoryStore, connect, run_migrations};
use engine::{EngineError, Orchestrator, RunReport};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

/// The main entry point for the MarketPulse anomaly engine.
#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables from a .env file, if there is one.
    dotenvy::dotenv().ok();

    // Parse command-line arguments
    let cli = Cli::parse();

    let config = configuration::load_config_from(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    // The guard flushes the log file on drop; keep it for the whole process.
    let _log_guard = configuration::logging::init_tracing(&config.logging)?;

    // Execute the appropriate command
    match cli.command {
        Commands::Run(args) => handle_run(args, config).await,
        Commands::Serve => handle_serve(config).await,
        Commands::CheckConfig => handle_check_config(&config),
    }
}

// ==============================================================================
// CLI Structure
// ==============================================================================

/// Multi-method anomaly detection over daily price and volume series.
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file. Missing files fall back to defaults.
    #[arg(long, global = true, default_value = configuration::DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run detection once over the configured (or given) symbols.
    Run(RunArgs),
    /// Run detection daily at `service.schedule_time` until interrupted.
    Serve,
    /// Load and validate the configuration, then print the effective settings.
    CheckConfig,
}

#[derive(Parser)]
struct RunArgs {
    /// Symbol to process; repeat for several. Defaults to `service.symbols`.
    #[arg(long = "symbol")]
    symbols: Vec<String>,

    /// Which bars to evaluate. Overrides `detection.scan`.
    #[arg(long, value_enum)]
    scan: Option<ScanMode>,

    /// Detect and print findings without writing them to the database.
    #[arg(long)]
    dry_run: bool,
}

// ==============================================================================
// Command Logic
// ==============================================================================

async fn handle_run(args: RunArgs, mut config: Config) -> Result<()> {
    if let Some(scan) = args.scan {
        config.detection.scan = scan;
    }
    let symbols = if args.symbols.is_empty() {
        config.service.symbols.clone()
    } else {
        args.symbols
    };

    let repository = Arc::new(open_repository(&config).await?);
    let source: Arc<dyn BarSource> = repository.clone();
    let dry_run_store = args.dry_run.then(|| Arc::new(MemoryStore::new()));
    let sink: Arc<dyn FindingSink> = match &dry_run_store {
        Some(store) => store.clone(),
        None => repository,
    };

    let orchestrator = Orchestrator::new(
        source,
        sink,
        config.detection.clone(),
        config.service.max_concurrent_symbols,
    )?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    spinner.set_message(format!("Scanning {} symbols...", symbols.len()));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = orchestrator.run(&symbols).await;
    spinner.finish_and_clear();

    let report = match result {
        Ok(report) => report,
        Err(EngineError::Persistence { symbol, source, report }) => {
            print_report(&report);
            return Err(anyhow::Error::new(source).context(format!("Failed to persist findings for {}", symbol)));
        }
        Err(e) => return Err(e.into()),
    };

    print_report(&report);
    if let Some(store) = dry_run_store {
        print_findings(&store.findings().await);
    }
    Ok(())
}

async fn handle_serve(config: Config) -> Result<()> {
    let schedule = config.service.schedule_time()?;
    let repository = Arc::new(open_repository(&config).await?);
    let orchestrator = Orchestrator::new(
        repository.clone(),
        repository,
        config.detection.clone(),
        config.service.max_concurrent_symbols,
    )?;
    let symbols = config.service.symbols.clone();

    info!(symbols = symbols.len(), schedule = %schedule, "Detection service started");
    if config.service.run_on_startup
        && !run_until(run_scheduled(&orchestrator, &symbols), tokio::signal::ctrl_c()).await
    {
        return Ok(());
    }

    loop {
        let wait = until_next(schedule, Utc::now());
        info!(wait_secs = wait.as_secs(), "Waiting for next scheduled run");
        let next_run = async {
            tokio::time::sleep(wait).await;
            run_scheduled(&orchestrator, &symbols).await;
        };
        if !run_until(next_run, tokio::signal::ctrl_c()).await {
            break;
        }
    }

    Ok(())
}

fn handle_check_config(config: &Config) -> Result<()> {
    let detection = &config.detection;
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Setting", "Value"]);

    let enabled: Vec<&str> = detection.enabled.iter().map(DetectionMethod::as_str).collect();
    let rows: Vec<(&str, String)> = vec![
        ("lookback", detection.lookback.to_string()),
        ("scan", format!("{:?}", detection.scan)),
        ("enabled", enabled.join(", ")),
        ("zscore", format!("window {} / threshold {}", detection.rolling_window, detection.zscore_threshold)),
        ("iqr", format!("window {} / k {}", detection.iqr_window, detection.iqr_multiplier)),
        (
            "isolation_forest",
            format!(
                "contamination {} / trees {} / seed {} / min rows {}",
                detection.isolation_contamination,
                detection.isolation_estimators,
                detection.isolation_seed,
                detection.isolation_min_rows
            ),
        ),
        ("moving_average", format!("window {} / threshold {}%", detection.ma_window, detection.ma_threshold_pct)),
        (
            "volume_anomaly",
            format!("window {} / threshold {}", detection.volume_window, detection.volume_zscore_threshold),
        ),
        (
            "technical_indicators",
            format!(
                "RSI {} ({}/{}) / Bollinger {} x {}",
                detection.rsi_period,
                detection.rsi_oversold,
                detection.rsi_overbought,
                detection.bollinger_period,
                detection.bollinger_k
            ),
        ),
        ("symbols", config.service.symbols.join(", ")),
        ("schedule", format!("{} UTC", config.service.schedule_time)),
    ];
    for (name, value) in rows {
        table.add_row(vec![name.to_string(), value]);
    }

    println!("Configuration is valid.");
    println!("{table}");
    Ok(())
}

// ==============================================================================
// Helpers
// ==============================================================================

async fn open_repository(config: &Config) -> Result<DbRepository> {
    let pool = connect(&config.database).await.context("Failed to connect to the database")?;
    run_migrations(&pool).await.context("Failed to run database migrations")?;
    Ok(DbRepository::new(pool))
}

/// One scheduled run. Failures are logged; the service keeps its schedule.
async fn run_scheduled(orchestrator: &Orchestrator, symbols: &[String]) {
    match orchestrator.run(symbols).await {
        Ok(report) => info!(
            findings = report.total_findings(),
            failures = report.failures.len(),
            "Scheduled run finished"
        ),
        Err(e) => error!(error = %e, "Scheduled run failed"),
    }
}

/// Drives `work` to completion unless `shutdown` resolves first, in which case
/// `work` is dropped mid-flight. Returns `false` on shutdown.
async fn run_until<W, S>(work: W, shutdown: S) -> bool
where
    W: Future<Output = ()>,
    S: Future,
{
    tokio::select! {
        _ = work => true,
        _ = shutdown => {
            info!("Shutdown signal received, stopping service");
            false
        }
    }
}

/// Time from `now` until the next occurrence of `at` (UTC). A run time equal to
/// `now` is scheduled for the following day.
fn until_next(at: NaiveTime, now: DateTime<Utc>) -> Duration {
    let today = now.date_naive().and_time(at).and_utc();
    let next = if today > now { today } else { today + chrono::Duration::days(1) };
    (next - now).to_std().unwrap_or(Duration::ZERO)
}

fn print_report(report: &RunReport) {
    let mut instruments = Table::new();
    instruments
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Outcome", "Findings", "Rows Written"]);
    for (symbol, outcome) in &report.instruments {
        let (findings, rows) = match outcome {
            engine::InstrumentOutcome::Processed { findings, rows_written } => {
                (findings.to_string(), rows_written.to_string())
            }
            _ => ("-".to_string(), "-".to_string()),
        };
        instruments.add_row(vec![symbol.clone(), outcome.label().to_string(), findings, rows]);
    }

    let mut detectors = Table::new();
    detectors
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Method", "Type", "Findings", "Invocations", "Failures", "Total ms"]);
    for (method, stats) in &report.detectors {
        detectors.add_row(vec![
            method.to_string(),
            method.anomaly_type().to_string(),
            report.findings_for(*method).to_string(),
            stats.invocations.to_string(),
            stats.failures.to_string(),
            stats.total_elapsed.as_millis().to_string(),
        ]);
    }

    println!("{instruments}");
    println!("{detectors}");
    for failure in &report.failures {
        println!("FAILED {} / {}: {}", failure.symbol, failure.method, failure.message);
    }
    println!(
        "{} findings, {} rows written in {:.2?}",
        report.total_findings(),
        report.rows_written(),
        report.elapsed
    );
}

fn print_findings(findings: &[Finding]) {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(vec!["Symbol", "Date", "Method", "Type", "Score"]);
    for finding in findings {
        table.add_row(vec![
            finding.symbol().to_string(),
            finding.timestamp().format("%Y-%m-%d").to_string(),
            finding.method().to_string(),
            finding.anomaly_type().to_string(),
            format!("{:.4}", finding.score()),
        ]);
    }
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn next_run_is_later_today_or_tomorrow() {
        let at = NaiveTime::from_hms_opt(18, 0, 0).unwrap();

        let morning = Utc.with_ymd_and_hms(2024, 6, 3, 9, 30, 0).unwrap();
        assert_eq!(until_next(at, morning), Duration::from_secs(8 * 3600 + 30 * 60));

        let evening = Utc.with_ymd_and_hms(2024, 6, 3, 18, 0, 0).unwrap();
        assert_eq!(until_next(at, evening), Duration::from_secs(24 * 3600));
    }

    #[tokio::test]
    async fn shutdown_interrupts_a_run_in_progress() {
        let stuck_run = std::future::pending::<()>();
        assert!(!run_until(stuck_run, async {}).await);

        assert!(run_until(async {}, std::future::pending::<()>()).await);
    }
}
