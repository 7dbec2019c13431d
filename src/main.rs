use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use biorecon::config::AppConfig;
use biorecon::database::SqliteRepository;
use biorecon::error::ReconError;
use biorecon::day::DayBoundary;
use biorecon::import::{ExportSource, ImportManager};
use biorecon::logging::{init_logging, LogLevel};
use biorecon::merge::PriorityMerger;
use biorecon::models::{DataQuality, DaySummary};
use biorecon::orchestrator::{BatchReport, Orchestrator};
use biorecon::quality::ConfidenceScorer;
use biorecon::repository::Repository;
use biorecon::timeline;

/// biorecon - multi-source biometric reconciliation
///
/// Merges wearable exports from competing devices into one record per day,
/// reconstructs the night's sleep and scores each day's data quality.
#[derive(Parser)]
#[command(name = "biorecon")]
#[command(version)]
#[command(about = "Multi-source biometric reconciliation", long_about = None)]
struct Cli {
    /// Sets a custom config file
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Reconciled database (overrides the config file)
    #[arg(short, long, value_name = "FILE")]
    database: Option<PathBuf>,

    /// Increase verbosity of output
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Import an export file and reconcile every day it covers
    Import {
        /// Health Connect database (.db) or JSON export
        file: PathBuf,

        /// First date to reconcile (YYYY-MM-DD)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last date to reconcile (YYYY-MM-DD)
        #[arg(long)]
        to: Option<NaiveDate>,

        /// Provider label stored on each summary
        #[arg(long, default_value = "health_connect")]
        provider: String,
    },

    /// Show the cleaned sleep stage timeline for a night
    Timeline {
        /// Date the night ends on (YYYY-MM-DD)
        #[arg(long)]
        date: NaiveDate,
    },

    /// Show the data-quality record for a date
    Quality {
        #[arg(long)]
        date: NaiveDate,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show the reconciled summary for a date
    Summary {
        #[arg(long)]
        date: NaiveDate,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Row counts of the reconciled database
    Stats,

    /// Configure application settings
    Config {
        /// Print the active configuration
        #[arg(short, long)]
        show: bool,

        /// Write a default configuration file
        #[arg(short, long)]
        init: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_file(path)?,
        None => AppConfig::load_or_default(),
    };

    let mut log_config = config.logging.clone();
    log_config.level = match cli.verbose {
        0 => log_config.level,
        1 => LogLevel::Info,
        2 => LogLevel::Debug,
        _ => LogLevel::Trace,
    };
    init_logging(&log_config)?;

    let boundary = DayBoundary::from_settings(&config.day).ok_or_else(|| {
        ReconError::Configuration(format!("invalid utc_offset_hours: {}", config.day.utc_offset_hours))
    })?;
    let database_path = cli.database.clone().unwrap_or_else(|| config.settings.database_path.clone());

    match cli.command {
        Commands::Import { file, from, to, provider } => {
            import(&config, boundary, &database_path, &file, from, to, provider).await?;
        }

        Commands::Timeline { date } => {
            let repository = open_repository(&database_path)?;
            let events = timeline::stage_timeline(&repository, &boundary, date).await?;

            if events.is_empty() {
                println!("{}", format!("No sleep stages stored for {}", date).yellow());
                return Ok(());
            }

            println!("{}", format!("Sleep timeline for {}", date).blue().bold());
            for event in &events {
                let local = event.time.with_timezone(&boundary.offset());
                println!(
                    "  {}  {:<5}  {:>3} min",
                    local.format("%H:%M"),
                    event.stage.as_str(),
                    event.seconds / 60
                );
            }
            println!("  {} events, session {}", events.len(), events[0].session_id);
        }

        Commands::Quality { date, json } => {
            let repository = open_repository(&database_path)?;
            match repository.get_quality(date).await? {
                Some(quality) if json => println!("{}", serde_json::to_string_pretty(&quality)?),
                Some(quality) => print_quality(&quality),
                None => println!("{}", format!("No quality record for {}", date).yellow()),
            }
        }

        Commands::Summary { date, json } => {
            let repository = open_repository(&database_path)?;
            match repository.get_summary(date).await? {
                Some(summary) if json => println!("{}", serde_json::to_string_pretty(&summary)?),
                Some(summary) => print_summary(&summary),
                None => println!("{}", format!("No summary for {}", date).yellow()),
            }
        }

        Commands::Stats => {
            let repository = open_repository(&database_path)?;
            let stats = repository.stats().await?;
            println!("{}", "Database".cyan().bold());
            println!("  Path:            {}", database_path.display());
            println!("  Day summaries:   {}", stats.summaries);
            println!("  Valid days:      {}", stats.valid_days);
            println!("  Quality records: {}", stats.quality_records);
            println!("  HR samples:      {}", stats.intraday_samples);
            println!("  Stage events:    {}", stats.stage_events);
            println!("  Exercises:       {}", stats.exercises);
        }

        Commands::Config { show, init } => {
            if init {
                let path = cli.config.clone().unwrap_or_else(AppConfig::default_config_path);
                if path.exists() {
                    println!("{}", format!("Config already exists at {}", path.display()).yellow());
                } else {
                    config = AppConfig::default();
                    config.save_to_file(&path)?;
                    println!("{}", format!("✓ Wrote {}", path.display()).green());
                }
            }
            if show || !init {
                println!("{}", toml::to_string_pretty(&config)?);
            }
        }
    }

    Ok(())
}

async fn import(
    config: &AppConfig,
    boundary: DayBoundary,
    database_path: &Path,
    file: &Path,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    provider: String,
) -> Result<()> {
    println!("{}", "Importing export...".green().bold());
    println!("  File: {}", file.display());

    let manager = ImportManager::new(&config.sources, boundary);
    let data = manager
        .read(file)
        .map_err(|e| anyhow::anyhow!(ReconError::from(e).user_message()))?;

    let dates: Vec<NaiveDate> = data
        .dates()
        .into_iter()
        .filter(|d| from.map_or(true, |f| *d >= f) && to.map_or(true, |t| *d <= t))
        .collect();
    let sources: Vec<String> = data.sources().iter().map(|s| s.to_string()).collect();
    println!("  Sources: {}", sources.join(", "));
    println!("  Days: {}", dates.len());

    let repository = Arc::new(open_repository(database_path)?);
    let orchestrator = Orchestrator::new(
        Arc::new(ExportSource::new(data, boundary, provider)),
        repository,
        PriorityMerger::new(config.sources.source_priority()),
        boundary,
        ConfidenceScorer::new(config.quality.clone()),
    );

    let token = CancellationToken::new();
    let ctrl_c = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let progress = ProgressBar::new(dates.len() as u64);
    progress.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({msg})")
            .context("invalid progress template")?
            .progress_chars("#>-"),
    );

    let batch = orchestrator.reconcile_range(&dates, &token, Some(&progress)).await;
    progress.finish_and_clear();

    print_batch(&batch);
    Ok(())
}

fn open_repository(path: &Path) -> Result<SqliteRepository> {
    SqliteRepository::open(path).with_context(|| format!("Failed to open database {}", path.display()))
}

fn print_batch(batch: &BatchReport) {
    if batch.cancelled {
        println!("{}", "Import cancelled; days already reconciled are saved.".yellow().bold());
    }

    println!(
        "{}",
        format!("✓ Reconciled {} days", batch.reconciled.len()).green()
    );
    if batch.degraded_count() > 0 {
        println!("  {} days with skipped steps:", batch.degraded_count());
        for report in batch.reconciled.iter().filter(|r| r.is_degraded()) {
            let steps: Vec<&str> = report.degradations.iter().map(|d| d.step.as_str()).collect();
            println!("    {}  {}", report.date, steps.join(", ").dimmed());
        }
    }
    if batch.skipped_count() > 0 {
        println!("{}", format!("  {} days without a baseline summary", batch.skipped_count()).yellow());
    }
    for failure in batch.failures.iter().filter(|f| !f.skipped) {
        println!("{}", format!("✗ {}: {}", failure.date, failure.error).red());
    }
}

fn print_summary(summary: &DaySummary) {
    fn show<T: std::fmt::Display>(value: Option<T>) -> String {
        value.map_or_else(|| "-".dimmed().to_string(), |v| v.to_string())
    }

    println!("{}", format!("Summary for {} ({})", summary.date, summary.provider).blue().bold());
    println!("  Resting HR:   {}", show(summary.resting_hr));
    println!("  Avg / max HR: {} / {}", show(summary.avg_hr.map(|v| format!("{:.1}", v))), show(summary.max_hr));
    println!("  HRV (RMSSD):  {}", show(summary.hrv_daily_rmssd.map(|v| format!("{:.1}", v))));
    println!("  SpO2 avg:     {}", show(summary.spo2_avg.map(|v| format!("{:.1}", v))));
    println!("  Breathing:    {}", show(summary.br_full_sleep.map(|v| format!("{:.1}", v))));
    println!("  Skin temp Δ:  {}", show(summary.skin_temp_delta.map(|v| format!("{:+.2}", v))));
    println!("  Steps:        {}", show(summary.steps));
    println!("  Distance km:  {}", show(summary.distance_km.map(|v| format!("{:.2}", v))));
    println!("  Calories:     {}", show(summary.calories_total));
    println!(
        "  Sleep:        {} min ({} asleep, {} deep, {} rem)",
        show(summary.sleep_duration_min),
        show(summary.sleep_minutes_asleep),
        show(summary.sleep_deep_min),
        show(summary.sleep_rem_min)
    );
}

fn print_quality(quality: &DataQuality) {
    let level = match quality.confidence_level.as_str() {
        "high" => "high".green(),
        "medium" => "medium".yellow(),
        other => other.red(),
    };

    println!("{}", format!("Data quality for {}", quality.date).blue().bold());
    println!("  Confidence:   {:.3} ({})", quality.confidence_score, level);
    println!("  Valid day:    {}", if quality.is_valid_day { "yes".green() } else { "no".red() });
    println!("  Wear time:    {:.1} h ({} samples)", quality.wear_time_hours, quality.hr_sample_count);
    println!("  Completeness: {:.0}%", quality.completeness_pct * 100.0);
    if !quality.metrics_missing.is_empty() {
        println!("  Missing:      {}", quality.metrics_missing.join(", "));
    }
    println!(
        "  Baseline:     {} days ({})",
        quality.baseline_days,
        quality.baseline_maturity.as_str()
    );
    for (metric, status) in &quality.plausibility_flags {
        if status.is_failure() {
            println!("  {} {} {}", "!".red(), metric, status.as_str());
        }
    }
}
