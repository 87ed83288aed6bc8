use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use results_ledger::calculate::{best_rounds_for, outcomes_for};
use results_ledger::config::{AppConfig, ReferenceTables};
use results_ledger::models::{CompetitorRecord, LifetimeTotal, PseudoId, Source};
use results_ledger::pipeline;
use results_ledger::storage::{JsonlReader, StorageConfig};

#[derive(Parser)]
#[command(name = "results-ledger")]
#[command(about = "Reconciles two yearly results sources into one ranked time series")]
#[command(version)]
struct Cli {
    /// Path to configuration file
    #[arg(long, default_value = "./config.toml")]
    config: PathBuf,

    /// Data directory path (overrides the config file)
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Reference tables file (overrides the config file)
    #[arg(long)]
    reference: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Output logs as JSON
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a full load and write every output
    Run {
        /// Compute and report but don't write
        #[arg(long)]
        dry_run: bool,
    },

    /// Validate the configuration and reference tables
    Check,

    /// Show every result of one competitor from the last load
    Profile {
        /// Pseudo-id, e.g. "Jane Doe (jd) - US"
        #[arg(long)]
        id: String,

        /// Also show the sum of the best K round scores per result
        #[arg(long, value_name = "K")]
        best_rounds: Option<usize>,
    },

    /// Show the lifetime points ranking from the last load
    Leaderboard {
        /// Number of competitors to show
        #[arg(long, default_value = "20")]
        limit: usize,
    },
}

fn load_config(cli: &Cli) -> Result<AppConfig> {
    let mut config = AppConfig::load_layered(&cli.config)
        .with_context(|| format!("Failed to load config from {:?}", cli.config))?;
    if let Some(dir) = &cli.data_dir {
        config.data_dir = dir.clone();
    }
    if let Some(path) = &cli.reference {
        config.reference_path = path.clone();
    }
    Ok(config)
}

fn load_reference(config: &AppConfig) -> Result<ReferenceTables> {
    ReferenceTables::from_file(&config.reference_path).with_context(|| {
        format!(
            "Failed to load reference tables from {:?}",
            config.reference_path
        )
    })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);
    if cli.json_logs {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }

    tracing::info!("Starting results-ledger v{}", env!("CARGO_PKG_VERSION"));

    let config = load_config(&cli)?;
    let storage = StorageConfig::new(config.data_dir.clone());

    match cli.command {
        Commands::Run { dry_run } => {
            let reference = load_reference(&config)?;
            let output = pipeline::load(&storage, &reference, &config.output)?;

            if dry_run {
                tracing::info!("Dry run: nothing written");
            } else {
                pipeline::write_outputs(&storage, &config.output, &output)?;
                tracing::info!("Outputs written to {:?}", storage.derived_dir());
            }

            println!("{}", output.report.summary());
        }

        Commands::Check => {
            let reference = load_reference(&config)?;
            println!("Configuration OK");
            println!("  Data dir:   {:?}", config.data_dir);
            println!("  Reference:  {} ({:?})", reference.version, config.reference_path);
            for source in Source::ALL {
                let years = reference.years(source);
                println!(
                    "  {:<10}  {} years registered, {} with playoff results",
                    source.as_str(),
                    years.len(),
                    reference.playoff_year_count(source)
                );
                if let (Some(first), Some(last)) = (years.first(), years.last()) {
                    println!("              {}..={}", first, last);
                }
            }
            println!(
                "  Overrides:  {} identity overrides",
                reference.identity_overrides.len()
            );
        }

        Commands::Profile { id, best_rounds } => {
            let id = PseudoId::from(id.as_str());
            let mut records: Vec<CompetitorRecord> = Vec::new();
            for source in Source::ALL {
                let reader: JsonlReader<CompetitorRecord> =
                    JsonlReader::new(storage.records_path(source));
                records.extend(reader.read_all()?);
            }
            if records.is_empty() {
                bail!("No records found in {:?}; run a load first", storage.derived_dir());
            }

            let outcomes = outcomes_for(&id, &records);
            if outcomes.is_empty() {
                println!("No results for {}", id);
                return Ok(());
            }

            println!("{}", id);
            for outcome in outcomes {
                println!("  {}  {:<10} {}", outcome.year, outcome.source.as_str(), outcome.label);
            }

            if let Some(k) = best_rounds {
                println!("Best {} rounds", k);
                for (year, source, total) in best_rounds_for(&id, &records, k) {
                    println!("  {}  {:<10} {:>8.1}", year, source.as_str(), total);
                }
            }
        }

        Commands::Leaderboard { limit } => {
            let reader: JsonlReader<LifetimeTotal> =
                JsonlReader::new(storage.lifetime_ranking_path());
            if !reader.exists() {
                bail!("No lifetime ranking in {:?}; run a load first", storage.derived_dir());
            }

            for (i, total) in reader.read_all()?.iter().take(limit).enumerate() {
                println!(
                    "{:>4}. {:<50} {:>10.1}  ({} years)",
                    i + 1,
                    total.pseudo_id.as_str(),
                    total.total_points,
                    total.years
                );
            }
        }
    }

    Ok(())
}
