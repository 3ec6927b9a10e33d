use anyhow::Context;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing::{info, warn};

use brewpipe::config::{PipelineConfig, StoreBackend};
use brewpipe::constants::DEFAULT_CONFIG_PATH;
use brewpipe::observability;
use brewpipe::types::{AggregateRecord, StateCount, TypeDistribution};
use brewpipe::{Pipeline, StageReport};

#[derive(Parser)]
#[command(name = "brewpipe")]
#[command(about = "Bronze/silver/gold pipeline for brewery records")]
#[command(version)]
struct Cli {
    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Document store backend (overrides config and environment)
    #[arg(long, global = true, value_enum)]
    store: Option<StoreBackend>,

    /// SQLite database path (overrides config and environment)
    #[arg(long, global = true)]
    sqlite_path: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Seed the raw layer from a JSON export
    LoadRaw {
        /// JSON array of breweries, or a paged {"data": [...]} response
        file: PathBuf,
    },
    /// Run the silver transformation (raw -> clean)
    Silver,
    /// Run the gold aggregation (clean -> aggregated)
    Gold,
    /// Run silver then gold, then print the reports
    Run {
        /// Load this export into the raw layer first
        #[arg(long)]
        raw: Option<PathBuf>,
        /// Number of states in the top-states report
        #[arg(long)]
        limit: Option<usize>,
    },
    /// States with the most breweries
    TopStates {
        #[arg(long)]
        limit: Option<usize>,
    },
    /// Brewery counts per type with state coverage
    TypeDistribution,
    /// Breweries with coordinates, as JSON
    Geo {
        #[arg(long)]
        cap: Option<usize>,
    },
    /// Document counts per layer
    Status,
}

fn print_stage(label: &str, report: &StageReport) {
    println!(
        "✅ {} completed: read {}, inserted {}, replaced {}{}",
        label,
        report.records_read,
        report.inserted,
        report.replaced,
        if report.records_excluded > 0 {
            format!(", excluded {} below threshold", report.records_excluded)
        } else {
            String::new()
        }
    );
}

fn print_top_states(rows: &[StateCount]) {
    println!("🏆 Top {} States by Brewery Count:", rows.len());
    for (i, row) in rows.iter().enumerate() {
        println!(
            "  {}. {}: {} breweries",
            i + 1,
            row.state.as_deref().unwrap_or("(none)"),
            row.total_breweries
        );
    }
}

fn print_type_distribution(rows: &[TypeDistribution]) {
    println!("🍻 Brewery Type Distribution:");
    for row in rows {
        println!(
            "  • {}: {} (across {} states)",
            row.brewery_type.as_deref().unwrap_or("(none)"),
            row.count,
            row.states_covered
        );
    }
}

fn print_aggregates(rows: &[AggregateRecord]) {
    println!("📊 Gold layer ({} groups):", rows.len());
    for row in rows {
        println!(
            "  {} / {} / {}: {} breweries, website {:.2}%, phone {:.2}%, coordinates {:.2}%, avg completeness {:.3}",
            row.country.as_deref().unwrap_or("-"),
            row.state.as_deref().unwrap_or("-"),
            row.brewery_type.as_deref().unwrap_or("-"),
            row.total_breweries,
            row.website_coverage,
            row.phone_coverage,
            row.coordinates_coverage,
            row.avg_completeness_score
        );
    }
}

async fn run(cli: Cli, config: PipelineConfig) -> anyhow::Result<()> {
    let top_limit = config.reporting.top_states_limit;
    let geo_cap = config.reporting.geo_cap;
    let pipeline = Pipeline::connect(config).await?;

    let result = match cli.command {
        Commands::LoadRaw { file } => pipeline
            .load_raw(&file)
            .await
            .map(|report| print_stage("Raw load", &report)),
        Commands::Silver => pipeline
            .run_silver()
            .await
            .map(|report| print_stage("Silver layer", &report)),
        Commands::Gold => pipeline
            .run_gold()
            .await
            .map(|report| print_stage("Gold layer", &report)),
        Commands::Run { raw, limit } => {
            println!("🔄 Running aggregation pipeline (silver -> gold)...");
            full_run(&pipeline, raw, limit.unwrap_or(top_limit)).await
        }
        Commands::TopStates { limit } => pipeline
            .top_states(limit.unwrap_or(top_limit))
            .await
            .map(|rows| print_top_states(&rows)),
        Commands::TypeDistribution => pipeline
            .type_distribution()
            .await
            .map(|rows| print_type_distribution(&rows)),
        Commands::Geo { cap } => pipeline
            .geographic_subset(cap.unwrap_or(geo_cap))
            .await
            .and_then(|points| {
                println!("{}", serde_json::to_string_pretty(&points)?);
                Ok(())
            }),
        Commands::Status => pipeline.status().await.map(|counts| {
            println!("📊 Bronze layer (raw): {} documents", counts.raw);
            println!("📊 Silver layer (clean): {} documents", counts.clean);
            println!("📊 Gold layer (aggregated): {} documents", counts.aggregated);
        }),
    };

    if let Err(e) = pipeline.close().await {
        warn!("Failed to close store: {}", e);
    }
    result.map_err(Into::into)
}

async fn full_run(
    pipeline: &Pipeline,
    raw: Option<PathBuf>,
    limit: usize,
) -> brewpipe::Result<()> {
    if let Some(file) = raw {
        print_stage("Raw load", &pipeline.load_raw(&file).await?);
    }
    print_stage("Silver layer", &pipeline.run_silver().await?);
    print_stage("Gold layer", &pipeline.run_gold().await?);

    // Report failures are shown but do not fail a run whose layers were written
    match pipeline.top_states(limit).await {
        Ok(rows) => print_top_states(&rows),
        Err(e) => println!("⚠️ Failed to get top states: {}", e),
    }
    match pipeline.type_distribution().await {
        Ok(rows) => print_type_distribution(&rows),
        Err(e) => println!("⚠️ Failed to get type distribution: {}", e),
    }
    match pipeline.aggregates().await {
        Ok(rows) => print_aggregates(&rows),
        Err(e) => println!("⚠️ Failed to read gold layer: {}", e),
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (config_path, required) = match &cli.config {
        Some(path) => (path.clone(), true),
        None => (PathBuf::from(DEFAULT_CONFIG_PATH), false),
    };
    let mut config = PipelineConfig::load(&config_path, required)
        .with_context(|| format!("loading configuration from {}", config_path.display()))?;
    if let Some(backend) = cli.store {
        config.store.backend = backend;
    }
    if let Some(path) = &cli.sqlite_path {
        config.store.sqlite_path = path.clone();
    }

    let _log_guard = observability::init_logging(&config.log_dir);
    info!(backend = ?config.store.backend, "Starting brewpipe");
    if config.store.backend == StoreBackend::Memory && !matches!(cli.command, Commands::Run { .. }) {
        warn!("Memory backend starts empty and is dropped on exit; nothing carries over to later commands");
    }

    run(cli, config).await
}
