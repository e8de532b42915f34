//! CLI entry point for analyzer-core.
//!
//! - `parse`: decode a captured LIS2-A2 message and print what the ingest
//!   pipeline would see
//! - `query`: run an active field query against a TCP instrument
//! - `config`: print the effective configuration
//!
//! ```bash
//! analyzer-core parse capture.astm
//! analyzer-core query --host 192.168.1.50 --port 5000
//! ANALYZER_PROTOCOL__READ_TIMEOUT_SECS=60 analyzer-core config
//! ```

use analyzer_core::config::AnalyzerConfig;
use analyzer_core::lifecycle::LifecycleManager;
use analyzer_core::logging::init_tracing;
use analyzer_core::model::Analyzer;
use analyzer_core::query::{QueryService, TcpConnector};
use analyzer_core::repository::Repositories;
use analyzer_core::segment::{parse_field_records, parse_message, split_records};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

#[derive(Parser)]
#[command(name = "analyzer-core")]
#[command(about = "Laboratory analyzer integration tools", long_about = None)]
struct Cli {
    /// Configuration file (defaults to config/analyzer.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a message file and print its results, QC segments and fields as JSON
    Parse {
        /// Path to the raw message
        file: PathBuf,
    },

    /// Query a TCP instrument for its fields
    Query {
        #[arg(long)]
        host: String,

        #[arg(long)]
        port: u16,

        /// Id under which the instrument is registered for this run
        #[arg(long, default_value = "cli-analyzer")]
        analyzer_id: String,
    },

    /// Print the effective configuration as TOML
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => AnalyzerConfig::load_from(path),
        None => AnalyzerConfig::load(),
    }
    .context("Failed to load configuration")?;
    init_tracing(&config.application);

    match cli.command {
        Commands::Parse { file } => parse_file(file).await,
        Commands::Query {
            host,
            port,
            analyzer_id,
        } => run_query(&config, host, port, analyzer_id).await,
        Commands::Config => {
            println!("{}", toml::to_string_pretty(&config)?);
            Ok(())
        }
    }
}

async fn parse_file(path: PathBuf) -> Result<()> {
    let raw = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let parsed = parse_message(&raw)?;
    let records: Vec<&str> = split_records(&raw).collect();
    let fields = parse_field_records(&records);
    info!(
        results = parsed.results.len(),
        qc_segments = parsed.qc_segments.len(),
        "Parsed {}",
        path.display()
    );

    let output = json!({
        "instrument_id": parsed.instrument_id,
        "results": parsed.results,
        "qc_segments": parsed.qc_segments,
        "fields": fields,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn run_query(
    config: &AnalyzerConfig,
    host: String,
    port: u16,
    analyzer_id: String,
) -> Result<()> {
    let repos = Repositories::in_memory();
    repos
        .analyzers
        .save(Analyzer::new(&analyzer_id, &analyzer_id).with_address(host, port))
        .await?;

    let lifecycle = Arc::new(LifecycleManager::new(
        repos.analyzers.clone(),
        config.lifecycle.event_channel_capacity,
    ));
    let connector = Arc::new(TcpConnector::new(config.protocol.connect_timeout()));
    let service = Arc::new(QueryService::new(
        repos,
        lifecycle,
        connector,
        config.protocol.clone(),
    ));

    let job_id = service.start_query(&analyzer_id).await?;
    let status = loop {
        tokio::time::sleep(Duration::from_millis(200)).await;
        let status = service.get_status(&analyzer_id, &job_id).await?;
        if status.job.state.is_terminal() {
            break status;
        }
    };

    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}
