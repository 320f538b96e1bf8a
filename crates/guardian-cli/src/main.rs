//! Privacy Guardian CLI
//!
//! # Usage
//! ```bash
//! privacy-guardian scan ./my-project --format markdown --output report.md
//! privacy-guardian status --config guardian.toml
//! ```

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use colored::Colorize;
use guardian_agents::orchestrator::{Pipeline, PipelineRun};
use guardian_core::ports::{
    DirSecretStore, EnvSecretStore, JsonlAnalyticsSink, NoopAnalytics, TracingMetrics,
};
use guardian_core::{CorrelationId, GuardianConfig, Ports};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Privacy Guardian - AI-augmented privacy compliance scanning
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML, or JSON by extension)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Scan a project and print the privacy report
    Scan {
        /// Project directory handed to the rule engine
        path: PathBuf,

        /// Report format
        #[arg(short, long, value_enum, default_value = "markdown")]
        format: ReportFormat,

        /// Write the report to a file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,

        /// Correlation id for this run (generated when absent)
        #[arg(long)]
        correlation_id: Option<String>,
    },

    /// Print every unit's status snapshot as JSON
    Status,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Markdown,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .with_writer(std::io::stderr)
        .init();

    let config = load_config(cli.config.as_deref())?;
    let ports = build_ports(&config);
    let pipeline = Pipeline::from_config(config, ports)
        .await
        .context("invalid Privacy Guardian configuration")?;

    match cli.command {
        Commands::Scan {
            path,
            format,
            output,
            correlation_id,
        } => {
            let correlation_id = correlation_id
                .map(CorrelationId::new)
                .unwrap_or_else(CorrelationId::generate);
            let run = pipeline.run_with_correlation(&path, correlation_id).await;

            let rendered = match format {
                ReportFormat::Json => run.report.to_json()?,
                ReportFormat::Markdown => run.report.render_markdown(),
            };

            match output {
                Some(file) => {
                    std::fs::write(&file, rendered)
                        .with_context(|| format!("failed to write report to {}", file.display()))?;
                    print_summary(&run);
                    eprintln!("Report written to {}", file.display());
                }
                None => println!("{}", rendered),
            }
        }
        Commands::Status => {
            println!("{}", serde_json::to_string_pretty(&pipeline.statuses())?);
        }
    }

    Ok(())
}

/// File (when given) or defaults, with the environment overlaid
fn load_config(path: Option<&Path>) -> anyhow::Result<GuardianConfig> {
    let mut config = match path {
        Some(path) => GuardianConfig::from_file(path)?,
        None => GuardianConfig::default(),
    };
    config.apply_env(|key| std::env::var(key).ok())?;
    tracing::debug!(
        model = %config.oracle.model,
        max_file_chars = config.enhancement.max_file_chars,
        "Configuration loaded"
    );
    Ok(config)
}

fn build_ports(config: &GuardianConfig) -> Ports {
    let mut ports = Ports::noop().with_metrics(Arc::new(TracingMetrics));

    ports = match &config.analytics_dir {
        Some(dir) => ports.with_analytics(Arc::new(JsonlAnalyticsSink::new(dir))),
        None => ports.with_analytics(Arc::new(NoopAnalytics)),
    };

    match &config.secrets_dir {
        Some(dir) => ports.with_secrets(Arc::new(DirSecretStore::new(dir))),
        None => ports.with_secrets(Arc::new(EnvSecretStore)),
    }
}

fn print_summary(run: &PipelineRun) {
    let report = &run.report;
    eprintln!();
    eprintln!("{} {}", "Run".bold(), run.correlation_id);
    eprintln!(
        "  {} findings: {} high, {} medium, {} low",
        report.total_findings,
        report.by_severity.high.to_string().red().bold(),
        report.by_severity.medium.to_string().yellow(),
        report.by_severity.low.to_string().green()
    );
    if let Some(compliance) = &report.compliance {
        eprintln!(
            "  compliance: {} (score {}/100)",
            compliance.status.to_string().bold(),
            compliance.score
        );
    }
}
