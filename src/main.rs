//! # Provisioner
//!
//! Command-line entry point: converges the bots' Google Cloud resources.
//!
//! ## Usage
//!
//! ```bash
//! # Show what would change
//! provisioner plan --project doo-bots
//!
//! # Converge the project
//! provisioner apply --config deploy.yaml --output json
//!
//! # Print the effective deployment file
//! provisioner show-config --config deploy.yaml
//!
//! # Print the deployment file JSON schema
//! provisioner schema
//! ```
//!
//! Logging and API endpoints are configured through environment variables
//! (see [`ProvisionerConfig`]); a `.env` file in the working directory is
//! loaded first.

use anyhow::{anyhow, Context, Result};
use bots_provisioner::config::{DeploymentConfig, ProvisionerConfig};
use bots_provisioner::observability::{init_logging, metrics};
use bots_provisioner::provider::gcp::{ambient_project_id, GcpRestClient};
use bots_provisioner::{Deployment, Mode};
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::{debug, error, info};

const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_HASH"),
    ", built ",
    env!("BUILD_DATETIME"),
    ")"
);

/// Idempotent provisioner for the dingers and transactions bots
#[derive(Parser)]
#[command(name = "provisioner", version = VERSION, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create or update every declared resource
    Apply(RunArgs),
    /// Report what `apply` would change without changing anything
    Plan(RunArgs),
    /// Print the effective deployment file as YAML
    ShowConfig(ConfigArgs),
    /// Print the JSON schema of the deployment file
    Schema,
}

#[derive(Args)]
struct ConfigArgs {
    /// Deployment file (defaults to the built-in two-bot deployment)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Target project id
    #[arg(short, long)]
    project: Option<String>,

    /// Target region
    #[arg(short, long)]
    region: Option<String>,
}

#[derive(Args)]
struct RunArgs {
    #[command(flatten)]
    config: ConfigArgs,

    /// Report format written to stdout
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Text)]
    output: OutputFormat,

    /// Write Prometheus metrics in text format to this file after the run
    #[arg(long)]
    metrics_file: Option<PathBuf>,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Configure rustls crypto provider FIRST, before any other operations
    // Required for rustls 0.23+ when no default provider is set via features
    rustls::crypto::ring::default_provider()
        .install_default()
        .map_err(|_| anyhow!("Failed to install rustls crypto provider"))?;

    let dotenv = dotenvy::dotenv();
    let runtime = ProvisionerConfig::from_env();
    init_logging(&runtime)?;
    if let Ok(path) = dotenv {
        debug!("Loaded environment from {}", path.display());
    }

    let cli = Cli::parse();
    match cli.command {
        Commands::Apply(args) => run(args, Mode::Apply, &runtime).await,
        Commands::Plan(args) => run(args, Mode::Plan, &runtime).await,
        Commands::ShowConfig(args) => {
            let config = resolve_config(&args).await?;
            print!("{}", config.to_yaml()?);
            Ok(())
        }
        Commands::Schema => {
            let schema = DeploymentConfig::json_schema();
            println!("{}", serde_json::to_string_pretty(&schema)?);
            Ok(())
        }
    }
}

/// Load the deployment file and apply command-line overrides
async fn resolve_config(args: &ConfigArgs) -> Result<DeploymentConfig> {
    let mut config = match &args.config {
        Some(path) => DeploymentConfig::load(path)
            .with_context(|| format!("Failed to load deployment file {}", path.display()))?,
        None => DeploymentConfig::default(),
    };

    if let Some(region) = &args.region {
        config.region.clone_from(region);
    }
    if let Some(project) = &args.project {
        config.project_id = Some(project.clone());
    }
    if config.project_id.is_none() {
        config.project_id = ambient_project_id().await;
    }
    Ok(config)
}

async fn run(args: RunArgs, mode: Mode, runtime: &ProvisionerConfig) -> Result<()> {
    let config = resolve_config(&args.config).await?;
    let project_id = config.project_id.clone().context(
        "No project id. Pass --project, set project_id in the deployment file, \
         set GOOGLE_CLOUD_PROJECT, or run `gcloud config set project`",
    )?;
    info!(
        project.id = %project_id,
        region = %config.region,
        mode = ?mode,
        "Starting provisioner {}",
        VERSION
    );

    metrics::register_metrics()?;
    let client = GcpRestClient::connect(runtime)
        .await
        .context("Failed to create GCP client")?;

    let result = Deployment::run(&config, &client, mode).await;

    if let Some(path) = &args.metrics_file {
        metrics::write_textfile(path)
            .with_context(|| format!("Failed to write metrics to {}", path.display()))?;
    }

    let report = result.map_err(|e| {
        error!("Provisioning aborted: {}", e);
        e
    })?;

    match args.output {
        OutputFormat::Text => print!("{}", report.render_text()),
        OutputFormat::Json => println!("{}", report.to_json()?),
    }
    Ok(())
}
