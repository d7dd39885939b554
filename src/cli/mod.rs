//! # Command Line Interface
//!
//! Parses flags, wires the gateways together and runs one rotation batch.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use crate::ci::{CiProjectGateway, CircleClient, CircleConfig};
use crate::config::{self, Credentials};
use crate::identity::IdentityProviderRegistry;
use crate::observability::{init_logging, LogFormat};
use crate::rotation::{Orchestrator, RunSummary};
use crate::{APP_NAME, VERSION};

#[derive(Parser, Debug)]
#[command(name = "torque")]
#[command(about = "Rotate CI user passwords in UAA and distribute them to CircleCI projects")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Path to configuration file
    #[arg(
        long = "config-file",
        alias = "config.file",
        env = "TORQUE_CONFIG_FILE",
        default_value = "config.yaml"
    )]
    pub config_file: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Log output format (text or json)
    #[arg(long, env = "TORQUE_LOG_FORMAT", default_value = "text")]
    pub log_format: LogFormat,
}

/// Run CLI commands
pub async fn run_cli() -> anyhow::Result<RunSummary> {
    run(Cli::parse()).await
}

pub async fn run(cli: Cli) -> anyhow::Result<RunSummary> {
    // Load .env file if it exists (optional - won't fail if missing)
    if let Err(e) = dotenvy::dotenv() {
        if !e.to_string().contains("not found") {
            eprintln!("Warning: Error loading .env file: {}", e);
        }
    }

    init_logging(cli.verbose, cli.log_format)?;
    info!(app_name = APP_NAME, version = VERSION, "started");

    let settings = config::load_file(&cli.config_file).context("Problem loading config")?;
    let topology = settings.topology()?;
    info!(
        config_file = %cli.config_file.display(),
        instances = topology.instances().len(),
        orgs = topology.orgs().len(),
        uaa_origin = %settings.uaa_origin,
        "Using config"
    );

    let credentials = Credentials::from_env(topology.instances())?;

    let uaa_verbose = cli.verbose || uaa_verbose_enabled(std::env::var("UAA_VERBOSE").ok());
    let identity =
        IdentityProviderRegistry::connect(&topology, &settings, &credentials, uaa_verbose).await?;

    let circle = CircleClient::connect(CircleConfig {
        base_url: settings.circle.base_url.clone(),
        vcs_type: settings.circle.vcs_type.clone(),
        token: credentials.circle_token().clone(),
        timeout: settings.timeout(),
        verbose: cli.verbose,
    })
    .await
    .context("Problem using Circle")?;

    let orchestrator = Orchestrator::new(identity, CiProjectGateway::new(Arc::new(circle)));
    let summary = orchestrator.run(&topology).await?;

    info!("finished");
    Ok(summary)
}

/// `UAA_VERBOSE` is on when set to anything but "0".
fn uaa_verbose_enabled(value: Option<String>) -> bool {
    matches!(value.as_deref(), Some(v) if v != "0")
}
