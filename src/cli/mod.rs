//! Command-line interface for `soldeploy`.
//!
//! # Available Commands
//!
//! - `order` - print the deployment order of a bundle, or its dependency tree
//! - `templatize` - templatize a captured template or a whole bundle
//! - `detemplatize` - resolve placeholders against a saved settings registry
//! - `deploy` - deploy a bundle to the configured portal
//! - `capture` - capture one item from the configured portal as a template
//!
//! # Basic Workflow
//!
//! ```bash
//! # Capture the items of a solution
//! soldeploy capture 6f2c0e8b --output map.json
//!
//! # Check the order they will be created in
//! soldeploy order bundle.json --tree
//!
//! # Deploy, keeping going when an item fails
//! soldeploy deploy bundle.json --folder solutions --continue-on-error
//! ```
//!
//! # Global Options
//!
//! - `--verbose` / `-v`: debug logging
//! - `--quiet` / `-q`: errors only
//! - `--no-progress`: no progress bars (also `SOLDEPLOY_NO_PROGRESS`)
//! - `--config` / `-c`: configuration file (also `SOLDEPLOY_CONFIG`)

mod capture;
mod deploy;
mod detemplatize;
mod order;
mod templatize;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

use crate::config::DeployConfig;
use crate::constants::CONFIG_ENV_VAR;
use crate::models::Bundle;
use crate::utils::progress::is_progress_disabled;

/// Runtime configuration derived from the global options.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Log filter directive, `None` for errors only.
    pub log_level: Option<String>,

    /// Whether progress bars are suppressed.
    pub no_progress: bool,

    /// Configuration file given on the command line.
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    /// Create a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Install the tracing subscriber. `RUST_LOG` wins when set.
    pub fn init_logging(&self) {
        let directive = self.log_level.as_deref().unwrap_or("error");
        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(directive));
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .try_init();
    }

    /// Whether progress bars should be drawn.
    pub fn show_progress(&self) -> bool {
        !self.no_progress && !is_progress_disabled()
    }

    /// Load the deployer configuration.
    pub async fn load_deploy_config(&self) -> Result<DeployConfig> {
        let path = self.config_path.clone();
        let shown = path.as_ref().map(|p| p.display().to_string());
        DeployConfig::load_with_optional(path).await.with_context(|| match shown {
            Some(p) => format!("Failed to load configuration from {p}"),
            None => "Failed to load configuration".to_string(),
        })
    }
}

/// Deploy item bundles between portals.
#[derive(Parser)]
#[command(
    name = "soldeploy",
    about = "Templatize and deploy bundles of interrelated catalog items",
    version,
    long_about = "soldeploy captures interrelated catalog items (services, maps, apps) as \
                  placeholder-bearing templates and recreates them in another portal, \
                  fixing up ids, urls and field names on the way."
)]
pub struct Cli {
    /// Command to execute
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Only print errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    quiet: bool,

    /// Path to the configuration file
    #[arg(short, long, global = true, env = CONFIG_ENV_VAR)]
    config: Option<PathBuf>,

    /// Disable progress bars
    #[arg(long, global = true)]
    no_progress: bool,
}

/// Available subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Print the deployment order of a bundle
    Order(order::OrderCommand),

    /// Templatize a captured template or bundle
    Templatize(templatize::TemplatizeCommand),

    /// Resolve placeholders in a document
    Detemplatize(detemplatize::DetemplatizeCommand),

    /// Deploy a bundle to the configured portal
    Deploy(deploy::DeployCommand),

    /// Capture one item from the configured portal
    Capture(capture::CaptureCommand),
}

impl Cli {
    /// Execute the selected command.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        config.init_logging();
        self.execute_with_config(config).await
    }

    /// Build the runtime configuration from the global options.
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute the selected command with an explicit configuration.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        match self.command {
            Commands::Order(cmd) => cmd.execute().await,
            Commands::Templatize(cmd) => cmd.execute().await,
            Commands::Detemplatize(cmd) => cmd.execute().await,
            Commands::Deploy(cmd) => cmd.execute(&config).await,
            Commands::Capture(cmd) => cmd.execute(&config).await,
        }
    }
}

/// Load a bundle file with a readable error.
async fn load_bundle(path: &Path) -> Result<Bundle> {
    Bundle::load(path).await.with_context(|| format!("Failed to load bundle {}", path.display()))
}

/// Read and parse a JSON document.
async fn read_json(path: &Path) -> Result<serde_json::Value> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// Write pretty JSON to `output`, or to stdout.
async fn write_output(output: Option<&Path>, value: &impl serde::Serialize) -> Result<()> {
    match output {
        Some(path) => crate::utils::fs::write_json(path, value)
            .await
            .with_context(|| format!("Failed to write {}", path.display())),
        None => {
            println!("{}", serde_json::to_string_pretty(value)?);
            Ok(())
        }
    }
}
