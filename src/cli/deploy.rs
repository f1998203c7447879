//! Deploy a bundle to the configured portal.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use super::CliConfig;
use crate::catalog::rest::RestCatalog;
use crate::deployer::{
    DeployOptions, FailurePolicy, ProgressEvent, ProgressReporter, ProgressStatus, deploy_bundle,
};
use crate::settings::SettingsRegistry;
use crate::utils::progress::ProgressBar;

/// Command to recreate every item of a bundle in the configured portal.
///
/// Items are created in dependency order. By default the first failure stops
/// the deployment; `--continue-on-error` (or `on_item_failure = "continue"` in
/// the configuration) skips the failed item's dependents and deploys the rest.
/// Created items are never rolled back on failure.
#[derive(Args, Debug)]
pub struct DeployCommand {
    /// Bundle file
    bundle: PathBuf,

    /// Destination folder (overrides the configured folder)
    #[arg(long)]
    folder: Option<String>,

    /// Keep deploying independent items when one fails
    #[arg(long)]
    continue_on_error: bool,

    /// Write the settings registry (new ids, urls, field names) here
    #[arg(long)]
    settings_out: Option<PathBuf>,
}

impl DeployCommand {
    /// Execute the deploy command.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_deploy_config().await?;
        let bundle = super::load_bundle(&self.bundle).await?;
        let client = RestCatalog::from_config(&config)?;

        let options = DeployOptions {
            folder: self.folder.clone().or_else(|| config.folder.clone()),
            failure_policy: if self.continue_on_error {
                FailurePolicy::Continue
            } else {
                config.on_item_failure
            },
        };
        let mut registry = SettingsRegistry::with_globals(config.global_settings.clone());

        let total = bundle.total_cost();
        let bar = ProgressBar::with_visibility(total, cli.show_progress());
        let listener = bar.clone();
        let mut progress = ProgressReporter::new(
            total,
            Box::new(move |event: &ProgressEvent| {
                listener.set_length(event.total_cost);
                listener.set_position(event.cost_used);
                listener.set_message(format!("{} {}", event.process_id, event.status));
                if event.status == ProgressStatus::Failed {
                    listener.set_prefix("!");
                }
                true
            }),
        );

        let result = deploy_bundle(&bundle, &client, &mut registry, &options, &mut progress).await;
        bar.finish_and_clear();

        if let Some(path) = &self.settings_out {
            crate::utils::fs::write_json(path, &registry)
                .await
                .with_context(|| format!("Failed to write settings {}", path.display()))?;
        }

        let report = result?;
        for item in &report.deployed {
            println!("{} {} → {}", "✓".green(), item.owner_id, item.new_id);
        }
        for item in &report.failed {
            println!("{} {}: {}", "✗".red(), item.owner_id, item.error);
        }
        for owner_id in &report.skipped {
            println!("{} {} (dependency failed)", "-".yellow(), owner_id);
        }
        if !report.is_complete() {
            anyhow::bail!(
                "{} item(s) failed and {} were skipped",
                report.failed.len(),
                report.skipped.len()
            );
        }
        Ok(())
    }
}
