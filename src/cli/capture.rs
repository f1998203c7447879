//! Capture one item from the configured portal.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use super::CliConfig;
use crate::catalog::rest::RestCatalog;
use crate::deployer::capture_template;
use crate::utils::progress::ProgressBar;

/// Command to capture a live item as a templatized template.
///
/// The item's `dependencies` are fetched as well so that references to them
/// become placeholders. Captured templates can be collected into a bundle's
/// `templates` list and deployed with `soldeploy deploy`.
#[derive(Args, Debug)]
pub struct CaptureCommand {
    /// Id of the item to capture
    item_id: String,

    /// Write the template here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl CaptureCommand {
    /// Execute the capture command.
    pub async fn execute(self, cli: &CliConfig) -> Result<()> {
        let config = cli.load_deploy_config().await?;
        let client = RestCatalog::from_config(&config)?;
        let spinner =
            if cli.show_progress() { ProgressBar::new_spinner() } else { ProgressBar::hidden() };
        spinner.set_message(format!("Capturing {}", self.item_id));
        let captured = capture_template(&client, &self.item_id).await;
        spinner.finish_and_clear();
        let template =
            captured.with_context(|| format!("Failed to capture item {}", self.item_id))?;
        super::write_output(self.output.as_deref(), &template).await
    }
}
