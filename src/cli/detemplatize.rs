//! Resolve placeholders against a saved settings registry.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::settings::SettingsRegistry;
use crate::templating::Detemplatizer;

/// Command to resolve the placeholders of any JSON document.
///
/// The settings file is a registry as written by `deploy --settings-out`.
/// Placeholders that cannot be resolved are left in place.
#[derive(Args, Debug)]
pub struct DetemplatizeCommand {
    /// Document to resolve
    input: PathBuf,

    /// Settings registry file
    #[arg(short, long)]
    settings: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl DetemplatizeCommand {
    /// Execute the detemplatize command.
    pub async fn execute(self) -> Result<()> {
        let document = super::read_json(&self.input).await?;
        let registry = SettingsRegistry::load(&self.settings)
            .await
            .with_context(|| format!("Failed to load settings {}", self.settings.display()))?;
        let resolved = Detemplatizer::new(&registry).resolve_value(&document);
        super::write_output(self.output.as_deref(), &resolved).await
    }
}
