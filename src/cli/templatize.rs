//! Templatize captured documents.

use anyhow::{Context, Result};
use clap::Args;
use std::path::PathBuf;

use crate::deployer::{templatize_bundle, templatize_template};
use crate::models::{Bundle, Template};

/// Command to replace environment specific identifiers with placeholders.
///
/// The input is either one captured template or a bundle (an object with a
/// `templates` list). A bundle is templatized as a whole so that references
/// between its templates are found; a lone template only gets its own ids,
/// urls and field names templatized. Running the command on its own output
/// changes nothing.
#[derive(Args, Debug)]
pub struct TemplatizeCommand {
    /// Template or bundle file
    input: PathBuf,

    /// Write the result here instead of stdout
    #[arg(short, long)]
    output: Option<PathBuf>,
}

impl TemplatizeCommand {
    /// Execute the templatize command.
    pub async fn execute(self) -> Result<()> {
        let document = super::read_json(&self.input).await?;
        let output = self.output.as_deref();
        if document.get("templates").is_some() {
            let bundle: Bundle = serde_json::from_value(document)
                .with_context(|| format!("{} is not a valid bundle", self.input.display()))?;
            let templatized = templatize_bundle(&bundle);
            tracing::info!("Templatized {} template(s)", templatized.templates.len());
            return super::write_output(output, &templatized).await;
        }
        let template: Template = serde_json::from_value(document)
            .with_context(|| format!("{} is not a valid template", self.input.display()))?;
        super::write_output(output, &templatize_template(&template, &[], &[])).await
    }
}
