//! Print the deployment order of a bundle.

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use std::path::PathBuf;

use crate::resolver::{DependencyGraph, undeclared_references};

/// Command to show the order in which a bundle's items are deployed.
///
/// Items are listed dependencies first. With `--tree` the dependency tree of
/// every top-level item is printed instead. Placeholders that reference a
/// bundle item the template does not declare as a dependency are reported as
/// warnings: such references would be left unresolved if the referenced item
/// happens to be deployed later.
#[derive(Args, Debug)]
pub struct OrderCommand {
    /// Bundle file
    bundle: PathBuf,

    /// Show dependency trees instead of a flat list
    #[arg(long)]
    tree: bool,
}

impl OrderCommand {
    /// Execute the order command.
    pub async fn execute(self) -> Result<()> {
        let bundle = super::load_bundle(&self.bundle).await?;
        bundle.validate()?;
        let graph = DependencyGraph::from_templates(&bundle.templates)?;
        let order = graph.sequence()?;

        for template in &bundle.templates {
            for missing in undeclared_references(template, &bundle) {
                eprintln!(
                    "{} {} references {} without declaring it as a dependency",
                    "warning:".yellow().bold(),
                    template.owner_id,
                    missing
                );
            }
        }

        if self.tree {
            for root in graph.roots() {
                print!("{}", graph.to_tree_string(&root.owner_id));
            }
            return Ok(());
        }

        for (index, owner_id) in order.iter().enumerate() {
            let title = bundle.get(owner_id).map(|t| t.title()).unwrap_or_default();
            println!("{:>3}. {} {}", index + 1, owner_id.bold(), title.dimmed());
        }
        Ok(())
    }
}
