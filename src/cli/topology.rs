//! CLI command showing the topology as the checks will see it.

use anyhow::Result;
use clap::Args;
use console::style;
use std::path::PathBuf;

use crate::cli::load_config;
use crate::topology::{self, Role};

#[derive(Args)]
#[command(about = "Show the resolved hosts for each role")]
pub struct TopologyCommand {
    /// Configuration file (default: ./topoprobe.yml, then the per-user config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

impl TopologyCommand {
    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let provider = topology::from_settings(&config.topology)?;

        for role in Role::all() {
            match provider.hosts(role) {
                Ok(hosts) => println!("  {:<14} {}", style(role).bold(), hosts.join(", ")),
                Err(e) => println!("  {:<14} {}", style(role).bold(), style(e).dim()),
            }
        }

        let public = &config.topology.outputs.load_balancer_public;
        let names = std::iter::once(public).chain(config.network.attributes.keys());
        for name in names {
            match provider.attribute(name) {
                Ok(value) => println!("  {:<14} {} = {}", style("attribute").bold(), name, value),
                Err(e) => println!("  {:<14} {}", style("attribute").bold(), style(e).dim()),
            }
        }
        Ok(())
    }
}
