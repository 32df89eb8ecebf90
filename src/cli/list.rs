//! CLI command listing the available checks.

use anyhow::Result;
use clap::Args;
use console::style;

use crate::checks::CheckKind;

#[derive(Args)]
#[command(about = "List the checks `run` knows about")]
pub struct ListCommand {}

impl ListCommand {
    pub fn execute(&self) -> Result<()> {
        for kind in CheckKind::all() {
            println!("  {:<26} {}", style(kind.name()).bold(), kind.description());
        }
        Ok(())
    }
}
