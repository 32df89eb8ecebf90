//! CLI command running one ad-hoc probe, optionally through a bastion.

use anyhow::{anyhow, Result};
use clap::Args;
use std::path::PathBuf;

use crate::checks::{probes, CheckContext};
use crate::cli::load_config;
use crate::remote::connector::SshConnector;
use crate::remote::diagnostics;
use crate::topology;
use crate::verify::ExpectedOutcome;

#[derive(Args)]
#[command(about = "Run a command on a host with retries and print its output")]
pub struct ExecCommand {
    /// Host to run the command on
    pub host: String,

    /// Command to run
    pub command: String,

    /// Configuration file (default: ./topoprobe.yml, then the per-user config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Connect through the topology's bastion
    #[arg(short, long)]
    pub jump: bool,

    /// Fail unless the trimmed output equals this value
    #[arg(long)]
    pub expect: Option<String>,

    /// Keep retrying while the output doesn't match --expect
    #[arg(long, requires = "expect")]
    pub retry_on_mismatch: bool,
}

impl ExecCommand {
    pub fn execute(&self) -> Result<()> {
        let config = load_config(self.config.as_deref())?;
        let provider = topology::from_settings(&config.topology)?;
        let connector = SshConnector::new(&config.ssh);
        let ctx = CheckContext::new(&config, provider.as_ref(), &connector)?;

        let expected = self.expect.clone().map(ExpectedOutcome::Exact);

        let result = if self.jump {
            probes::jump_probe(
                &ctx,
                "exec",
                &self.host,
                &self.command,
                expected.as_ref(),
                self.retry_on_mismatch,
            )
        } else {
            probes::direct_probe(
                &ctx,
                "exec",
                &self.host,
                &self.command,
                expected.as_ref(),
                self.retry_on_mismatch,
            )
        };

        match result {
            Ok(report) => {
                println!("{}", report.output);
                log::info!("Succeeded after {} attempt(s)", report.attempts);
                Ok(())
            }
            Err(e) => Err(anyhow!(
                "{}",
                diagnostics::describe(&e, config.ssh.port, config.ssh.private_key.as_deref())
            )),
        }
    }
}
