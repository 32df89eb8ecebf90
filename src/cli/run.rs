//! CLI command running the topology checks.

use anyhow::{anyhow, Result};
use clap::Args;
use console::style;
use std::path::PathBuf;

use crate::checks::{run_checks, CheckContext, CheckKind, Verdict};
use crate::cli::load_config;
use crate::config::Config;
use crate::remote::connector::SshConnector;
use crate::remote::diagnostics;
use crate::topology;

#[derive(Args)]
#[command(about = "Run topology checks and report a verdict for each")]
pub struct RunCommand {
    /// Configuration file (default: ./topoprobe.yml, then the per-user config)
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Only run these checks (repeatable; see `topoprobe list`)
    #[arg(long = "check", value_name = "NAME")]
    pub checks: Vec<String>,

    /// Stop at the first failing check
    #[arg(long)]
    pub fail_fast: bool,

    /// Override retry.max_attempts
    #[arg(long)]
    pub attempts: Option<u32>,

    /// Override retry.delay_secs
    #[arg(long)]
    pub delay: Option<u64>,

    /// Print troubleshooting detail for failures
    #[arg(short, long)]
    pub verbose: bool,
}

impl RunCommand {
    pub fn execute(&self) -> Result<()> {
        let mut config = load_config(self.config.as_deref())?;
        if let Some(attempts) = self.attempts {
            config.retry.max_attempts = attempts;
        }
        if let Some(delay) = self.delay {
            config.retry.delay_secs = delay;
        }
        config.validate()?;

        let checks = self.selected_checks()?;
        let provider = topology::from_settings(&config.topology)?;
        let connector = SshConnector::new(&config.ssh);
        let ctx = CheckContext::new(&config, provider.as_ref(), &connector)?;

        let verdicts = run_checks(&ctx, &checks, self.fail_fast);
        self.print_report(&config, &verdicts);

        let failed = verdicts.iter().filter(|v| !v.passed()).count();
        if failed > 0 {
            return Err(anyhow!("{} of {} check(s) failed", failed, verdicts.len()));
        }
        Ok(())
    }

    fn selected_checks(&self) -> Result<Vec<CheckKind>> {
        if self.checks.is_empty() {
            return Ok(CheckKind::all().to_vec());
        }
        let checks = self
            .checks
            .iter()
            .map(|name| name.parse::<CheckKind>())
            .collect::<crate::error::Result<Vec<_>>>()?;
        Ok(checks)
    }

    fn print_report(&self, config: &Config, verdicts: &[Verdict]) {
        println!();
        for verdict in verdicts {
            match &verdict.outcome {
                Ok(summary) => println!(
                    "{} {:<26} {}",
                    style("PASS").green().bold(),
                    verdict.check.name(),
                    style(summary).dim()
                ),
                Err(e) => {
                    println!(
                        "{} {:<26} {}",
                        style("FAIL").red().bold(),
                        verdict.check.name(),
                        e
                    );
                    if self.verbose {
                        let detail = diagnostics::describe(
                            e,
                            config.ssh.port,
                            config.ssh.private_key.as_deref(),
                        );
                        for line in detail.lines() {
                            println!("       {}", line);
                        }
                    }
                }
            }
        }

        let passed = verdicts.iter().filter(|v| v.passed()).count();
        println!("\n{}/{} checks passed", passed, verdicts.len());
    }
}
