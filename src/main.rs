use anyhow::Result;
use clap::{Parser, Subcommand};

use topoprobe::cli::exec::ExecCommand;
use topoprobe::cli::list::ListCommand;
use topoprobe::cli::run::RunCommand;
use topoprobe::cli::topology::TopologyCommand;

#[derive(Parser)]
#[command(name = "topoprobe")]
#[command(about = "Verify a provisioned bastion/private-host topology over multi-hop SSH", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    Run(RunCommand),
    List(ListCommand),
    Exec(ExecCommand),
    Topology(TopologyCommand),
}

fn main() -> Result<()> {
    // Initialize logging with INFO level by default
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Run(cmd) => cmd.execute(),
        Commands::List(cmd) => cmd.execute(),
        Commands::Exec(cmd) => cmd.execute(),
        Commands::Topology(cmd) => cmd.execute(),
    }
}
