//! revchain CLI: the `revchain` command.

mod cli;
mod commands;
mod config;
mod support;

use clap::Parser;
use cli::{Cli, Commands};
use config::Config;
use revchain_kernel::RepairCommand;

fn main() {
    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref()).unwrap_or_else(|e| {
        eprintln!("error: {e}");
        std::process::exit(support::EXIT_FAILURE);
    });
    support::init_logging(cli.verbose, config.log.level.as_deref());

    match cli.command {
        Commands::Check { store, json } => commands::check::run(&config, store, json),

        Commands::FixChain { store, repair } => {
            commands::fix::run(&config, RepairCommand::FixChain, store, repair)
        }

        Commands::FixDuplicates { store, repair } => {
            commands::fix::run(&config, RepairCommand::FixDuplicates, store, repair)
        }

        Commands::FixAll { store, repair } => {
            commands::fix::run(&config, RepairCommand::FixAll, store, repair)
        }
    }
}
