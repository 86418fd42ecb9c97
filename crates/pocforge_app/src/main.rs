mod cli;
mod commands;
mod platform;

use clap::Parser;

use cli::{Cli, LogTarget};
use platform::logging::{self, LogDestination};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let destination = match cli.log {
        LogTarget::Terminal => LogDestination::Terminal,
        LogTarget::File => LogDestination::File,
        LogTarget::Both => LogDestination::Both,
    };
    logging::initialize(destination, logging::level_for(cli.verbose));

    commands::run(cli)
}
