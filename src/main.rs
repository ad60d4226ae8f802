use anyhow::Result;
use clap::Parser;

use genovec::cli::{self, Cli};
use genovec::utils::configuration::ConfigurationManager;

fn main() -> Result<()> {
    let cli = Cli::parse();

    let manager = match &cli.config {
        Some(path) => ConfigurationManager::from_file(path)?,
        None => ConfigurationManager::new()?,
    };
    manager.setup_logging(cli.verbose);

    let config = manager.config().clone();
    cli::run(cli, &config)
}
