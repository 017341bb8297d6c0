use anyhow::Context;
use clap::Parser;

use spendiq::commands::{self, Cli};
use spendiq::{logging, AppConfig};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config = AppConfig::load(cli.config.as_deref()).context("Failed to load configuration")?;
    logging::init(&config.log_filter);

    let output = commands::run(&config, cli).await?;
    print!("{output}");
    Ok(())
}
