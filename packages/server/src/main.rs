//! Main entry point for the devcert-dispenser binary

use clap::Parser;
use devcert_server::cli::Cli;
use devcert_server::logging::Logging;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    Logging::init();

    let cli = Cli::parse();
    devcert_server::run(cli).await?;
    Ok(())
}
