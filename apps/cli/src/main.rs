//! filingscan CLI: finds discontinued drug programs in SEC filings.
//!
//! Downloads filings from EDGAR, extracts keyword context windows, and asks
//! an LLM whether each window reports a discontinued drug.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
