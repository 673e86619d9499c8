//! Seoforge CLI — keyword research and content-strategy pipeline.
//!
//! Expands a topic into a scored query pool, analyzes the winning queries'
//! SERPs for content gaps, and emits an article outline.

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
