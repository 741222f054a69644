#![recursion_limit = "256"]

mod cli;
mod application;
mod domain;
mod language;
mod search;
mod supervision;
mod data;
mod ml;
mod infra;

use anyhow::Result;
use cli::Cli;
use clap::Parser;

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("drop_semparse=info")),
        )
        .init();

    let cli = Cli::parse();
    cli.run()
}
