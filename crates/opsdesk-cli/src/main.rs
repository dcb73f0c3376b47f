mod cli;
mod commands;
mod observability;
mod output;

use anyhow::{Context, Result};
use clap::Parser;

use cli::{Cli, Commands};
use commands::Engine;
use opsdesk_authz::config::loader;
use output::print_error;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        print_error(&format!("{e:#}"));
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let format = cli.format.unwrap_or_default();

    observability::init_tracing_with_level(cli.log_level.as_deref().unwrap_or("warn"));

    let config = loader::load_config(cli.config.as_deref()).context("loading configuration")?;
    if cli.log_level.is_none() {
        observability::apply_logging_level(&config.logging.level);
    }
    tracing::debug!(ttl = ?config.cache.ttl, "Configuration loaded");

    let engine = Engine::load(config, cli.fixture.as_deref())?;

    match &cli.command {
        Commands::Check(args) => commands::check::run(&engine, args, format).await?,
        Commands::Roles => commands::roles::run(&engine, format).await?,
        Commands::Permissions(args) => commands::permissions::run(&engine, args, format).await?,
    }
    Ok(())
}
