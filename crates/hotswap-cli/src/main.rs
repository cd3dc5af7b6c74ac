//! Hotswap CLI - reload trigger console for the hotswap engine

mod cli;
mod commands;
mod output;
mod window;

use clap::Parser;
use cli::{Cli, Commands};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize logging, on stderr so reports on stdout stay parseable
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Some(Commands::Init { force }) => commands::init::run(&cli.config, force),
        Some(Commands::Reload { json }) => {
            commands::reload::run(&cli.config, cli.stage.as_deref(), json)
        }
        Some(Commands::Console) | None => {
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(commands::console::run(&cli.config, cli.stage.as_deref()))
        }
    }
}
