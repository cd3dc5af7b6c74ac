//! CLI command definitions using clap

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Hotswap CLI - reload modules inside a running host
#[derive(Parser)]
#[command(name = "hotswap")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Reload settings file
    #[arg(
        short = 'c',
        long,
        global = true,
        env = "HOTSWAP_CONFIG",
        default_value = "hotswap.toml"
    )]
    pub config: PathBuf,

    /// Host stage to start in (overrides the settings file)
    #[arg(short, long, global = true)]
    pub stage: Option<String>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands
#[derive(Subcommand)]
pub enum Commands {
    /// Write a starter settings file
    Init {
        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Run a single reload cycle and print its report
    Reload {
        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive trigger console (default)
    Console,
}
