//! firmil CLI - compile managed methods for Firmata microcontrollers.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

#[derive(Parser)]
#[command(
    name = "firmil",
    version,
    about = "Compile managed methods into Firmata IL uploads",
    long_about = "firmil turns an assembly description into the sysex frames a Firmata\n\
                  IL interpreter understands.\n\n\
                  Compile:   firmil compile app.json --entry Demo.Program::Main\n\
                  Inspect:   firmil inspect app.json --method Demo.Program::Main"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compile an entry point and its dependencies
    Compile(commands::compile::CompileCommand),
    /// Show the control-flow graph of a method
    Inspect(commands::inspect::InspectCommand),
    /// Show protocol constants and configuration
    Info(commands::info::InfoCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose { "debug" } else { "warn" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.parse()?))
        .with_writer(std::io::stderr)
        .init();

    let config = config::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Compile(cmd) => cmd.run(&config).await,
        Commands::Inspect(cmd) => cmd.run(&config).await,
        Commands::Info(cmd) => cmd.run(&config).await,
    }
}
