use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{bench::BenchCommand, destroy::DestroyCommand, run::RunCommand};

#[derive(Parser)]
#[command(name = "otter-store", version, about = "Otter embedded key-value store")]
struct Cli {
    /// Path to a config file (default: search for otter-store.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Directory store paths resolve against
    #[arg(long, global = true, value_name = "DIR")]
    base_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a JSON-lines op script against a fresh context
    Run(RunCommand),
    /// Measure write and read throughput
    Bench(BenchCommand),
    /// Delete a store's files
    Destroy(DestroyCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let mut config = config::load_config(cli.config.as_deref())?;
    if let Some(base_dir) = cli.base_dir {
        config.store.base_dir = base_dir;
    }

    match cli.command {
        Commands::Run(cmd) => cmd.run(&config),
        Commands::Bench(cmd) => cmd.run(&config),
        Commands::Destroy(cmd) => cmd.run(&config),
    }
}
