//! Voxtree CLI - render and inspect instruments built on the voxtree graph.

mod commands;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "voxtree")]
#[command(author, version, about = "Voxtree processing graph CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render an instrument offline to a WAV file
    Render(commands::render::RenderArgs),

    /// Show the topology, templates and ports of an instrument
    Info(commands::info::InfoArgs),

    /// List, show and validate instruments
    Instruments(commands::instruments::InstrumentsArgs),
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => commands::render::run(args),
        Commands::Info(args) => commands::info::run(args),
        Commands::Instruments(args) => commands::instruments::run(args),
    }
}
