//! Instrument listing and validation commands.

use super::common::load_instrument;
use clap::{Args, Subcommand};
use std::path::{Path, PathBuf};
use voxtree_config::{
    Instrument, factory_instrument_names, get_factory_instrument, validate_instrument,
};

#[derive(Args)]
pub struct InstrumentsArgs {
    #[command(subcommand)]
    command: Option<InstrumentsCommand>,
}

#[derive(Subcommand)]
enum InstrumentsCommand {
    /// List factory instruments
    List,

    /// Print an instrument as TOML
    Show {
        /// Factory instrument name or instrument file
        name: String,
    },

    /// Validate an instrument file
    Validate {
        /// Instrument file (TOML)
        path: PathBuf,
    },
}

pub fn run(args: InstrumentsArgs) -> anyhow::Result<()> {
    match args.command.unwrap_or(InstrumentsCommand::List) {
        InstrumentsCommand::List => list_instruments(),
        InstrumentsCommand::Show { name } => show_instrument(&name),
        InstrumentsCommand::Validate { path } => validate_file(&path),
    }
}

fn list_instruments() -> anyhow::Result<()> {
    println!("Factory Instruments:");
    println!("====================");
    for id in factory_instrument_names() {
        let desc = get_factory_instrument(id)
            .and_then(|i| i.description)
            .unwrap_or_default();
        println!("  {:14} - {}", id, desc);
    }
    Ok(())
}

fn show_instrument(name: &str) -> anyhow::Result<()> {
    let instrument = load_instrument(name)?;
    print!("{}", instrument.to_toml()?);
    Ok(())
}

fn validate_file(path: &Path) -> anyhow::Result<()> {
    let instrument = Instrument::load(path)?;
    match validate_instrument(&instrument) {
        Ok(()) => {
            println!(
                "{}: ok ({} containers, {} templates)",
                path.display(),
                instrument.containers.len(),
                instrument.template_count()
            );
            Ok(())
        }
        Err(err) => {
            for e in err.errors() {
                println!("  {e}");
            }
            anyhow::bail!("{} is not a valid instrument", path.display())
        }
    }
}
