#![allow(clippy::missing_panics_doc, clippy::missing_errors_doc)]

use clap::{Parser, Subcommand};

use crate::driver::RunArgs;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run DSA analysis for a UniProt accession against its PDB ensemble
    Run(RunArgs),
}

fn main() {
    env_logger::init();
    let args = Cli::parse();

    let code = match args.command {
        Commands::Run(run_args) => driver::run(&run_args),
    };

    std::process::exit(code);
}

pub mod chain;
pub mod cif;
pub mod coord;
pub mod driver;
pub mod ensemble;
pub mod error;
pub mod mutation;
pub mod plotting;
pub mod refmap;
pub mod residue;
pub mod scorer;
