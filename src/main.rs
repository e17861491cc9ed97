//! Demo CLI entry point: train a generator from plain-text example grids,
//! or generate a new grid from a trained one.

use clap::Parser;
use tilesynth::io::cli::{run_generate, run_train, Cli, Command};

fn main() -> tilesynth::Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Command::Train(args) => run_train(&args),
        Command::Generate(args) => run_generate(&args),
    }
}
