//! # formfill
//!
//! Command line entry point. Parses arguments, sets up logging and runs the
//! chosen subcommand:
//!
//! ```bash
//! formfill init-config --output run.json
//! formfill fields --template 계약서.docx
//! formfill preview --config run.json --limit 3
//! formfill generate --config run.json
//! ```
//!
//! Set `RUST_LOG=debug` (or pass `--verbose`) for detailed logs.

#![warn(clippy::all, rust_2018_idioms)]
#![expect(clippy::print_stdout)] // Allow println! in main binary

mod cli;

use anyhow::Result;
use clap::Parser as _;
use formfill::logging::{self, LogOptions};

fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    logging::init(&LogOptions {
        verbose: cli.verbose,
        write_files: !cli.no_log_files,
    })?;

    if let Err(err) = cli::run_command(cli.command) {
        tracing::error!("{err:#}");
        return Err(err);
    }
    Ok(())
}
