//! # simgate-cli
//!
//! The main entry point for the simgate binary. It parses the property
//! arguments, initializes tracing, runs the dispatcher, and maps the
//! error taxonomy onto the documented exit codes.

#![forbid(unsafe_code)]

use crate::args::Cli;
use clap::Parser;
use tracing::error;

mod args;
mod error;
mod logging;
mod run;

fn main() {
    let args = Cli::parse();
    logging::init(args.log);

    if let Err(err) = run::exec(args) {
        error!("{err}");
        std::process::exit(err.exit_code());
    }
}
