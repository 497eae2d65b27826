//! # simgate-cli::args
//!
//! Defines the command-line argument structure using `clap`. The bulk of
//! the configuration travels as free-form `key=value` properties, merged
//! over an optional TOML property file.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Configuration properties in key=value form, e.g. app.stopTime=12.5
    #[arg(value_name = "KEY=VALUE")]
    pub properties: Vec<String>,

    /// Optional TOML property file applied before the command line.
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[arg(long, default_value = "human")]
    pub log: LogFormat,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Human,
    Json,
}
