//! Command-line interface

pub mod commands;
pub mod output;
pub mod terminal_output;

use clap::{Parser, Subcommand};
use commands::{HistoryCommand, OutputsCommand, RunCommand, ValidateCommand};
use std::ffi::OsString;

/// Staged deployment pipeline with a manual promotion gate
#[derive(Debug, Parser, Clone)]
#[command(name = "stagegate")]
#[command(version = "0.1.0")]
#[command(about = "Source, build, deploy to DEV, approve, deploy to PRD", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available commands
#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Trigger a pipeline run
    Run(RunCommand),

    /// Validate a pipeline configuration
    Validate(ValidateCommand),

    /// Show host addresses, artifact store and principals
    Outputs(OutputsCommand),

    /// Show run history
    History(HistoryCommand),
}

impl Cli {
    /// Parse CLI arguments from environment
    pub fn from_args() -> Self {
        Self::parse()
    }

    /// Parse CLI arguments from a slice
    pub fn try_parse_from<I, T>(itr: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        <Self as Parser>::try_parse_from(itr)
    }
}
