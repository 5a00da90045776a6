//! CLI command definitions

use clap::Args;
use std::path::PathBuf;

/// Trigger a pipeline run
#[derive(Debug, Args, Clone)]
pub struct RunCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Keep artifacts in memory instead of the on-disk store
    #[arg(long)]
    pub ephemeral: bool,

    /// Don't save the run to history
    #[arg(long)]
    pub no_history: bool,

    /// Git executable used for source pulls
    #[arg(long, default_value = "git")]
    pub git_path: String,

    /// Shell command run once per host instead of the directory deployer
    #[arg(long)]
    pub deploy_command: Option<String>,

    /// Root directory for the directory deployer
    #[arg(long)]
    pub deploy_root: Option<PathBuf>,

    /// Timeout in seconds for each external command
    #[arg(long)]
    pub timeout: Option<u64>,
}

/// Validate a pipeline configuration
#[derive(Debug, Args, Clone)]
pub struct ValidateCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show what a provisioned pipeline exposes
#[derive(Debug, Args, Clone)]
pub struct OutputsCommand {
    /// Path to pipeline YAML file
    #[arg(short, long)]
    pub file: PathBuf,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Show run history
#[derive(Debug, Args, Clone)]
pub struct HistoryCommand {
    /// Pipeline name to filter by
    #[arg(short, long)]
    pub pipeline: Option<String>,

    /// Number of recent runs to show
    #[arg(short, long, default_value_t = 10)]
    pub limit: usize,

    /// Show full details
    #[arg(long)]
    pub details: bool,

    /// Output in JSON format
    #[arg(long)]
    pub json: bool,

    /// Show a specific run
    #[arg(long)]
    pub run_id: Option<String>,
}
