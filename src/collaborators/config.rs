//! Runtime settings for the local collaborators

use std::path::PathBuf;

/// Configuration for the local collaborator implementations
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    /// Path to the git executable
    pub git_path: String,

    /// Shell used to run build and deploy commands
    pub shell: String,

    /// Path to the tar executable used to pack and unpack trees
    pub tar_path: String,

    /// Timeout for any single subprocess, in seconds
    pub command_timeout_secs: u64,

    /// Shell command run once per host; when unset, bundles are copied
    /// into `deploy_root`
    pub deploy_command: Option<String>,

    /// Directory receiving bundles when no deploy command is set
    pub deploy_root: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        let data_dir = dirs::data_local_dir().unwrap_or_else(|| PathBuf::from("."));
        Self {
            git_path: "git".to_string(),
            shell: "sh".to_string(),
            tar_path: "tar".to_string(),
            command_timeout_secs: 3600,
            deploy_command: None,
            deploy_root: data_dir.join("stagegate").join("deployments"),
        }
    }
}

impl RuntimeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_git_path(mut self, git_path: String) -> Self {
        self.git_path = git_path;
        self
    }

    pub fn with_timeout(mut self, timeout_secs: u64) -> Self {
        self.command_timeout_secs = timeout_secs;
        self
    }

    pub fn with_deploy_command(mut self, command: String) -> Self {
        self.deploy_command = Some(command);
        self
    }

    pub fn with_deploy_root(mut self, root: PathBuf) -> Self {
        self.deploy_root = root;
        self
    }
}
