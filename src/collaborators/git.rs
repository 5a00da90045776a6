//! Git CLI source provider

use crate::collaborators::{
    process::{run_checked, run_text},
    CollaboratorError, SourceProvider, SourceSnapshot,
};
use crate::core::config::RepositoryConfig;
use async_trait::async_trait;
use tracing::info;

/// Pulls the head of a branch with a shallow clone and archives the tree
#[derive(Debug, Clone)]
pub struct GitSourceProvider {
    git_path: String,
    timeout_secs: u64,
}

impl GitSourceProvider {
    pub fn new(git_path: String, timeout_secs: u64) -> Self {
        Self {
            git_path,
            timeout_secs,
        }
    }

    pub fn git_path(&self) -> &str {
        &self.git_path
    }
}

#[async_trait]
impl SourceProvider for GitSourceProvider {
    async fn pull(&self, repository: &RepositoryConfig) -> Result<SourceSnapshot, CollaboratorError> {
        let checkout = tempfile::tempdir()?;
        let checkout_path = checkout.path().to_string_lossy().to_string();

        run_checked(
            &self.git_path,
            &[
                "clone",
                "--quiet",
                "--depth",
                "1",
                "--branch",
                &repository.branch,
                &repository.location,
                &checkout_path,
            ],
            None,
            self.timeout_secs,
        )
        .await?;

        let commit_id = run_text(
            &self.git_path,
            &["rev-parse", "HEAD"],
            Some(checkout.path()),
            self.timeout_secs,
        )
        .await?;
        let commit_message = run_text(
            &self.git_path,
            &["log", "-1", "--format=%s"],
            Some(checkout.path()),
            self.timeout_secs,
        )
        .await?;
        let archive = run_checked(
            &self.git_path,
            &["archive", "--format=tar", "HEAD"],
            Some(checkout.path()),
            self.timeout_secs,
        )
        .await?;

        info!(
            "Pulled {}@{} ({}): {}",
            repository.name,
            repository.branch,
            &commit_id[..commit_id.len().min(12)],
            commit_message
        );

        Ok(SourceSnapshot {
            commit_id,
            commit_message,
            archive,
        })
    }
}
