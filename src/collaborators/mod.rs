//! External collaborators the orchestrator drives through narrow interfaces

pub mod approval;
pub mod config;
pub mod deployer;
pub mod git;
pub mod inventory;
pub mod process;
pub mod sandbox;

use crate::artifact::ArtifactRef;
use crate::core::config::{BuildEnvironmentConfig, RepositoryConfig};
use crate::core::target::{Host, LabelSelector};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

pub use approval::{ApprovalHandle, ChannelApproval, TerminalApproval};
pub use config::RuntimeConfig;
pub use deployer::{CommandDeployer, DirectoryDeployer};
pub use git::GitSourceProvider;
pub use inventory::StaticInventory;
pub use sandbox::ProcessBuildSandbox;

/// Error types for collaborator operations
#[derive(Debug, Error)]
pub enum CollaboratorError {
    #[error("Failed to spawn {program}: {reason}")]
    Spawn { program: String, reason: String },

    #[error("{program} exited with code {exit_code}: {stderr}")]
    Exit {
        program: String,
        exit_code: i32,
        stderr: String,
    },

    #[error("{program} timed out after {secs} seconds")]
    Timeout { program: String, secs: u64 },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Channel closed: {0}")]
    Closed(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// A pulled revision of the source repository
#[derive(Debug, Clone)]
pub struct SourceSnapshot {
    pub commit_id: String,
    pub commit_message: String,
    /// Tar archive of the tree at `commit_id`
    pub archive: Vec<u8>,
}

/// Version-control system: pull by ref and report revision metadata
#[async_trait]
pub trait SourceProvider: Send + Sync {
    async fn pull(&self, repository: &RepositoryConfig) -> Result<SourceSnapshot, CollaboratorError>;
}

/// Input handed to the build sandbox
#[derive(Debug, Clone)]
pub struct BuildRequest<'a> {
    pub action: &'a str,
    pub environment: &'a BuildEnvironmentConfig,
    /// Tar archive of the source tree
    pub source: &'a [u8],
}

/// What the sandbox reports back
#[derive(Debug, Clone)]
pub struct BuildOutcome {
    pub exit_code: i32,
    pub log: String,
    /// Packaged build output; present when the build succeeded
    pub artifact: Option<Vec<u8>>,
}

impl BuildOutcome {
    pub fn succeeded(&self) -> bool {
        self.exit_code == 0
    }
}

/// Isolated build execution
#[async_trait]
pub trait BuildSandbox: Send + Sync {
    async fn run(&self, request: BuildRequest<'_>) -> Result<BuildOutcome, CollaboratorError>;
}

/// Tagged host inventory
#[async_trait]
pub trait HostInventory: Send + Sync {
    /// Hosts currently matching the selector
    async fn resolve(&self, selector: &LabelSelector) -> Result<Vec<Host>, CollaboratorError>;
}

/// Pushes a bundle to one host and restarts its service
#[async_trait]
pub trait HostDeployer: Send + Sync {
    async fn deploy(
        &self,
        host: &Host,
        artifact: &ArtifactRef,
        bundle: &[u8],
    ) -> Result<(), CollaboratorError>;
}

/// A review request delivered to human approvers
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApprovalRequest {
    pub run_id: Uuid,
    pub pipeline: String,
    pub stage: String,
    pub action: String,
    /// Rendered reviewer-facing summary
    pub info: String,
    /// Rendered review link
    pub link: String,
}

/// A human decision on an approval request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "decision", rename_all = "snake_case")]
pub enum ApprovalDecision {
    Approved {
        reviewer: Option<String>,
        comment: Option<String>,
    },
    Rejected {
        reviewer: Option<String>,
        comment: Option<String>,
    },
}

impl ApprovalDecision {
    pub fn approve() -> Self {
        ApprovalDecision::Approved {
            reviewer: None,
            comment: None,
        }
    }

    pub fn reject() -> Self {
        ApprovalDecision::Rejected {
            reviewer: None,
            comment: None,
        }
    }

    pub fn is_approved(&self) -> bool {
        matches!(self, ApprovalDecision::Approved { .. })
    }

    pub fn reviewer(&self) -> Option<&str> {
        match self {
            ApprovalDecision::Approved { reviewer, .. } | ApprovalDecision::Rejected { reviewer, .. } => {
                reviewer.as_deref()
            }
        }
    }
}

/// Delivers a review link and waits for the decision
#[async_trait]
pub trait ApprovalChannel: Send + Sync {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, CollaboratorError>;
}

/// The full set of collaborators a run needs
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn SourceProvider>,
    pub sandbox: Arc<dyn BuildSandbox>,
    pub inventory: Arc<dyn HostInventory>,
    pub deployer: Arc<dyn HostDeployer>,
    pub approvals: Arc<dyn ApprovalChannel>,
}
