//! Error taxonomy for definition-time and run-time failures

use crate::artifact::ArtifactError;
use crate::core::policy::Capability;
use thiserror::Error;

/// A malformed pipeline definition, rejected before any run starts
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ProvisioningError {
    #[error("Pipeline must declare at least one stage")]
    NoStages,

    #[error("Stage '{0}' declares no actions")]
    EmptyStage(String),

    #[error("Duplicate {kind} name: {name}")]
    DuplicateName { kind: &'static str, name: String },

    #[error("Action '{action}' references undefined {kind} '{name}'")]
    UndefinedReference {
        action: String,
        kind: &'static str,
        name: String,
    },

    #[error("Artifact '{artifact}' is produced by both '{first}' and '{second}'")]
    MultipleProducers {
        artifact: String,
        first: String,
        second: String,
    },

    #[error("Action '{action}' consumes artifact '{artifact}' before any earlier stage produces it")]
    ConsumedBeforeProduced { action: String, artifact: String },

    #[error("Target groups '{first}' and '{second}' select the same hosts ({app_label}/{env_label})")]
    OverlappingTargetGroups {
        first: String,
        second: String,
        app_label: String,
        env_label: String,
    },

    #[error("Principal '{principal}' has no access policy binding")]
    UnboundPrincipal { principal: String },

    #[error("Principal '{principal}' is missing capability '{capability}'")]
    MissingCapability {
        principal: String,
        capability: Capability,
    },

    #[error("Principal '{principal}' is granted unused capability '{capability}'")]
    ExcessCapability {
        principal: String,
        capability: Capability,
    },

    #[error("Binding for '{principal}' grants artifact access outside artifact store '{store}'")]
    ScopeMismatch { principal: String, store: String },

    #[error("Template in action '{action}' references unknown variable '{variable}'")]
    UnknownTemplateVariable { action: String, variable: String },

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// A technical failure while executing a stage action
#[derive(Debug, Error)]
pub enum StageExecutionError {
    #[error("Source pull failed for repository '{repository}': {reason}")]
    SourcePull { repository: String, reason: String },

    #[error("Build exited with status {exit_code}")]
    BuildFailed { exit_code: i32, log_tail: String },

    #[error("Build sandbox error: {0}")]
    Sandbox(String),

    #[error("Target group '{0}' resolved to no hosts")]
    NoHosts(String),

    #[error("Deployment to '{group}' failed on {} of {total} host(s): {}", failed_hosts.len(), failed_hosts.join(", "))]
    DeployFailed {
        group: String,
        failed_hosts: Vec<String>,
        total: usize,
    },

    #[error("Host inventory error: {0}")]
    Inventory(String),

    #[error("Approval channel error: {0}")]
    ApprovalChannel(String),

    #[error("Artifact '{0}' was not produced in this run")]
    MissingInput(String),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),
}

/// Why a stage ended in `Failed`
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageFailure {
    /// A technical error (source, build, deploy, artifact store)
    Execution { message: String },
    /// A human explicitly rejected promotion
    ApprovalRejected { reviewer: Option<String> },
    /// No decision arrived within the configured window
    ApprovalTimedOut { timeout_secs: u64 },
}

impl std::fmt::Display for StageFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StageFailure::Execution { message } => write!(f, "{}", message),
            StageFailure::ApprovalRejected { reviewer: Some(who) } => {
                write!(f, "Approval rejected by {}", who)
            }
            StageFailure::ApprovalRejected { reviewer: None } => write!(f, "Approval rejected"),
            StageFailure::ApprovalTimedOut { timeout_secs } => {
                write!(f, "Approval timed out after {} seconds", timeout_secs)
            }
        }
    }
}

impl From<StageExecutionError> for StageFailure {
    fn from(err: StageExecutionError) -> Self {
        StageFailure::Execution {
            message: err.to_string(),
        }
    }
}

/// Errors surfaced by the orchestrator itself (not by a stage)
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Run {0} has already finished")]
    RunFinished(uuid::Uuid),

    #[error("Run belongs to pipeline '{run}', not '{definition}'")]
    DefinitionMismatch { run: String, definition: String },

    #[error("Run {run_id} has stage '{stage}' still marked running")]
    StageInProgress { run_id: uuid::Uuid, stage: String },
}
