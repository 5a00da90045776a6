//! stagegate - a staged deployment pipeline with a manual promotion gate

pub mod artifact;
pub mod cli;
pub mod collaborators;
pub mod core;
pub mod execution;
pub mod persistence;

// Re-export commonly used types
pub use artifact::{ArtifactError, ArtifactRef, ArtifactStore, FsArtifactStore, InMemoryArtifactStore};
pub use collaborators::{
    ApprovalChannel, ApprovalDecision, ApprovalHandle, ApprovalRequest, BuildSandbox, ChannelApproval,
    CollaboratorError, Collaborators, HostDeployer, HostInventory, SourceProvider,
};
pub use self::core::{
    PipelineDefinition, PipelineError, PipelineRun, ProvisionedOutputs, ProvisioningError, RunStatus,
    StageFailure, StageState,
};
pub use execution::{ExecutionEngine, ExecutionEvent};
