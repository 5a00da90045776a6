//! Core domain models

pub mod config;
pub mod context;
pub mod error;
pub mod outputs;
pub mod pipeline;
pub mod policy;
pub mod stage;
pub mod state;
pub mod target;

pub use context::RunContext;
pub use error::{PipelineError, ProvisioningError, StageExecutionError, StageFailure};
pub use outputs::ProvisionedOutputs;
pub use pipeline::PipelineDefinition;
pub use stage::{Action, ActionKind, Stage, Template};
pub use state::{PipelineRun, RunStatus, StageRun, StageState};
pub use target::{Host, LabelSelector, TargetGroup};
