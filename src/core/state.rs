//! Execution state models

use crate::core::{context::RunContext, error::StageFailure, pipeline::PipelineDefinition};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Aggregate status of a pipeline run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RunStatus {
    /// No stage has started
    Pending,
    /// The current stage is running (or suspended on approval)
    Running,
    /// Every stage succeeded
    Succeeded,
    /// A stage failed; the run halted there
    Failed,
}

impl RunStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunStatus::Succeeded | RunStatus::Failed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Pending => "Pending",
            RunStatus::Running => "Running",
            RunStatus::Succeeded => "Succeeded",
            RunStatus::Failed => "Failed",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Pending" => Some(RunStatus::Pending),
            "Running" => Some(RunStatus::Running),
            "Succeeded" => Some(RunStatus::Succeeded),
            "Failed" => Some(RunStatus::Failed),
            _ => None,
        }
    }
}

/// State of a single stage execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum StageState {
    /// Waiting for earlier stages
    Pending,
    /// Currently executing
    Running { started_at: DateTime<Utc> },
    /// Finished successfully
    Succeeded {
        started_at: DateTime<Utc>,
        completed_at: DateTime<Utc>,
    },
    /// Finished with a failure; terminal for the run
    Failed {
        failure: StageFailure,
        started_at: DateTime<Utc>,
        failed_at: DateTime<Utc>,
    },
}

impl StageState {
    /// Check if stage is in a terminal state
    pub fn is_terminal(&self) -> bool {
        matches!(self, StageState::Succeeded { .. } | StageState::Failed { .. })
    }

    pub fn is_succeeded(&self) -> bool {
        matches!(self, StageState::Succeeded { .. })
    }

    fn as_status(&self) -> RunStatus {
        match self {
            StageState::Pending => RunStatus::Pending,
            StageState::Running { .. } => RunStatus::Running,
            StageState::Succeeded { .. } => RunStatus::Succeeded,
            StageState::Failed { .. } => RunStatus::Failed,
        }
    }
}

/// Per-run record of one stage
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageRun {
    pub name: String,
    pub state: StageState,
}

/// One triggered execution of a pipeline definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineRun {
    /// Unique run ID
    pub run_id: Uuid,

    /// Name of the definition this run executes
    pub pipeline_name: String,

    /// Per-stage state, in declaration order
    pub stages: Vec<StageRun>,

    /// Stage variables and produced artifacts
    pub context: RunContext,

    /// When execution started
    pub started_at: Option<DateTime<Utc>>,

    /// When execution finished
    pub completed_at: Option<DateTime<Utc>>,
}

impl PipelineRun {
    /// Create a new run with every stage pending
    pub fn new(definition: &PipelineDefinition) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            pipeline_name: definition.name.clone(),
            stages: definition
                .stages()
                .iter()
                .map(|s| StageRun {
                    name: s.name.clone(),
                    state: StageState::Pending,
                })
                .collect(),
            context: RunContext::new(),
            started_at: None,
            completed_at: None,
        }
    }

    /// Aggregate status: the state of the current stage
    ///
    /// The current stage is the first one that has not succeeded; when all
    /// have, the run has succeeded.
    pub fn status(&self) -> RunStatus {
        match self.current_stage() {
            Some(stage) => match stage.state.as_status() {
                RunStatus::Pending if self.started_at.is_some() => RunStatus::Running,
                status => status,
            },
            None => RunStatus::Succeeded,
        }
    }

    /// First stage that has not succeeded
    pub fn current_stage(&self) -> Option<&StageRun> {
        self.stages.iter().find(|s| !s.state.is_succeeded())
    }

    pub fn stage(&self, name: &str) -> Option<&StageRun> {
        self.stages.iter().find(|s| s.name == name)
    }

    pub fn stage_state(&self, name: &str) -> Option<&StageState> {
        self.stage(name).map(|s| &s.state)
    }

    /// Failure of the halting stage, if the run failed
    pub fn failure(&self) -> Option<(&str, &StageFailure)> {
        self.stages.iter().find_map(|s| match &s.state {
            StageState::Failed { failure, .. } => Some((s.name.as_str(), failure)),
            _ => None,
        })
    }

    /// Names of stages that reached `Running` at least once, in order
    pub fn started_stages(&self) -> Vec<&str> {
        self.stages
            .iter()
            .filter(|s| !matches!(s.state, StageState::Pending))
            .map(|s| s.name.as_str())
            .collect()
    }

    pub fn succeeded_count(&self) -> usize {
        self.stages.iter().filter(|s| s.state.is_succeeded()).count()
    }

    /// Calculate progress (0.0 to 1.0)
    pub fn progress(&self) -> f64 {
        if self.stages.is_empty() {
            return 0.0;
        }
        self.succeeded_count() as f64 / self.stages.len() as f64
    }

    pub(crate) fn mark_started(&mut self) {
        self.started_at = Some(Utc::now());
    }

    pub(crate) fn mark_finished(&mut self) {
        self.completed_at = Some(Utc::now());
    }

    pub(crate) fn set_stage_state(&mut self, index: usize, state: StageState) {
        if let Some(stage) = self.stages.get_mut(index) {
            stage.state = state;
        }
    }
}
