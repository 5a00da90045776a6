//! Execution scheduler - determines which stage runs next

use crate::core::{PipelineRun, StageState};

/// Picks the next stage of a run
///
/// Stages are strictly sequential: stage `i + 1` is eligible only once
/// stage `i` has succeeded, and nothing is eligible after a failure.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExecutionScheduler;

impl ExecutionScheduler {
    pub fn new() -> Self {
        Self
    }

    /// Index of the stage to start next, if any
    pub fn next_stage(&self, run: &PipelineRun) -> Option<usize> {
        for (index, stage) in run.stages.iter().enumerate() {
            match stage.state {
                StageState::Succeeded { .. } => continue,
                StageState::Pending => return Some(index),
                StageState::Running { .. } | StageState::Failed { .. } => return None,
            }
        }
        None
    }
}
