//! Main execution engine - orchestrates a pipeline run stage by stage

use crate::{
    artifact::{ArtifactRef, ArtifactStore},
    collaborators::Collaborators,
    core::{PipelineDefinition, PipelineError, PipelineRun, RunStatus, StageFailure, StageState},
    execution::{
        executor::{ActionScope, StageExecutor},
        scheduler::ExecutionScheduler,
    },
};
use chrono::Utc;
use std::sync::Arc;
use tracing::{error, info};
use uuid::Uuid;

/// Events that can occur during a pipeline run
#[derive(Debug, Clone)]
pub enum ExecutionEvent {
    RunStarted {
        run_id: Uuid,
        pipeline_name: String,
    },
    StageStarted {
        run_id: Uuid,
        stage: String,
    },
    ActionStarted {
        run_id: Uuid,
        stage: String,
        action: String,
        kind: &'static str,
    },
    ArtifactProduced {
        run_id: Uuid,
        stage: String,
        artifact: ArtifactRef,
    },
    HostDeployed {
        run_id: Uuid,
        stage: String,
        host: String,
    },
    HostFailed {
        run_id: Uuid,
        stage: String,
        host: String,
        error: String,
    },
    ApprovalRequested {
        run_id: Uuid,
        stage: String,
        info: String,
        link: String,
    },
    ApprovalResolved {
        run_id: Uuid,
        stage: String,
        approved: bool,
        reviewer: Option<String>,
    },
    StageSucceeded {
        run_id: Uuid,
        stage: String,
    },
    StageFailed {
        run_id: Uuid,
        stage: String,
        failure: StageFailure,
    },
    RunFinished {
        run_id: Uuid,
        status: RunStatus,
    },
}

/// Type for event handlers
pub type EventHandler = Arc<dyn Fn(ExecutionEvent) + Send + Sync>;

/// Fans events out to every registered handler
#[derive(Clone, Default)]
pub struct EventBus {
    handlers: Vec<EventHandler>,
}

impl EventBus {
    pub fn emit(&self, event: ExecutionEvent) {
        for handler in &self.handlers {
            handler(event.clone());
        }
    }
}

/// Main pipeline execution engine
///
/// One engine serves any number of concurrent runs of the same definition;
/// all per-run state lives in the [`PipelineRun`] passed to `execute`.
pub struct ExecutionEngine {
    definition: Arc<PipelineDefinition>,
    scheduler: ExecutionScheduler,
    executor: StageExecutor,
    events: EventBus,
}

impl ExecutionEngine {
    pub fn new(
        definition: Arc<PipelineDefinition>,
        collaborators: Collaborators,
        store: Arc<dyn ArtifactStore>,
    ) -> Self {
        Self {
            definition,
            scheduler: ExecutionScheduler::new(),
            executor: StageExecutor::new(collaborators, store),
            events: EventBus::default(),
        }
    }

    /// Add an event handler
    pub fn with_event_handler<F>(mut self, handler: F) -> Self
    where
        F: Fn(ExecutionEvent) + Send + Sync + 'static,
    {
        self.events.handlers.push(Arc::new(handler));
        self
    }

    pub fn definition(&self) -> &PipelineDefinition {
        &self.definition
    }

    /// Start a fresh run of the definition and drive it to completion
    pub async fn trigger(&self) -> Result<PipelineRun, PipelineError> {
        let mut run = PipelineRun::new(&self.definition);
        self.execute(&mut run).await?;
        Ok(run)
    }

    /// Drive a run until it succeeds, fails, or has no stage left
    pub async fn execute(&self, run: &mut PipelineRun) -> Result<RunStatus, PipelineError> {
        if run.pipeline_name != self.definition.name
            || run.stages.len() != self.definition.stages().len()
        {
            return Err(PipelineError::DefinitionMismatch {
                run: run.pipeline_name.clone(),
                definition: self.definition.name.clone(),
            });
        }
        if run.status().is_terminal() {
            return Err(PipelineError::RunFinished(run.run_id));
        }
        // The scheduler never re-dispatches a Running stage
        if let Some(stage) = run.current_stage() {
            if matches!(stage.state, StageState::Running { .. }) {
                return Err(PipelineError::StageInProgress {
                    run_id: run.run_id,
                    stage: stage.name.clone(),
                });
            }
        }

        let run_id = run.run_id;
        info!("Starting pipeline run: {} ({})", self.definition.name, run_id);
        if run.started_at.is_none() {
            run.mark_started();
        }
        self.events.emit(ExecutionEvent::RunStarted {
            run_id,
            pipeline_name: self.definition.name.clone(),
        });

        while let Some(index) = self.scheduler.next_stage(run) {
            self.execute_stage(run, index).await;
        }

        run.mark_finished();
        let status = run.status();
        info!(
            "Pipeline run finished: {} ({}) - {}",
            self.definition.name,
            run_id,
            status.as_str()
        );
        self.events.emit(ExecutionEvent::RunFinished { run_id, status });

        Ok(status)
    }

    /// Run every action of one stage in order; the first failure fails the stage
    async fn execute_stage(&self, run: &mut PipelineRun, index: usize) {
        let stage = &self.definition.stages()[index];
        let run_id = run.run_id;
        let started_at = Utc::now();

        run.set_stage_state(index, StageState::Running { started_at });
        self.events.emit(ExecutionEvent::StageStarted {
            run_id,
            stage: stage.name.clone(),
        });

        let scope = ActionScope {
            run_id,
            pipeline: &self.definition.name,
            stage: &stage.name,
        };

        let mut outcome = Ok(());
        for action in &stage.actions {
            self.events.emit(ExecutionEvent::ActionStarted {
                run_id,
                stage: stage.name.clone(),
                action: action.name.clone(),
                kind: action.kind_name(),
            });

            outcome = self
                .executor
                .execute(scope, action, &mut run.context, &self.events)
                .await;
            if outcome.is_err() {
                break;
            }
        }

        match outcome {
            Ok(()) => {
                info!("Stage {} succeeded", stage.name);
                run.set_stage_state(
                    index,
                    StageState::Succeeded {
                        started_at,
                        completed_at: Utc::now(),
                    },
                );
                self.events.emit(ExecutionEvent::StageSucceeded {
                    run_id,
                    stage: stage.name.clone(),
                });
            }
            Err(failure) => {
                error!("Stage {} failed: {}", stage.name, failure);
                run.set_stage_state(
                    index,
                    StageState::Failed {
                        failure: failure.clone(),
                        started_at,
                        failed_at: Utc::now(),
                    },
                );
                self.events.emit(ExecutionEvent::StageFailed {
                    run_id,
                    stage: stage.name.clone(),
                    failure,
                });
            }
        }
    }
}
