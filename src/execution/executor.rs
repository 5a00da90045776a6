//! Stage executor - runs individual actions against the collaborators

use crate::{
    artifact::{run_key, ArtifactRef, ArtifactStore},
    collaborators::{ApprovalRequest, BuildRequest, Collaborators},
    core::{
        config::{BuildEnvironmentConfig, DeployPolicy, RepositoryConfig},
        stage::{Action, ActionKind, Template},
        target::TargetGroup,
        RunContext, StageExecutionError, StageFailure,
    },
    execution::engine::{EventBus, ExecutionEvent},
};
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio::time::{timeout, Duration};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Lines of build log kept on failure
const LOG_TAIL_LINES: usize = 20;

/// Identifies where an action runs
#[derive(Debug, Clone, Copy)]
pub struct ActionScope<'a> {
    pub run_id: Uuid,
    pub pipeline: &'a str,
    pub stage: &'a str,
}

/// Executes single actions
pub struct StageExecutor {
    collaborators: Collaborators,
    store: Arc<dyn ArtifactStore>,
}

impl StageExecutor {
    pub fn new(collaborators: Collaborators, store: Arc<dyn ArtifactStore>) -> Self {
        Self {
            collaborators,
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Execute one action, recording its outputs in the run context
    pub async fn execute(
        &self,
        scope: ActionScope<'_>,
        action: &Action,
        context: &mut RunContext,
        events: &EventBus,
    ) -> Result<(), StageFailure> {
        info!("Executing action: {}/{}", scope.stage, action.name);

        let result = match &action.kind {
            ActionKind::Source { repository, output } => {
                self.pull_source(scope, repository, output, context, events).await
            }
            ActionKind::Build {
                environment,
                input,
                output,
                timeout_secs,
            } => {
                self.build(scope, &action.name, environment, input, output, *timeout_secs, context, events)
                    .await
            }
            ActionKind::Deploy {
                target_group,
                input,
                policy,
            } => {
                self.deploy(scope, &action.name, target_group, input, *policy, context, events)
                    .await
            }
            ActionKind::Approval {
                info,
                link,
                timeout_secs,
            } => {
                return self
                    .approve(scope, &action.name, info, link, *timeout_secs, context, events)
                    .await;
            }
        };

        result.map_err(|e| {
            error!("Action {}/{} failed: {}", scope.stage, action.name, e);
            StageFailure::from(e)
        })
    }

    async fn pull_source(
        &self,
        scope: ActionScope<'_>,
        repository: &RepositoryConfig,
        output: &str,
        context: &mut RunContext,
        events: &EventBus,
    ) -> Result<(), StageExecutionError> {
        let snapshot = self
            .collaborators
            .source
            .pull(repository)
            .await
            .map_err(|e| StageExecutionError::SourcePull {
                repository: repository.name.clone(),
                reason: e.to_string(),
            })?;

        let artifact = self.store_output(scope, output, snapshot.archive, context, events).await?;
        debug!("Source archive stored as {}", artifact.short());

        context.set_variable(scope.stage, "commit_id", snapshot.commit_id);
        context.set_variable(scope.stage, "commit_message", snapshot.commit_message);
        context.set_variable(scope.stage, "branch", repository.branch.clone());
        context.set_variable(scope.stage, "repository", repository.name.clone());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn build(
        &self,
        scope: ActionScope<'_>,
        action: &str,
        environment: &BuildEnvironmentConfig,
        input: &str,
        output: &str,
        timeout_secs: Option<u64>,
        context: &mut RunContext,
        events: &EventBus,
    ) -> Result<(), StageExecutionError> {
        let (source_ref, source) = self.consume_input(action, input, context).await?;
        debug!("Building from {}", source_ref.short());

        let request = BuildRequest {
            action,
            environment,
            source: &source,
        };
        let run = self.collaborators.sandbox.run(request);
        let outcome = match timeout_secs {
            Some(secs) => timeout(Duration::from_secs(secs), run).await.map_err(|_| {
                StageExecutionError::Sandbox(format!("build timed out after {} seconds", secs))
            })?,
            None => run.await,
        }
        .map_err(|e| StageExecutionError::Sandbox(e.to_string()))?;

        if !outcome.succeeded() {
            return Err(StageExecutionError::BuildFailed {
                exit_code: outcome.exit_code,
                log_tail: log_tail(&outcome.log, LOG_TAIL_LINES),
            });
        }

        let bytes = outcome.artifact.ok_or_else(|| {
            StageExecutionError::Sandbox("build succeeded without producing an artifact".to_string())
        })?;
        let artifact = self.store_output(scope, output, bytes, context, events).await?;

        context.set_variable(scope.stage, "artifact_digest", artifact.digest.clone());
        context.set_variable(scope.stage, "artifact_version", artifact.version.to_string());
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn deploy(
        &self,
        scope: ActionScope<'_>,
        action: &str,
        group: &TargetGroup,
        input: &str,
        policy: DeployPolicy,
        context: &mut RunContext,
        events: &EventBus,
    ) -> Result<(), StageExecutionError> {
        let (artifact, bundle) = self.consume_input(action, input, context).await?;

        // Membership is resolved now, not when the pipeline was defined
        let hosts = self
            .collaborators
            .inventory
            .resolve(&group.selector)
            .await
            .map_err(|e| StageExecutionError::Inventory(e.to_string()))?;
        if hosts.is_empty() {
            return Err(StageExecutionError::NoHosts(group.name.clone()));
        }

        let total = hosts.len();
        info!(
            "Deploying {} to {} host(s) in '{}' ({:?})",
            artifact.short(),
            total,
            group.name,
            policy
        );

        let bundle = Arc::new(bundle);
        let mut deployments = JoinSet::new();
        match policy {
            DeployPolicy::AllAtOnce => {
                for host in hosts {
                    let deployer = self.collaborators.deployer.clone();
                    let artifact = artifact.clone();
                    let bundle = bundle.clone();
                    deployments.spawn(async move {
                        let result = deployer.deploy(&host, &artifact, &bundle).await;
                        (host, result)
                    });
                }
            }
        }

        let mut deployed = Vec::new();
        let mut failed = Vec::new();
        while let Some(joined) = deployments.join_next().await {
            match joined {
                Ok((host, Ok(()))) => {
                    events.emit(ExecutionEvent::HostDeployed {
                        run_id: scope.run_id,
                        stage: scope.stage.to_string(),
                        host: host.address.clone(),
                    });
                    deployed.push(host.address);
                }
                Ok((host, Err(e))) => {
                    warn!("Deployment to {} failed: {}", host.address, e);
                    events.emit(ExecutionEvent::HostFailed {
                        run_id: scope.run_id,
                        stage: scope.stage.to_string(),
                        host: host.address.clone(),
                        error: e.to_string(),
                    });
                    failed.push(host.address);
                }
                Err(e) => {
                    warn!("Deployment task aborted: {}", e);
                    failed.push(format!("<aborted: {}>", e));
                }
            }
        }

        if !failed.is_empty() {
            failed.sort();
            return Err(StageExecutionError::DeployFailed {
                group: group.name.clone(),
                failed_hosts: failed,
                total,
            });
        }

        deployed.sort();
        context.set_variable(scope.stage, "deployed_hosts", deployed.join(","));
        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn approve(
        &self,
        scope: ActionScope<'_>,
        action: &str,
        info: &Template,
        link: &Template,
        timeout_secs: Option<u64>,
        context: &RunContext,
        events: &EventBus,
    ) -> Result<(), StageFailure> {
        let request = ApprovalRequest {
            run_id: scope.run_id,
            pipeline: scope.pipeline.to_string(),
            stage: scope.stage.to_string(),
            action: action.to_string(),
            info: info.render(&context.variables),
            link: link.render(&context.variables),
        };
        events.emit(ExecutionEvent::ApprovalRequested {
            run_id: scope.run_id,
            stage: scope.stage.to_string(),
            info: request.info.clone(),
            link: request.link.clone(),
        });

        let pending = self.collaborators.approvals.request(&request);
        let decision = match timeout_secs {
            Some(secs) => match timeout(Duration::from_secs(secs), pending).await {
                Ok(decision) => decision,
                Err(_) => {
                    warn!("Approval for {} timed out after {}s", scope.stage, secs);
                    events.emit(ExecutionEvent::ApprovalResolved {
                        run_id: scope.run_id,
                        stage: scope.stage.to_string(),
                        approved: false,
                        reviewer: None,
                    });
                    return Err(StageFailure::ApprovalTimedOut { timeout_secs: secs });
                }
            },
            None => pending.await,
        }
        .map_err(|e| StageFailure::from(StageExecutionError::ApprovalChannel(e.to_string())))?;

        let reviewer = decision.reviewer().map(str::to_string);
        events.emit(ExecutionEvent::ApprovalResolved {
            run_id: scope.run_id,
            stage: scope.stage.to_string(),
            approved: decision.is_approved(),
            reviewer: reviewer.clone(),
        });

        if decision.is_approved() {
            info!("Stage {} approved", scope.stage);
            Ok(())
        } else {
            info!("Stage {} rejected", scope.stage);
            Err(StageFailure::ApprovalRejected { reviewer })
        }
    }

    /// Load an artifact produced earlier in this run, verifying its digest
    async fn consume_input(
        &self,
        action: &str,
        input: &str,
        context: &mut RunContext,
    ) -> Result<(ArtifactRef, Vec<u8>), StageExecutionError> {
        let artifact = context
            .artifact(input)
            .cloned()
            .ok_or_else(|| StageExecutionError::MissingInput(input.to_string()))?;
        let bytes = self.store.fetch(&artifact).await?;
        context.record_consumed(action, artifact.clone());
        Ok((artifact, bytes))
    }

    async fn store_output(
        &self,
        scope: ActionScope<'_>,
        output: &str,
        bytes: Vec<u8>,
        context: &mut RunContext,
        events: &EventBus,
    ) -> Result<ArtifactRef, StageExecutionError> {
        let key = run_key(scope.pipeline, scope.run_id, output);
        let artifact = self.store.put(&key, bytes).await?;
        context.record_artifact(output, artifact.clone());
        events.emit(ExecutionEvent::ArtifactProduced {
            run_id: scope.run_id,
            stage: scope.stage.to_string(),
            artifact: artifact.clone(),
        });
        Ok(artifact)
    }
}

/// Last `lines` lines of a log
fn log_tail(log: &str, lines: usize) -> String {
    let all: Vec<&str> = log.lines().collect();
    let start = all.len().saturating_sub(lines);
    all[start..].join("\n")
}
