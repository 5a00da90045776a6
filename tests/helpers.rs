//! Test utility functions for stagegate

#![allow(dead_code)]

use async_trait::async_trait;
use stagegate::artifact::{ArtifactRef, InMemoryArtifactStore};
use stagegate::collaborators::{
    ApprovalChannel, ApprovalDecision, ApprovalRequest, BuildOutcome, BuildRequest, BuildSandbox,
    CollaboratorError, Collaborators, HostDeployer, SourceProvider, SourceSnapshot, StaticInventory,
};
use stagegate::core::config::{PipelineConfig, RepositoryConfig};
use stagegate::core::{Host, LabelSelector, PipelineRun, StageState};
use stagegate::execution::{ExecutionEngine, ExecutionEvent};
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Five-stage pipeline: Source, Build, Deploy-DEV, Approve, Deploy-PRD
pub const DEMO_PIPELINE: &str = r#"
name: "DemoAppPipeline"
artifact_store:
  name: "demo-artifacts"
principals:
  - name: "pipeline-role"
    capabilities: [source_pull, artifact_write]
    scope: ["demo-artifacts"]
  - name: "build-role"
    capabilities: [artifact_read, artifact_write, log_emit]
  - name: "deploy-role"
    capabilities: [artifact_read, deploy_orchestrate]
  - name: "instance-role"
    capabilities: [artifact_read, log_emit]
repositories:
  - name: "demo-repo"
    location: "https://git.example.com/demo.git"
target_groups:
  - name: "dev"
    app_label: "DemoApp"
    env_label: "DEV"
    host_principal: "instance-role"
  - name: "prd"
    app_label: "DemoApp"
    env_label: "PRD"
    host_principal: "instance-role"
stages:
  - name: "Source"
    actions:
      - kind: source
        name: "pull"
        repository: "demo-repo"
        output: "source_output"
        principal: "pipeline-role"
  - name: "Build"
    actions:
      - kind: build
        name: "compile"
        environment:
          image: "standard:7.0"
          commands: ["npm ci", "npm run build"]
          artifact_path: "dist"
        input: "source_output"
        output: "build_output"
        principal: "build-role"
  - name: "Deploy-DEV"
    actions:
      - kind: deploy
        name: "deploy-dev"
        target_group: "dev"
        input: "build_output"
        principal: "deploy-role"
  - name: "Approve"
    actions:
      - kind: approval
        name: "manual-approval"
        info: "Promote '{{ Source.commit_message }}' to production?"
        link: "https://git.example.com/demo/commit/{{ Source.commit_id }}"
        timeout_secs: 30
  - name: "Deploy-PRD"
    actions:
      - kind: deploy
        name: "deploy-prd"
        target_group: "prd"
        input: "build_output"
        principal: "deploy-role"
"#;

pub const STAGE_ORDER: [&str; 5] = ["Source", "Build", "Deploy-DEV", "Approve", "Deploy-PRD"];

pub fn dev() -> LabelSelector {
    LabelSelector::new("DemoApp", "DEV")
}

pub fn prd() -> LabelSelector {
    LabelSelector::new("DemoApp", "PRD")
}

/// One DEV host and one PRD host
pub fn default_hosts() -> Vec<Host> {
    vec![
        Host::new("dev-1", "10.0.0.1").labelled(&dev()),
        Host::new("prd-1", "10.0.1.1").labelled(&prd()),
    ]
}

/// Source provider returning scripted commits, one per pull
pub struct MockSource {
    commits: Vec<(String, String)>,
    pulls: AtomicUsize,
}

impl MockSource {
    pub fn new(commits: Vec<(&str, &str)>) -> Self {
        Self {
            commits: commits
                .into_iter()
                .map(|(id, msg)| (id.to_string(), msg.to_string()))
                .collect(),
            pulls: AtomicUsize::new(0),
        }
    }

    pub fn pulls(&self) -> usize {
        self.pulls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SourceProvider for MockSource {
    async fn pull(&self, repository: &RepositoryConfig) -> Result<SourceSnapshot, CollaboratorError> {
        let idx = self.pulls.fetch_add(1, Ordering::SeqCst);
        let (commit_id, commit_message) = self
            .commits
            .get(idx % self.commits.len().max(1))
            .cloned()
            .ok_or_else(|| CollaboratorError::Internal("MockSource: no commits scripted".to_string()))?;

        Ok(SourceSnapshot {
            archive: format!("{}@{}", repository.name, commit_id).into_bytes(),
            commit_id,
            commit_message,
        })
    }
}

/// Build sandbox that "builds" by suffixing the source bytes
pub struct MockSandbox {
    exit_code: i32,
    delay: Option<Duration>,
    builds: AtomicUsize,
}

impl MockSandbox {
    pub fn new(exit_code: i32) -> Self {
        Self {
            exit_code,
            delay: None,
            builds: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl BuildSandbox for MockSandbox {
    async fn run(&self, request: BuildRequest<'_>) -> Result<BuildOutcome, CollaboratorError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let log = request
            .environment
            .commands
            .iter()
            .map(|c| format!("$ {}", c))
            .collect::<Vec<_>>()
            .join("\n");

        if self.exit_code != 0 {
            return Ok(BuildOutcome {
                exit_code: self.exit_code,
                log: format!("{}\nnpm ERR! build failed", log),
                artifact: None,
            });
        }

        Ok(BuildOutcome {
            exit_code: 0,
            log,
            artifact: Some([request.source, &b"|built"[..]].concat()),
        })
    }
}

/// A completed host deployment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deployment {
    pub host_id: String,
    pub address: String,
    pub digest: String,
}

/// Host deployer that records deployments and fails on chosen hosts
pub struct MockDeployer {
    failing: HashSet<String>,
    deployments: Mutex<Vec<Deployment>>,
    /// Hosts whose deploys wait for each other before completing
    rendezvous: Option<(HashSet<String>, Arc<tokio::sync::Barrier>)>,
}

impl MockDeployer {
    pub fn new(failing_hosts: &[&str]) -> Self {
        Self {
            failing: failing_hosts.iter().map(|h| h.to_string()).collect(),
            deployments: Mutex::new(Vec::new()),
            rendezvous: None,
        }
    }

    /// Hold each listed host's deploy until all of them are in flight
    pub fn with_rendezvous(mut self, hosts: &[&str]) -> Self {
        if !hosts.is_empty() {
            self.rendezvous = Some((
                hosts.iter().map(|h| h.to_string()).collect(),
                Arc::new(tokio::sync::Barrier::new(hosts.len())),
            ));
        }
        self
    }

    pub fn deployments(&self) -> Vec<Deployment> {
        self.deployments.lock().unwrap().clone()
    }

    pub fn deployed_to(&self, host_id: &str) -> Vec<Deployment> {
        self.deployments()
            .into_iter()
            .filter(|d| d.host_id == host_id)
            .collect()
    }
}

#[async_trait]
impl HostDeployer for MockDeployer {
    async fn deploy(
        &self,
        host: &Host,
        artifact: &ArtifactRef,
        bundle: &[u8],
    ) -> Result<(), CollaboratorError> {
        assert_eq!(bundle.len() as u64, artifact.size_bytes);
        if let Some((hosts, barrier)) = &self.rendezvous {
            if hosts.contains(&host.id) {
                barrier.wait().await;
            }
        }
        if self.failing.contains(&host.id) {
            return Err(CollaboratorError::Exit {
                program: "deploy".to_string(),
                exit_code: 1,
                stderr: format!("service on {} failed to restart", host.address),
            });
        }
        self.deployments.lock().unwrap().push(Deployment {
            host_id: host.id.clone(),
            address: host.address.clone(),
            digest: artifact.digest.clone(),
        });
        Ok(())
    }
}

/// What the scripted approver answers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApprovalMode {
    Approve,
    Reject,
    /// Never answers
    Silent,
}

/// Approval channel answering every request the same way
pub struct ScriptedApproval {
    mode: ApprovalMode,
    requests: Mutex<Vec<ApprovalRequest>>,
}

impl ScriptedApproval {
    pub fn new(mode: ApprovalMode) -> Self {
        Self {
            mode,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<ApprovalRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ApprovalChannel for ScriptedApproval {
    async fn request(&self, request: &ApprovalRequest) -> Result<ApprovalDecision, CollaboratorError> {
        self.requests.lock().unwrap().push(request.clone());
        match self.mode {
            ApprovalMode::Approve => Ok(ApprovalDecision::Approved {
                reviewer: Some("release-manager".to_string()),
                comment: None,
            }),
            ApprovalMode::Reject => Ok(ApprovalDecision::Rejected {
                reviewer: Some("release-manager".to_string()),
                comment: Some("not today".to_string()),
            }),
            ApprovalMode::Silent => std::future::pending().await,
        }
    }
}

/// Knobs for a test harness
pub struct Setup {
    pub yaml: String,
    pub hosts: Vec<Host>,
    pub commits: Vec<(&'static str, &'static str)>,
    pub build_exit_code: i32,
    pub build_delay: Option<Duration>,
    pub failing_hosts: Vec<&'static str>,
    /// Hosts that must all be mid-deploy at once for any to finish
    pub rendezvous_hosts: Vec<&'static str>,
    pub approval: ApprovalMode,
    /// Replaces the scripted approver
    pub approvals: Option<Arc<dyn ApprovalChannel>>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            yaml: DEMO_PIPELINE.to_string(),
            hosts: default_hosts(),
            commits: vec![("abc123", "fix login bug")],
            build_exit_code: 0,
            build_delay: None,
            failing_hosts: Vec::new(),
            rendezvous_hosts: Vec::new(),
            approval: ApprovalMode::Approve,
            approvals: None,
        }
    }
}

/// An engine wired to mock collaborators, with handles for assertions
pub struct Harness {
    pub engine: Arc<ExecutionEngine>,
    pub source: Arc<MockSource>,
    pub sandbox: Arc<MockSandbox>,
    pub inventory: Arc<StaticInventory>,
    pub deployer: Arc<MockDeployer>,
    pub approver: Arc<ScriptedApproval>,
    pub store: Arc<InMemoryArtifactStore>,
    events: Arc<Mutex<Vec<ExecutionEvent>>>,
}

impl Harness {
    pub fn new(setup: Setup) -> Self {
        let definition = PipelineConfig::from_yaml(&setup.yaml)
            .expect("test pipeline should parse")
            .to_definition()
            .expect("test pipeline should validate");

        let source = Arc::new(MockSource::new(setup.commits));
        let mut sandbox = MockSandbox::new(setup.build_exit_code);
        if let Some(delay) = setup.build_delay {
            sandbox = sandbox.with_delay(delay);
        }
        let sandbox = Arc::new(sandbox);
        let inventory = Arc::new(StaticInventory::new(setup.hosts));
        let deployer = Arc::new(
            MockDeployer::new(&setup.failing_hosts).with_rendezvous(&setup.rendezvous_hosts),
        );
        let approver = Arc::new(ScriptedApproval::new(setup.approval));
        let approvals: Arc<dyn ApprovalChannel> = match setup.approvals {
            Some(channel) => channel,
            None => approver.clone(),
        };
        let store = Arc::new(InMemoryArtifactStore::new("demo-artifacts"));

        let events = Arc::new(Mutex::new(Vec::new()));
        let recorder = events.clone();
        let engine = ExecutionEngine::new(
            Arc::new(definition),
            Collaborators {
                source: source.clone(),
                sandbox: sandbox.clone(),
                inventory: inventory.clone(),
                deployer: deployer.clone(),
                approvals,
            },
            store.clone(),
        )
        .with_event_handler(move |event| recorder.lock().unwrap().push(event));

        Self {
            engine: Arc::new(engine),
            source,
            sandbox,
            inventory,
            deployer,
            approver,
            store,
            events,
        }
    }

    pub fn demo() -> Self {
        Self::new(Setup::default())
    }

    /// Trigger a run and drive it to completion
    pub async fn run(&self) -> PipelineRun {
        self.engine.trigger().await.expect("run should execute")
    }

    pub fn events(&self) -> Vec<ExecutionEvent> {
        self.events.lock().unwrap().clone()
    }

    /// Stages started by a run, in the order they started
    pub fn started_stages(&self, run_id: uuid::Uuid) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                ExecutionEvent::StageStarted { run_id: id, stage } if id == run_id => Some(stage),
                _ => None,
            })
            .collect()
    }
}

/// Assert a stage succeeded
pub fn assert_stage_succeeded(run: &PipelineRun, stage: &str) {
    let state = run
        .stage_state(stage)
        .unwrap_or_else(|| panic!("Stage '{}' not found in run", stage));
    assert!(
        state.is_succeeded(),
        "Stage '{}' should have succeeded, but was: {:?}",
        stage,
        state
    );
}

/// Assert a stage failed with a message containing `expected`
pub fn assert_stage_failed(run: &PipelineRun, stage: &str, expected: &str) {
    let state = run
        .stage_state(stage)
        .unwrap_or_else(|| panic!("Stage '{}' not found in run", stage));
    match state {
        StageState::Failed { failure, .. } => assert!(
            failure.to_string().contains(expected),
            "Stage '{}' failure:\n{}\n\ndoes not contain:\n{}",
            stage,
            failure,
            expected
        ),
        other => panic!("Stage '{}' should have failed, but was: {:?}", stage, other),
    }
}

/// Assert a stage never left `Pending`
pub fn assert_stage_never_ran(run: &PipelineRun, stage: &str) {
    assert_eq!(
        run.stage_state(stage),
        Some(&StageState::Pending),
        "Stage '{}' should never have started",
        stage
    );
}
