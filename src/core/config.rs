//! Pipeline configuration from YAML

use crate::core::{
    error::ProvisioningError,
    pipeline::PipelineDefinition,
    policy::Capability,
    target::Host,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level pipeline configuration loaded from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Pipeline name
    pub name: String,

    /// Optional description
    #[serde(default)]
    pub description: Option<String>,

    /// Artifact store shared by all stages
    pub artifact_store: ArtifactStoreConfig,

    /// Access policy bindings
    #[serde(default)]
    pub principals: Vec<PrincipalConfig>,

    /// Source repositories available to source actions
    #[serde(default)]
    pub repositories: Vec<RepositoryConfig>,

    /// Label-selected deployment target groups
    #[serde(default)]
    pub target_groups: Vec<TargetGroupConfig>,

    /// Static host inventory used by local runs
    #[serde(default)]
    pub inventory: InventoryConfig,

    /// Ordered pipeline stages
    pub stages: Vec<StageConfig>,
}

/// Artifact store declaration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactStoreConfig {
    /// Store identifier (bucket name)
    pub name: String,

    /// Filesystem root; defaults to the local data directory
    #[serde(default)]
    pub root: Option<PathBuf>,
}

/// A principal and the capabilities bound to it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PrincipalConfig {
    pub name: String,

    #[serde(default)]
    pub capabilities: Vec<Capability>,

    /// Resource names the binding applies to
    #[serde(default = "default_scope")]
    pub scope: Vec<String>,
}

fn default_scope() -> Vec<String> {
    vec!["*".to_string()]
}

/// A version-controlled source repository
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepositoryConfig {
    pub name: String,

    /// Clone URL or local path
    pub location: String,

    /// Branch or ref to pull
    #[serde(default = "default_branch")]
    pub branch: String,
}

fn default_branch() -> String {
    "main".to_string()
}

/// Target group selected by application and environment labels
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TargetGroupConfig {
    pub name: String,
    pub app_label: String,
    pub env_label: String,

    /// Principal the group's hosts run as
    pub host_principal: String,
}

/// Static inventory of tagged hosts
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InventoryConfig {
    #[serde(default)]
    pub hosts: Vec<Host>,
}

/// A stage and its ordered actions
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfig {
    pub name: String,
    pub actions: Vec<ActionConfig>,
}

/// Action declaration, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActionConfig {
    Source {
        name: String,
        repository: String,
        output: String,
        principal: String,
    },
    Build {
        name: String,
        environment: BuildEnvironmentConfig,
        input: String,
        output: String,
        principal: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
    Deploy {
        name: String,
        target_group: String,
        input: String,
        #[serde(default)]
        policy: DeployPolicy,
        principal: String,
    },
    Approval {
        name: String,
        /// Reviewer-facing summary template
        info: String,
        /// Review link template
        link: String,
        #[serde(default)]
        timeout_secs: Option<u64>,
    },
}

impl ActionConfig {
    pub fn name(&self) -> &str {
        match self {
            ActionConfig::Source { name, .. }
            | ActionConfig::Build { name, .. }
            | ActionConfig::Deploy { name, .. }
            | ActionConfig::Approval { name, .. } => name,
        }
    }
}

/// Build environment settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BuildEnvironmentConfig {
    /// Build image label, recorded for the sandbox
    #[serde(default)]
    pub image: Option<String>,

    /// Shell commands run in order inside the source tree
    pub commands: Vec<String>,

    /// Directory (relative to the source tree) packaged as the build output
    #[serde(default = "default_artifact_path")]
    pub artifact_path: String,
}

fn default_artifact_path() -> String {
    ".".to_string()
}

/// How a deploy action rolls out to the hosts of its group
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DeployPolicy {
    /// Every matched host is updated concurrently
    #[default]
    AllAtOnce,
}

impl PipelineConfig {
    /// Load pipeline configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse pipeline configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: PipelineConfig = serde_yaml::from_str(yaml)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration by building its definition
    pub fn validate(&self) -> Result<(), ProvisioningError> {
        self.to_definition().map(|_| ())
    }

    /// Convert config to an immutable pipeline definition
    pub fn to_definition(&self) -> Result<PipelineDefinition, ProvisioningError> {
        PipelineDefinition::from_config(self)
    }
}

/// Reference five-stage topology used across unit tests
#[cfg(test)]
pub(crate) const DEMO_YAML: &str = r#"
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
          commands: ["make"]
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
  - name: "Deploy-PRD"
    actions:
      - kind: deploy
        name: "deploy-prd"
        target_group: "prd"
        input: "build_output"
        principal: "deploy-role"
"#;
